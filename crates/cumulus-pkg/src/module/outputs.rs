/*
 * module/outputs.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Module outputs referenced from the parent.
 */

//! A parent reads a module output with `!GetAtt Mod.Out` or `${Mod.Out}`.
//! Once the module is inlined these become the output's `Value`.
//!
//! Copies made by `Map` are addressed as `Mod[0].Out`, or all at once as
//! `Mod[].Out`, which becomes a list with one entry per copy.

use cumulus_yaml::{Node, visit_mut};

use crate::intrinsics::{GET_ATT, REF, SUB, call_arg, get_att_parts, make_get_att, make_sub};
use crate::sub::{Token, render, tokenize};
use crate::{PackageError, Result};

/// Replace references to `module`'s outputs throughout `root`.
///
/// Attributes that are not outputs are left alone: they are real attributes
/// of the resource that kept the caller's id.
pub(crate) fn substitute_outputs(root: &mut Node, module: &str, outputs: Option<&Node>) -> Result<()> {
    let Some(outputs) = outputs.filter(|o| !o.is_empty()) else {
        return Ok(());
    };
    let mut failure = None;
    visit_mut(root, |node, ctl| match substitute_one(node, module, outputs) {
        Ok(true) => ctl.skip_children(),
        Ok(false) => {}
        Err(e) => {
            failure = Some(e);
            ctl.stop();
        }
    });
    failure.map_or(Ok(()), Err)
}

fn output_value<'o>(outputs: &'o Node, name: &str) -> Result<Option<&'o Node>> {
    let Some(output) = outputs.get(name) else {
        return Ok(None);
    };
    output.get("Value").map(Some).ok_or_else(|| {
        PackageError::structural(format!(
            "module output {} has no Value{}",
            name,
            crate::error::at(&output.source_info)
        ))
    })
}

fn substitute_one(node: &mut Node, module: &str, outputs: &Node) -> Result<bool> {
    if let Some((resource, attribute)) = call_arg(node, GET_ATT).and_then(get_att_parts) {
        if resource != module {
            return Ok(false);
        }
        if let Some(value) = output_value(outputs, &attribute)? {
            *node = value.clone();
            return Ok(true);
        }
        return Ok(false);
    }

    let Some(arg) = call_arg(node, SUB) else {
        return Ok(false);
    };
    let replacement = match arg.as_str() {
        Some(text) => substitute_in_sub(text, module, outputs)?.map(make_sub),
        None => match arg.as_sequence() {
            Some([text, vars]) => match text.as_str() {
                Some(text) => substitute_in_sub(text, module, outputs)?.map(|text| {
                    Node::call(SUB, Node::sequence(vec![Node::string(text), vars.clone()]))
                }),
                None => None,
            },
            _ => None,
        },
    };
    if let Some(replacement) = replacement {
        let source_info = node.source_info.clone();
        *node = replacement.with_source_info(source_info);
    }
    Ok(false)
}

/// The rewritten `Fn::Sub` text, or `None` when it does not refer to the
/// module's outputs.
fn substitute_in_sub(text: &str, module: &str, outputs: &Node) -> Result<Option<String>> {
    let mut changed = false;
    let mut out = Vec::new();
    for token in tokenize(text)? {
        let (resource, attribute) = match token {
            Token::AttributePath {
                resource,
                attribute,
            } => (resource, attribute),
            other => {
                out.push(other);
                continue;
            }
        };
        let value = match output_value(outputs, &attribute)? {
            Some(value) if resource == module => value,
            _ => {
                out.push(Token::AttributePath {
                    resource,
                    attribute,
                });
                continue;
            }
        };
        changed = true;
        if let Some(literal) = value.as_str() {
            out.push(Token::Literal(literal.to_string()));
        } else if let Some(name) = call_arg(value, REF).and_then(Node::as_str) {
            out.push(Token::Reference(name.to_string()));
        } else if let Some((resource, attribute)) = call_arg(value, GET_ATT).and_then(get_att_parts) {
            out.push(Token::AttributePath {
                resource,
                attribute,
            });
        } else if let Some(inner) = call_arg(value, SUB).and_then(Node::as_str) {
            out.extend(tokenize(inner)?);
        } else {
            return Err(PackageError::resolution(format!(
                "output {}.{} cannot be used in Fn::Sub: its value is not a scalar",
                module, attribute
            )));
        }
    }
    Ok(changed.then(|| render(&out)))
}

/// Point `Mod[i].Out` references at the `Map` copy `Mod{i}`, and expand
/// `Mod[].Out` into a list over all `count` copies.
pub(crate) fn expand_mapped_references(root: &mut Node, module: &str, count: usize) {
    let all = format!("{}[]", module);
    visit_mut(root, |node, _| {
        if let Some((resource, attribute)) = call_arg(node, GET_ATT).and_then(get_att_parts) {
            let replacement = if resource == all {
                Node::sequence(
                    (0..count)
                        .map(|i| make_get_att(&format!("{}{}", module, i), &attribute))
                        .collect(),
                )
            } else if let Some(index) = mapped_index(&resource, module) {
                make_get_att(&format!("{}{}", module, index), &attribute)
            } else {
                return;
            };
            let source_info = node.source_info.clone();
            *node = replacement.with_source_info(source_info);
            return;
        }

        let Some(text) = call_arg(node, SUB).and_then(Node::as_str) else {
            return;
        };
        let Ok(tokens) = tokenize(text) else {
            return;
        };
        let mut changed = false;
        let tokens: Vec<Token> = tokens
            .into_iter()
            .map(|token| match token {
                Token::AttributePath {
                    resource,
                    attribute,
                } => match mapped_index(&resource, module) {
                    Some(index) => {
                        changed = true;
                        Token::AttributePath {
                            resource: format!("{}{}", module, index),
                            attribute,
                        }
                    }
                    None => Token::AttributePath {
                        resource,
                        attribute,
                    },
                },
                other => other,
            })
            .collect();
        if changed {
            let source_info = node.source_info.clone();
            *node = make_sub(render(&tokens)).with_source_info(source_info);
        }
    });
}

/// `i` for `Mod[i]`.
fn mapped_index(resource: &str, module: &str) -> Option<usize> {
    resource
        .strip_prefix(module)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
}
