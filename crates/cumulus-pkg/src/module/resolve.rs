/*
 * module/resolve.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Module-scope reference resolution.
 */

//! Binds references inside a module to the caller.
//!
//! - `Ref` to a module parameter becomes the caller's property value, or
//!   the parameter's `Default`.
//! - `Ref`/`Fn::GetAtt` to a module resource is renamed with the caller
//!   prefix. The extension point takes the caller's own logical id.
//! - Anything else belongs to the parent and is left alone.
//!
//! `Fn::Sub` strings get the same treatment token by token.

use std::collections::HashSet;

use cumulus_yaml::{Node, visit_mut};

use crate::intrinsics::{GET_ATT, REF, SUB, call_arg, get_att_parts, make_sub};
use crate::sub::{Token, render, tokenize};
use crate::{PackageError, Result};

pub(crate) struct ReferenceContext<'m> {
    prefix: &'m str,
    params: Option<&'m Node>,
    properties: Option<&'m Node>,
    resources: HashSet<String>,
    extension: Option<&'m str>,
}

impl<'m> ReferenceContext<'m> {
    pub fn new(
        prefix: &'m str,
        params: Option<&'m Node>,
        properties: Option<&'m Node>,
        resources: impl IntoIterator<Item = String>,
        extension: Option<&'m str>,
    ) -> Self {
        Self {
            prefix,
            params,
            properties,
            resources: resources.into_iter().collect(),
            extension,
        }
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.is_some_and(|p| p.contains_key(name))
    }

    /// The emitted id of module resource `id`, or `None` if the module has
    /// no such resource.
    pub fn rename(&self, id: &str) -> Option<String> {
        if self.extension == Some(id) {
            return Some(self.prefix.to_string());
        }
        self.resources
            .contains(id)
            .then(|| format!("{}{}", self.prefix, id))
    }

    /// The bound value of parameter `name`, or `None` if it is not one.
    fn param_value(&self, name: &str) -> Result<Option<Node>> {
        let Some(param) = self.params.and_then(|p| p.get(name)) else {
            return Ok(None);
        };
        if let Some(value) = self.properties.and_then(|p| p.get(name)) {
            return Ok(Some(value.clone()));
        }
        match param.get("Default") {
            Some(default) => Ok(Some(default.clone())),
            None => Err(PackageError::resolution(format!(
                "{}: value not found in parent scope{}",
                name,
                crate::error::at(&param.source_info)
            ))),
        }
    }

    /// Resolve every reference under `node` in module scope.
    pub fn resolve(&self, node: &mut Node) -> Result<()> {
        let mut failure = None;
        visit_mut(node, |node, ctl| match self.resolve_one(node) {
            // Bound values are in the caller's scope already.
            Ok(true) => ctl.skip_children(),
            Ok(false) => {}
            Err(e) => {
                failure = Some(e);
                ctl.stop();
            }
        });
        failure.map_or(Ok(()), Err)
    }

    /// Rewrite `node` if it is a reference. Returns true when a parameter
    /// value was substituted.
    fn resolve_one(&self, node: &mut Node) -> Result<bool> {
        if let Some(name) = call_arg(node, REF).and_then(Node::as_str).map(str::to_string) {
            if let Some(value) = self.param_value(&name)? {
                *node = value;
                return Ok(true);
            }
            if let Some(renamed) = self.rename(&name) {
                let source_info = node.source_info.clone();
                *node = Node::call(REF, Node::scalar(renamed)).with_source_info(source_info);
            }
            return Ok(false);
        }

        if let Some((resource, attribute)) = call_arg(node, GET_ATT).and_then(get_att_parts) {
            if let Some(renamed) = self.rename(&resource) {
                let source_info = node.source_info.clone();
                *node = crate::intrinsics::make_get_att(&renamed, &attribute)
                    .with_source_info(source_info);
            }
            return Ok(false);
        }

        if let Some(arg) = call_arg(node, SUB) {
            let replacement = match arg.as_str() {
                Some(text) => Some(make_sub(self.resolve_sub(text, &HashSet::new())?)),
                None => self.resolve_sub_list(arg)?,
            };
            if let Some(replacement) = replacement {
                let source_info = node.source_info.clone();
                *node = replacement.with_source_info(source_info);
            }
        }
        Ok(false)
    }

    /// `Fn::Sub: [text, {Var: value}]`. The variables are local to the
    /// string, so only the other tokens are resolved here; the values are
    /// reached by the ongoing walk.
    fn resolve_sub_list(&self, arg: &Node) -> Result<Option<Node>> {
        let Some([text, vars]) = arg.as_sequence() else {
            return Ok(None);
        };
        let Some(text) = text.as_str() else {
            return Ok(None);
        };
        let locals: HashSet<String> = vars.keys().map(str::to_string).collect();
        let resolved = self.resolve_sub(text, &locals)?;
        Ok(Some(Node::call(
            SUB,
            Node::sequence(vec![Node::string(resolved), vars.clone()]),
        )))
    }

    fn resolve_sub(&self, text: &str, locals: &HashSet<String>) -> Result<String> {
        let mut out = Vec::new();
        for token in tokenize(text)? {
            match token {
                Token::Reference(name) if !locals.contains(&name) => {
                    if let Some(value) = self.param_value(&name)? {
                        splice_value(&name, &value, &mut out)?;
                    } else if let Some(renamed) = self.rename(&name) {
                        out.push(Token::Reference(renamed));
                    } else {
                        out.push(Token::Reference(name));
                    }
                }
                Token::AttributePath {
                    resource,
                    attribute,
                } => {
                    let resource = self.rename(&resource).unwrap_or(resource);
                    out.push(Token::AttributePath {
                        resource,
                        attribute,
                    });
                }
                other => out.push(other),
            }
        }
        Ok(render(&out))
    }
}

/// Inline a bound parameter value into a `Fn::Sub` token stream.
fn splice_value(name: &str, value: &Node, out: &mut Vec<Token>) -> Result<()> {
    if let Some(text) = value.as_str() {
        out.push(Token::Literal(text.to_string()));
        return Ok(());
    }
    if let Some(target) = call_arg(value, REF).and_then(Node::as_str) {
        out.push(Token::Reference(target.to_string()));
        return Ok(());
    }
    if let Some((resource, attribute)) = call_arg(value, GET_ATT).and_then(get_att_parts) {
        out.push(Token::AttributePath {
            resource,
            attribute,
        });
        return Ok(());
    }
    if let Some(text) = call_arg(value, SUB).and_then(Node::as_str) {
        out.extend(tokenize(text)?);
        return Ok(());
    }
    Err(PackageError::resolution(format!(
        "{} cannot be used in Fn::Sub: its value is not a scalar{}",
        name,
        crate::error::at(&value.source_info)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::normalize_tags;
    use cumulus_yaml::parse;

    fn load(yaml: &str) -> Node {
        let mut doc = parse(yaml).unwrap();
        normalize_tags(&mut doc);
        doc.into_root()
    }

    struct Fixture {
        params: Node,
        props: Node,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                params: load(
                    "Name:\n  Type: String\nSize:\n  Type: Number\n  Default: 10\nRequired:\n  Type: String\nParent:\n  Type: String\n",
                ),
                props: load("Name: logs\nParent: !Ref Env\n"),
            }
        }

        fn context(&self) -> ReferenceContext<'_> {
            ReferenceContext::new(
                "Mod",
                Some(&self.params),
                Some(&self.props),
                ["ModuleExtension".to_string(), "Policy".to_string()],
                Some("ModuleExtension"),
            )
        }
    }

    #[test]
    fn test_refs() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut node = load(
            "A: !Ref Name\nB: !Ref Size\nC: !Ref Policy\nD: !Ref ModuleExtension\nE: !Ref Elsewhere\nF: !GetAtt Policy.Arn\n",
        );
        ctx.resolve(&mut node).unwrap();

        assert_eq!(node.get_str("A"), Some("logs"));
        assert_eq!(node.get_str("B"), Some("10"));
        assert_eq!(call_arg(node.get("C").unwrap(), REF).and_then(Node::as_str), Some("ModPolicy"));
        assert_eq!(call_arg(node.get("D").unwrap(), REF).and_then(Node::as_str), Some("Mod"));
        assert_eq!(call_arg(node.get("E").unwrap(), REF).and_then(Node::as_str), Some("Elsewhere"));
        assert_eq!(
            call_arg(node.get("F").unwrap(), GET_ATT).and_then(get_att_parts),
            Some(("ModPolicy".to_string(), "Arn".to_string()))
        );
    }

    #[test]
    fn test_missing_parameter_value() {
        let fixture = Fixture::new();
        let mut node = load("A: !Ref Required\n");
        let err = fixture.context().resolve(&mut node).unwrap_err();
        assert!(err.to_string().contains("value not found in parent scope"));
    }

    #[test]
    fn test_bound_values_are_not_renamed() {
        let params = load("Target:\n  Type: String\n");
        let props = load("Target: !Ref Policy\n");
        let ctx = ReferenceContext::new(
            "Mod",
            Some(&params),
            Some(&props),
            ["Policy".to_string()],
            None,
        );
        let mut node = load("A: !Ref Target\n");
        ctx.resolve(&mut node).unwrap();
        assert_eq!(call_arg(node.get("A").unwrap(), REF).and_then(Node::as_str), Some("Policy"));
    }

    #[test]
    fn test_sub_tokens() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut node = load(
            "A: !Sub \"${Name}-${Size}\"\nB: !Sub \"${Policy.Arn}/${Parent}/${AWS::Region}\"\nC: !Sub [\"${Name}-${Local}\", {Local: !Ref Policy}]\n",
        );
        ctx.resolve(&mut node).unwrap();

        assert_eq!(node.get_str("A"), Some("logs-10"));
        assert_eq!(
            call_arg(node.get("B").unwrap(), SUB).and_then(Node::as_str),
            Some("${ModPolicy.Arn}/${Env}/${AWS::Region}")
        );
        let c = call_arg(node.get("C").unwrap(), SUB).and_then(Node::as_sequence).unwrap();
        assert_eq!(c[0].as_str(), Some("logs-${Local}"));
        assert_eq!(call_arg(c[1].get("Local").unwrap(), REF).and_then(Node::as_str), Some("ModPolicy"));
    }
}
