/*
 * emit.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * YAML and JSON output for template trees.
 */

use crate::anchors::flatten_aliases;
use crate::node::{Node, NodeKind};
use crate::{Error, Result};
use yaml_rust2::{Yaml, YamlEmitter};

/// Typed reading of a plain scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
}

impl Node {
    /// Interpret this scalar the way a YAML 1.2 core-schema reader would.
    ///
    /// Quoted, block, and `!!str`-tagged scalars are always strings.
    pub fn scalar_value(&self) -> Option<ScalarValue<'_>> {
        let text = self.as_str()?;
        if self.style.is_quoted() || self.tag.as_deref() == Some("!!str") {
            return Some(ScalarValue::Str(text));
        }
        Some(infer_scalar(text))
    }
}

fn infer_scalar(text: &str) -> ScalarValue<'_> {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarValue::Null,
        "true" | "True" | "TRUE" => return ScalarValue::Bool(true),
        "false" | "False" | "FALSE" => return ScalarValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return ScalarValue::Int(i);
    }
    let looks_numeric = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if looks_numeric {
        if let Ok(f) = text.parse::<f64>() {
            return ScalarValue::Float(f);
        }
    }
    ScalarValue::Str(text)
}

/// Serialize a tree as YAML text.
///
/// Aliases are expanded into copies of their anchored nodes. A node
/// carrying a local tag that was never normalized is written as a
/// single-key mapping named after the tag (`!Ref x` becomes `Ref: x`).
/// Comments are not written.
pub fn to_yaml_string(node: &Node) -> Result<String> {
    let yaml = to_yaml(&expanded(node)?)?;

    let mut out = String::new();
    {
        let mut emitter = YamlEmitter::new(&mut out);
        emitter.multiline_strings(true);
        emitter
            .dump(&yaml)
            .map_err(|e| Error::Emit(format!("{:?}", e)))?;
    }

    let body = out
        .strip_prefix("---\n")
        .or_else(|| out.strip_prefix("--- "))
        .or_else(|| out.strip_prefix("---"))
        .unwrap_or(&out);
    let mut body = body.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    Ok(body)
}

/// Serialize a tree as pretty-printed JSON, keeping mapping order.
pub fn to_json_string(node: &Node) -> Result<String> {
    let value = to_json(&expanded(node)?)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Convert a tree into a JSON value.
pub fn to_json_value(node: &Node) -> Result<serde_json::Value> {
    to_json(&expanded(node)?)
}

fn expanded(node: &Node) -> Result<Node> {
    let mut copy = node.unwrap_document().clone();
    flatten_aliases(&mut copy)?;
    Ok(copy)
}

/// Tag name for a local tag that should be written as a call.
fn call_name(node: &Node) -> Option<&str> {
    let tag = node.tag.as_deref()?;
    if tag.starts_with("!!") {
        return None;
    }
    tag.strip_prefix('!').filter(|name| !name.is_empty())
}

fn untagged(node: &Node) -> Node {
    let mut copy = node.clone();
    copy.tag = None;
    copy
}

fn to_yaml(node: &Node) -> Result<Yaml> {
    if let Some(name) = call_name(node) {
        let inner = to_yaml(&untagged(node))?;
        let pairs = vec![(Yaml::String(name.to_string()), inner)];
        return Ok(Yaml::Hash(pairs.into_iter().collect()));
    }

    Ok(match &node.kind {
        NodeKind::Scalar(text) => match node.scalar_value() {
            Some(ScalarValue::Null) => Yaml::Null,
            Some(ScalarValue::Bool(b)) => Yaml::Boolean(b),
            // Non-canonical spellings keep their text
            Some(ScalarValue::Int(i)) if i.to_string() == *text => Yaml::Integer(i),
            Some(ScalarValue::Int(_)) | Some(ScalarValue::Float(_)) => Yaml::Real(text.clone()),
            Some(ScalarValue::Str(_)) | None => Yaml::String(text.clone()),
        },
        NodeKind::Sequence(items) => {
            Yaml::Array(items.iter().map(to_yaml).collect::<Result<Vec<_>>>()?)
        }
        NodeKind::Mapping(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                pairs.push((to_yaml(&entry.key)?, to_yaml(&entry.value)?));
            }
            Yaml::Hash(pairs.into_iter().collect())
        }
        NodeKind::Document(root) => to_yaml(root)?,
        NodeKind::Alias(name) => {
            return Err(Error::Emit(format!("unresolved alias *{}", name)));
        }
    })
}

fn to_json(node: &Node) -> Result<serde_json::Value> {
    use serde_json::Value;

    if let Some(name) = call_name(node) {
        let mut map = serde_json::Map::new();
        map.insert(name.to_string(), to_json(&untagged(node))?);
        return Ok(Value::Object(map));
    }

    Ok(match &node.kind {
        NodeKind::Scalar(text) => match node.scalar_value() {
            Some(ScalarValue::Null) => Value::Null,
            Some(ScalarValue::Bool(b)) => Value::Bool(b),
            Some(ScalarValue::Int(i)) => Value::from(i),
            Some(ScalarValue::Float(f)) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(text.clone())),
            Some(ScalarValue::Str(_)) | None => Value::String(text.clone()),
        },
        NodeKind::Sequence(items) => {
            Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?)
        }
        NodeKind::Mapping(entries) => {
            let mut map = serde_json::Map::new();
            for entry in entries {
                let key = entry.key.as_str().ok_or_else(|| {
                    Error::Json(format!(
                        "mapping key at {} is not a scalar",
                        entry.key.source_info
                    ))
                })?;
                map.insert(key.to_string(), to_json(&entry.value)?);
            }
            Value::Object(map)
        }
        NodeKind::Document(root) => to_json(root)?,
        NodeKind::Alias(name) => {
            return Err(Error::Json(format!("unresolved alias *{}", name)));
        }
    })
}
