/*
 * iteration.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Map expansion of module references.
 */

//! The `Map` attribute duplicates a module reference once per key.
//!
//! ```yaml
//! Resources:
//!   Bucket:
//!     Type: !Rain::Module bucket.yaml
//!     Map: [a, b]
//!     Properties:
//!       Name: !Sub "bucket-$MapIndex-$MapValue"
//! ```
//!
//! yields `Bucket0` (named `bucket-0-a`) and `Bucket1` (named `bucket-1-b`).

use cumulus_yaml::{MapEntry, Node, rewrite_scalars, visit_mut};

use crate::directive::ModuleFrame;
use crate::intrinsics::{REF, SUB, call_arg, make_sub};
use crate::sub::needs_interpolation;
use crate::{PackageError, Result};

pub const MAP: &str = "Map";
pub const MAP_INDEX: &str = "$MapIndex";
pub const MAP_VALUE: &str = "$MapValue";

/// The keys a `Map` attribute enumerates.
///
/// `{Ref: P}` reads parameter `P` of `doc_root`: the value the caller passed
/// for it when the document is a module being inlined, else its `Default`.
pub fn map_keys(map: &Node, doc_root: &Node, frame: Option<&ModuleFrame>) -> Result<Vec<String>> {
    let keys = match call_arg(map, REF).and_then(Node::as_str) {
        Some(param) => {
            let value = frame
                .and_then(|f| f.properties.as_ref())
                .and_then(|props| props.get(param))
                .or_else(|| {
                    doc_root
                        .unwrap_document()
                        .get("Parameters")
                        .and_then(|params| params.get(param))
                        .and_then(|p| p.get("Default"))
                })
                .ok_or_else(|| {
                    PackageError::resolution(format!(
                        "Map refers to parameter {} which has no value",
                        param
                    ))
                })?;
            keys_of(value)?
        }
        None => keys_of(map)?,
    };
    if keys.is_empty() {
        return Err(PackageError::validation(format!(
            "Map has no keys{}",
            crate::error::at(&map.source_info)
        )));
    }
    Ok(keys)
}

fn keys_of(node: &Node) -> Result<Vec<String>> {
    if let Some(text) = node.as_str() {
        return Ok(text
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect());
    }
    let items = node.as_sequence().ok_or_else(|| {
        PackageError::structural(format!(
            "Map must be a list, a comma-separated string or a Ref{}",
            crate::error::at(&node.source_info)
        ))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                PackageError::structural(format!(
                    "Map keys must be scalars{}",
                    crate::error::at(&item.source_info)
                ))
            })
        })
        .collect()
}

/// Copies of `body` named `{name}{i}`, one per key, with `Map` removed and
/// placeholders substituted.
pub fn expand(name: &str, body: &Node, keys: &[String]) -> Vec<MapEntry> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| {
            let mut copy = body.clone();
            copy.remove(MAP);
            substitute_placeholders(&mut copy, index, key);
            MapEntry::new(format!("{}{}", name, index), copy)
        })
        .collect()
}

/// Replace `$MapIndex` and `$MapValue` in every scalar, keys included.
pub fn substitute_placeholders(node: &mut Node, index: usize, key: &str) {
    let index = index.to_string();
    rewrite_scalars(node, &mut |text: &str| {
        if !text.contains(MAP_INDEX) && !text.contains(MAP_VALUE) {
            return None;
        }
        Some(text.replace(MAP_INDEX, &index).replace(MAP_VALUE, key))
    });

    // A placeholder may have been the only thing left to interpolate.
    visit_mut(node, |node, _| {
        let Some(text) = call_arg(node, SUB).and_then(Node::as_str) else {
            return;
        };
        if needs_interpolation(text) {
            return;
        }
        let collapsed = make_sub(text.to_string());
        let source_info = node.source_info.clone();
        *node = collapsed.with_source_info(source_info);
    });
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

    #[test]
    fn test_keys_from_csv_and_list() {
        let root = Node::empty_mapping();
        assert_eq!(map_keys(&load("a, b ,c"), &root, None).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(map_keys(&load("[x, y]"), &root, None).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_keys_from_parameter_default() {
        let root = load("Parameters:\n  Names:\n    Type: CommaDelimitedList\n    Default: one,two\n");
        let keys = map_keys(&load("!Ref Names"), &root, None).unwrap();
        assert_eq!(keys, vec!["one", "two"]);
    }

    #[test]
    fn test_caller_property_overrides_default() {
        let root = load("Parameters:\n  Names:\n    Default: one,two\n");
        let frame = ModuleFrame {
            name: "Mod".into(),
            properties: Some(load("Names: [red, green, blue]")),
        };
        let keys = map_keys(&load("!Ref Names"), &root, Some(&frame)).unwrap();
        assert_eq!(keys, vec!["red", "green", "blue"]);
    }

    #[test]
    fn test_empty_map_rejected() {
        let err = map_keys(&load("[]"), &Node::empty_mapping(), None).unwrap_err();
        assert!(matches!(err, PackageError::Validation(_)));
    }

    #[test]
    fn test_expand_substitutes_placeholders() {
        let body = load(
            "Type: X\nMap: [a, b]\nProperties:\n  Name: !Sub \"n-$MapIndex-$MapValue\"\n  Keep: !Sub \"${AWS::Region}-$MapValue\"\n  $MapValueKey: v\n",
        );
        let copies = expand("Bucket", &body, &["a".to_string(), "b".to_string()]);
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[1].key_str(), "Bucket1");

        let props = copies[1].value.get("Properties").unwrap();
        assert!(!copies[1].value.contains_key("Map"));
        assert_eq!(props.get_str("Name"), Some("n-1-b"));
        assert!(call_arg(props.get("Keep").unwrap(), SUB).is_some());
        assert!(props.contains_key("bKey"));
    }
}
