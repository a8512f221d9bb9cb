//! Anchor/alias flattening.

use std::collections::HashMap;

use crate::node::{Node, NodeKind};
use crate::{Error, Result};

/// Replace every alias in `root` with a deep copy of its anchored node and
/// drop all anchor names, turning shared structure into a plain tree.
///
/// An alias may only refer to an anchor whose node is complete at that point
/// in document order, so self-referencing anchors are rejected as unknown.
pub fn flatten_aliases(root: &mut Node) -> Result<()> {
    let mut anchors = HashMap::new();
    flatten(root, &mut anchors)?;
    if !anchors.is_empty() {
        tracing::trace!(anchors = anchors.len(), "Flattened anchors");
    }
    Ok(())
}

fn flatten(node: &mut Node, anchors: &mut HashMap<String, Node>) -> Result<()> {
    if let NodeKind::Alias(name) = &node.kind {
        let target = anchors.get(name).ok_or_else(|| Error::Path {
            path: format!("*{}", name),
            message: format!("alias refers to unknown anchor '{}'", name),
        })?;
        let mut copy = target.clone();
        copy.source_info = node.source_info.clone();
        copy.comments = std::mem::take(&mut node.comments);
        *node = copy;
        return Ok(());
    }

    match &mut node.kind {
        NodeKind::Sequence(items) => {
            for item in items {
                flatten(item, anchors)?;
            }
        }
        NodeKind::Mapping(entries) => {
            for entry in entries {
                flatten(&mut entry.key, anchors)?;
                flatten(&mut entry.value, anchors)?;
            }
        }
        NodeKind::Document(root) => flatten(root, anchors)?,
        NodeKind::Scalar(_) | NodeKind::Alias(_) => {}
    }

    if let Some(name) = node.anchor.take() {
        anchors.insert(name, node.clone());
    }
    Ok(())
}

/// Whether any alias remains in the tree.
pub fn has_aliases(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Alias(_) => true,
        NodeKind::Scalar(_) => false,
        NodeKind::Sequence(items) => items.iter().any(has_aliases),
        NodeKind::Mapping(entries) => entries
            .iter()
            .any(|e| has_aliases(&e.key) || has_aliases(&e.value)),
        NodeKind::Document(root) => has_aliases(root),
    }
}
