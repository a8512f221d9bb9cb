/*
 * path.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Concrete addresses of nodes inside a tree.
 */

use std::fmt;

use crate::node::{Node, NodeKind};

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// The address of a node relative to a root, document wrappers excluded.
///
/// Paths are how the driver and the handlers refer to nodes between a scan
/// and the mutation that follows it: a handler receives a path and mutates
/// the slot it addresses, so no reference into the tree outlives a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// A new path one step deeper.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(PathSegment::Key(key.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    /// The path of the enclosing node.
    pub fn parent(&self) -> Option<NodePath> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// The key of the last segment, when it is a mapping key.
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last()? {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }

    /// Key text at position `i`, if that segment is a key.
    pub fn key_at(&self, i: usize) -> Option<&str> {
        match self.0.get(i)? {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

impl From<Vec<PathSegment>> for NodePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

/// Builds a path from textual segments. All-digit segments become indices.
impl<'a> FromIterator<&'a str> for NodePath {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|s| match s.parse::<usize>() {
                    Ok(index) if s.bytes().all(|b| b.is_ascii_digit()) => PathSegment::Index(index),
                    _ => PathSegment::Key(s.to_string()),
                })
                .collect(),
        )
    }
}

impl Node {
    /// Follow `path` from this node. Document wrappers are stepped through.
    pub fn get_path(&self, path: &NodePath) -> Option<&Node> {
        let mut current = self.unwrap_document();
        for segment in path.segments() {
            current = match (&current.kind, segment) {
                (NodeKind::Mapping(_), PathSegment::Key(key)) => current.get(key)?,
                // Numeric mapping keys such as HTTP status codes.
                (NodeKind::Mapping(_), PathSegment::Index(i)) => current.get(&i.to_string())?,
                (NodeKind::Sequence(items), PathSegment::Index(i)) => items.get(*i)?,
                _ => return None,
            };
            current = current.unwrap_document();
        }
        Some(current)
    }

    pub fn get_path_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut current = self.unwrap_document_mut();
        for segment in path.segments() {
            let node = current;
            current = match (&mut node.kind, segment) {
                (NodeKind::Mapping(entries), PathSegment::Key(key)) => entries
                    .iter_mut()
                    .find(|entry| entry.key.as_str() == Some(key.as_str()))
                    .map(|entry| &mut entry.value)?,
                (NodeKind::Mapping(entries), PathSegment::Index(i)) => {
                    let key = i.to_string();
                    entries
                        .iter_mut()
                        .find(|entry| entry.key.as_str() == Some(key.as_str()))
                        .map(|entry| &mut entry.value)?
                }
                (NodeKind::Sequence(items), PathSegment::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            }
            .unwrap_document_mut();
        }
        Some(current)
    }
}
