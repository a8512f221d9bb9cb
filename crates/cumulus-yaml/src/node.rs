/*
 * node.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The generic template tree.
 */

//! The generic template tree.
//!
//! A [`Node`] is a strict tree: every node exclusively owns its children, so
//! cloning a node is always a deep copy with independent ownership. Shared
//! structure only exists as [`NodeKind::Alias`] references by anchor name,
//! which [`crate::flatten_aliases`] replaces with copies.

use crate::{Error, Result, SourceInfo};

/// Presentation hint carried for round-trip fidelity.
///
/// For scalars, a quoted style also means "this is a string", so that
/// `"123"` is not re-emitted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    /// Flow collection (`[a, b]` or `{a: b}`)
    Flow,
}

impl Style {
    /// Whether a scalar in this style is always a string.
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            Style::SingleQuoted | Style::DoubleQuoted | Style::Literal | Style::Folded
        )
    }
}

/// Comment text attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    /// Comment lines immediately above the node
    pub head: Option<String>,
    /// Comment on the same line as the node
    pub line: Option<String>,
    /// Comment lines after the node
    pub foot: Option<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.line.is_none() && self.foot.is_none()
    }
}

/// A node of the template tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,

    /// Explicit tag such as `!Ref` or `!!str`, when one was written.
    pub tag: Option<String>,

    /// Anchor name declared on this node (`&name`).
    pub anchor: Option<String>,

    pub comments: Comments,

    pub source_info: SourceInfo,

    pub style: Style,
}

/// The shape of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Scalar(String),
    Sequence(Vec<Node>),
    /// Ordered entries with unique keys.
    Mapping(Vec<MapEntry>),
    /// Non-owning reference to an anchored node.
    Alias(String),
    Document(Box<Node>),
}

/// A key-value pair of a mapping.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Node,
    pub value: Node,
}

impl MapEntry {
    pub fn new(key: impl Into<String>, value: Node) -> Self {
        Self {
            key: Node::scalar(key),
            value,
        }
    }

    /// The key text, or the empty string for non-scalar keys.
    pub fn key_str(&self) -> &str {
        self.key.as_str().unwrap_or("")
    }
}

const NULL_SCALARS: [&str; 5] = ["", "~", "null", "Null", "NULL"];

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            tag: None,
            anchor: None,
            comments: Comments::default(),
            source_info: SourceInfo::default(),
            style: Style::Plain,
        }
    }

    /// A plain scalar. Its type (int, bool, string...) is inferred on emission.
    pub fn scalar(text: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Scalar(text.into()))
    }

    /// A scalar that always emits as a string.
    pub fn string(text: impl Into<String>) -> Self {
        Self::scalar(text).with_style(Style::DoubleQuoted)
    }

    pub fn null() -> Self {
        Self::scalar("null")
    }

    pub fn sequence(items: Vec<Node>) -> Self {
        Self::from_kind(NodeKind::Sequence(items))
    }

    pub fn mapping(entries: Vec<MapEntry>) -> Self {
        Self::from_kind(NodeKind::Mapping(entries))
    }

    pub fn empty_mapping() -> Self {
        Self::mapping(Vec::new())
    }

    /// A single-pair mapping `{name: arg}`, the shape of an intrinsic call.
    pub fn call(name: impl Into<String>, arg: Node) -> Self {
        Self::mapping(vec![MapEntry::new(name, arg)])
    }

    pub fn alias(name: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Alias(name.into()))
    }

    pub fn document(root: Node) -> Self {
        Self::from_kind(NodeKind::Document(Box::new(root)))
    }

    pub fn with_source_info(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, NodeKind::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.kind, NodeKind::Mapping(_))
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.kind, NodeKind::Alias(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, NodeKind::Document(_))
    }

    /// Whether this is a plain null scalar (`~`, `null`, or empty).
    pub fn is_null(&self) -> bool {
        match &self.kind {
            NodeKind::Scalar(text) => {
                !self.style.is_quoted() && NULL_SCALARS.contains(&text.as_str())
            }
            _ => false,
        }
    }

    /// Scalar text.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[MapEntry]> {
        match &self.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Vec<MapEntry>> {
        match &mut self.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// The intrinsic-call view of a single-pair mapping: `(name, argument)`.
    pub fn as_call(&self) -> Option<(&str, &Node)> {
        match self.as_mapping() {
            Some([entry]) => entry.key.as_str().map(|name| (name, &entry.value)),
            _ => None,
        }
    }

    pub fn as_call_mut(&mut self) -> Option<(&str, &mut Node)> {
        match self.as_mapping_mut().map(|entries| entries.as_mut_slice()) {
            Some([entry]) => match &entry.key.kind {
                NodeKind::Scalar(name) => Some((name.as_str(), &mut entry.value)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Number of children (sequence items or mapping entries).
    pub fn len(&self) -> usize {
        match &self.kind {
            NodeKind::Sequence(items) => items.len(),
            NodeKind::Mapping(entries) => entries.len(),
            NodeKind::Document(_) => 1,
            NodeKind::Scalar(_) | NodeKind::Alias(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The document root, or `self` when this is not a document node.
    pub fn unwrap_document(&self) -> &Node {
        match &self.kind {
            NodeKind::Document(root) => root.unwrap_document(),
            _ => self,
        }
    }

    pub fn unwrap_document_mut(&mut self) -> &mut Node {
        match self.kind {
            NodeKind::Document(ref mut root) => root.unwrap_document_mut(),
            _ => self,
        }
    }

    /// Consume a document node and return its root.
    pub fn into_root(self) -> Node {
        match self.kind {
            NodeKind::Document(root) => root.into_root(),
            _ => self,
        }
    }

    /// Position of `key` among this mapping's entries.
    pub fn entry_index(&self, key: &str) -> Option<usize> {
        self.as_mapping()?
            .iter()
            .position(|entry| entry.key.as_str() == Some(key))
    }

    /// Value for `key` if this is a mapping that contains it.
    pub fn get(&self, key: &str) -> Option<&Node> {
        let index = self.entry_index(key)?;
        self.as_mapping().map(|entries| &entries[index].value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        let index = self.entry_index(key)?;
        self.as_mapping_mut().map(|entries| &mut entries[index].value)
    }

    /// Value for `key`, failing with [`Error::NotFound`] when absent.
    pub fn child(&self, key: &str) -> Result<&Node> {
        self.get(key).ok_or_else(|| Error::NotFound {
            key: key.to_string(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entry_index(key).is_some()
    }

    /// Scalar text of `key`, if present and scalar.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    /// Mapping keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.as_mapping()
            .unwrap_or(&[])
            .iter()
            .map(MapEntry::key_str)
    }

    /// Set `key` to `value`, replacing an existing value in place or
    /// appending a new entry. Returns the previous value.
    ///
    /// Does nothing and returns `None` when this is not a mapping.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        let index = self.entry_index(&key);
        let entries = self.as_mapping_mut()?;
        match index {
            Some(index) => Some(std::mem::replace(&mut entries[index].value, value)),
            None => {
                entries.push(MapEntry::new(key, value));
                None
            }
        }
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let index = self.entry_index(key)?;
        self.as_mapping_mut()
            .map(|entries| entries.remove(index).value)
    }

    /// Structural equality that ignores positions, comments, anchors and style.
    pub fn same_content(&self, other: &Node) -> bool {
        if self.tag != other.tag {
            return false;
        }
        match (&self.kind, &other.kind) {
            (NodeKind::Scalar(a), NodeKind::Scalar(b)) => a == b,
            (NodeKind::Alias(a), NodeKind::Alias(b)) => a == b,
            (NodeKind::Document(a), NodeKind::Document(b)) => a.same_content(b),
            (NodeKind::Sequence(a), NodeKind::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
            }
            (NodeKind::Mapping(a), NodeKind::Mapping(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| {
                        x.key.same_content(&y.key) && x.value.same_content(&y.value)
                    })
            }
            _ => false,
        }
    }

    /// Write `value` at `path`, creating missing mapping keys and growing
    /// sequences (padding with nulls) as needed.
    ///
    /// Fails when an intermediate segment addresses a scalar, or addresses a
    /// sequence with a non-integer segment.
    pub fn set_path(&mut self, path: &[&str], value: Node) -> Result<()> {
        let path_error = |message: String| Error::Path {
            path: path.join("/"),
            message,
        };

        let mut current = self.unwrap_document_mut();
        if path.is_empty() {
            *current = value;
            return Ok(());
        }

        let mut value = Some(value);
        for (i, segment) in path.iter().enumerate() {
            let next = path.get(i + 1).copied();
            let node = current;
            current = match &mut node.kind {
                NodeKind::Mapping(entries) => {
                    let index = match entries
                        .iter()
                        .position(|entry| entry.key.as_str() == Some(*segment))
                    {
                        Some(index) => index,
                        None => {
                            entries.push(MapEntry::new(*segment, Node::null()));
                            entries.len() - 1
                        }
                    };
                    let slot = &mut entries[index].value;
                    match next {
                        None => {
                            *slot = value.take().unwrap_or_else(Node::null);
                            return Ok(());
                        }
                        Some(next) => {
                            if slot.is_null() {
                                *slot = container_for(next);
                            }
                            slot
                        }
                    }
                }
                NodeKind::Sequence(items) => {
                    let index: usize = segment.parse().map_err(|_| {
                        path_error(format!("'{}' is not a sequence index", segment))
                    })?;
                    while items.len() <= index {
                        items.push(Node::null());
                    }
                    let slot = &mut items[index];
                    match next {
                        None => {
                            *slot = value.take().unwrap_or_else(Node::null);
                            return Ok(());
                        }
                        Some(next) => {
                            if slot.is_null() {
                                *slot = container_for(next);
                            }
                            slot
                        }
                    }
                }
                NodeKind::Scalar(_) | NodeKind::Alias(_) | NodeKind::Document(_) => {
                    return Err(path_error(format!(
                        "segment '{}' addresses a scalar",
                        segment
                    )));
                }
            };
        }
        Ok(())
    }
}

/// Empty container appropriate for the segment that will address it.
fn container_for(segment: &str) -> Node {
    if segment.parse::<usize>().is_ok() {
        Node::sequence(Vec::new())
    } else {
        Node::empty_mapping()
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::scalar(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::scalar(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_clone_is_independent() {
        let original = parse("a:\n  b: [1, 2]\n").unwrap();
        let mut copy = original.clone();
        copy.set_path(&["a", "b", "0"], Node::scalar("changed"))
            .unwrap();

        let items = original.unwrap_document().get("a").unwrap().get("b").unwrap();
        assert_eq!(items.as_sequence().unwrap()[0].as_str(), Some("1"));
        assert_eq!(copy.source_info, original.source_info);
    }

    #[test]
    fn test_child_not_found() {
        let doc = parse("a: 1").unwrap();
        let root = doc.unwrap_document();
        assert_eq!(root.child("a").unwrap().as_str(), Some("1"));
        assert_eq!(
            root.child("b").unwrap_err(),
            Error::NotFound { key: "b".into() }
        );
    }

    #[test]
    fn test_set_path_creates_mappings() {
        let mut node = Node::empty_mapping();
        node.set_path(&["Resources", "Bucket", "Type"], Node::scalar("AWS::S3::Bucket"))
            .unwrap();
        assert_eq!(
            node.get("Resources")
                .and_then(|r| r.get("Bucket"))
                .and_then(|b| b.get_str("Type")),
            Some("AWS::S3::Bucket")
        );
    }

    #[test]
    fn test_set_path_grows_sequences() {
        let mut node = parse("items: []").unwrap();
        node.set_path(&["items", "2"], Node::scalar("c")).unwrap();
        let items = node.unwrap_document().get("items").unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.as_sequence().unwrap()[0].is_null());
        assert_eq!(items.as_sequence().unwrap()[2].as_str(), Some("c"));
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut node = parse("a: 1").unwrap();
        let err = node.set_path(&["a", "b"], Node::null()).unwrap_err();
        assert!(matches!(err, Error::Path { .. }));
    }

    #[test]
    fn test_set_path_non_integer_sequence_key_fails() {
        let mut node = parse("a: [1]").unwrap();
        let err = node.set_path(&["a", "x"], Node::null()).unwrap_err();
        assert!(matches!(err, Error::Path { .. }));
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut node = parse("a: 1\nb: 2").unwrap().into_root();
        assert!(node.insert("a", Node::scalar("3")).is_some());
        node.insert("c", Node::scalar("4"));
        assert_eq!(node.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(node.get_str("a"), Some("3"));
    }

    #[test]
    fn test_as_call() {
        let node = Node::call("Ref", Node::scalar("Bucket"));
        let (name, arg) = node.as_call().unwrap();
        assert_eq!(name, "Ref");
        assert_eq!(arg.as_str(), Some("Bucket"));

        let two = parse("a: 1\nb: 2").unwrap().into_root();
        assert!(two.as_call().is_none());
    }

    #[test]
    fn test_same_content_ignores_positions() {
        let a = parse("x:\n  - 1\n  - 2\n").unwrap();
        let b = parse("x: [1, 2]").unwrap();
        assert!(a.same_content(&b));
        let c = parse("x: [1, 3]").unwrap();
        assert!(!a.same_content(&c));
    }
}
