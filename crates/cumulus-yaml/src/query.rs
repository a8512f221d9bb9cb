/*
 * query.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Path pattern queries over template trees.
 */

//! Path pattern queries.
//!
//! A pattern is a `/`-delimited list of segments:
//!
//! - a literal mapping key, or a base-10 sequence index
//! - `*`, any single key or index at that level
//! - `**`, the current level and, recursively, every level below it
//!
//! A segment may carry a filter after `|`: `name|Key==Value` keeps only
//! children whose `Key` field is a scalar equal to `Value`, and `name|Key`
//! keeps children that have a `Key` field at all. Filters look at the child
//! about to be descended into.
//!
//! ```rust
//! use cumulus_yaml::{parse, query};
//!
//! let doc = parse("Resources:\n  A: {Type: X}\n  B: {Type: Y}\n").unwrap();
//! let types: Vec<_> = query(&doc, "**/Type").filter_map(|m| m.node.as_str()).collect();
//! assert_eq!(types, vec!["X", "Y"]);
//! ```

use std::fmt;

use crate::node::{Node, NodeKind};
use crate::path::{NodePath, PathSegment};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Literal(String),
    Any,
    Recursive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Has(String),
    Equals(String, String),
}

impl Filter {
    fn parse(text: &str) -> Self {
        match text.split_once("==") {
            Some((key, value)) => Filter::Equals(key.to_string(), value.to_string()),
            None => Filter::Has(text.to_string()),
        }
    }

    fn accepts(&self, candidate: &Node) -> bool {
        let candidate = candidate.unwrap_document();
        match self {
            Filter::Has(key) => candidate.contains_key(key),
            Filter::Equals(key, value) => candidate.get_str(key) == Some(value.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    selector: Selector,
    filter: Option<Filter>,
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|raw| {
                let (name, filter) = match raw.split_once('|') {
                    Some((name, filter)) => (name, Some(Filter::parse(filter))),
                    None => (raw, None),
                };
                let selector = match name {
                    "**" => Selector::Recursive,
                    "*" => Selector::Any,
                    literal => Selector::Literal(literal.to_string()),
                };
                Segment { selector, filter }
            })
            .collect();
        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One query result.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub node: &'a Node,
    pub path: NodePath,
}

/// Lazy, one-shot iterator over the nodes matching a pattern, in document order.
pub struct Query<'a, 'p> {
    segments: &'p [Segment],
    stack: Vec<(&'a Node, NodePath, usize)>,
}

/// Run `pattern` against `root`.
pub fn query<'a>(root: &'a Node, pattern: &str) -> OwnedQuery<'a> {
    OwnedQuery::new(root, Pattern::parse(pattern))
}

/// Paths of every node matching `pattern`, collected up front so the tree
/// can be mutated afterwards.
pub fn query_paths(root: &Node, pattern: &Pattern) -> Vec<NodePath> {
    pattern.matches(root).map(|m| m.path).collect()
}

impl Pattern {
    /// Iterate over the nodes under `root` matching this pattern.
    pub fn matches<'a, 'p>(&'p self, root: &'a Node) -> Query<'a, 'p> {
        Query {
            segments: &self.segments,
            stack: vec![(root, NodePath::root(), 0)],
        }
    }

    /// Whether `path`, taken from `root`, is one of this pattern's matches.
    pub fn matches_path(&self, root: &Node, path: &NodePath) -> bool {
        self.matches(root).any(|m| &m.path == path)
    }
}

impl<'a> Iterator for Query<'a, '_> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, path, index)) = self.stack.pop() {
            let node = node.unwrap_document();
            let Some(segment) = self.segments.get(index) else {
                return Some(Match { node, path });
            };

            if segment.selector == Selector::Recursive {
                // Children stay on `**`; the node itself moves past it and is
                // popped first, which keeps document order.
                let children = children(node);
                for (child_path, child) in children.into_iter().rev() {
                    self.stack.push((child, path.child(child_path), index));
                }
                self.stack.push((node, path, index + 1));
                continue;
            }

            let selected: Vec<(PathSegment, &'a Node)> = children(node)
                .into_iter()
                .filter(|(seg, _)| selects(&segment.selector, seg))
                .filter(|(_, child)| segment.filter.as_ref().is_none_or(|f| f.accepts(child)))
                .collect();
            for (child_path, child) in selected.into_iter().rev() {
                self.stack.push((child, path.child(child_path), index + 1));
            }
        }
        None
    }
}

fn children(node: &Node) -> Vec<(PathSegment, &Node)> {
    match &node.kind {
        NodeKind::Mapping(entries) => entries
            .iter()
            .map(|e| (PathSegment::Key(e.key_str().to_string()), &e.value))
            .collect(),
        NodeKind::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (PathSegment::Index(i), item))
            .collect(),
        NodeKind::Document(root) => children(root),
        NodeKind::Scalar(_) | NodeKind::Alias(_) => Vec::new(),
    }
}

fn selects(selector: &Selector, segment: &PathSegment) -> bool {
    match (selector, segment) {
        (Selector::Any, _) => true,
        (Selector::Literal(name), PathSegment::Key(key)) => name == key,
        (Selector::Literal(name), PathSegment::Index(i)) => name.parse::<usize>() == Ok(*i),
        (Selector::Recursive, _) => false,
    }
}

/// A query that owns its pattern.
pub struct OwnedQuery<'a> {
    segments: Vec<Segment>,
    stack: Vec<(&'a Node, NodePath, usize)>,
}

impl<'a> OwnedQuery<'a> {
    fn new(root: &'a Node, pattern: Pattern) -> Self {
        Self {
            segments: pattern.segments,
            stack: vec![(root, NodePath::root(), 0)],
        }
    }
}

impl<'a> Iterator for OwnedQuery<'a> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut inner = Query {
            segments: &self.segments,
            stack: std::mem::take(&mut self.stack),
        };
        let item = inner.next();
        self.stack = inner.stack;
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r#"
Resources:
  Bucket:
    Type: AWS::S3::Bucket
    Properties:
      Tags:
        - Key: Name
          Value: data
        - Key: Owner
          Value: ops
  Queue:
    Type: AWS::SQS::Queue
Outputs:
  Arn:
    Value: x
"#;

    fn paths(root: &Node, pattern: &str) -> Vec<String> {
        query(root, pattern).map(|m| m.path.to_string()).collect()
    }

    #[test]
    fn test_wildcard_in_declaration_order() {
        let doc = parse(TEMPLATE).unwrap();
        assert_eq!(
            paths(&doc, "Resources/*"),
            vec!["/Resources/Bucket", "/Resources/Queue"]
        );
    }

    #[test]
    fn test_recursive_descent_document_order() {
        let doc = parse(TEMPLATE).unwrap();
        let types: Vec<&str> = query(&doc, "**/Type")
            .filter_map(|m| m.node.as_str())
            .collect();
        assert_eq!(types, vec!["AWS::S3::Bucket", "AWS::SQS::Queue"]);
    }

    #[test]
    fn test_recursive_descent_no_duplicates() {
        let doc = parse(TEMPLATE).unwrap();
        let values = paths(&doc, "**/Value");
        assert_eq!(
            values,
            vec![
                "/Resources/Bucket/Properties/Tags/0/Value",
                "/Resources/Bucket/Properties/Tags/1/Value",
                "/Outputs/Arn/Value",
            ]
        );
    }

    #[test]
    fn test_equality_filter() {
        let doc = parse(TEMPLATE).unwrap();
        let owners: Vec<&str> = query(&doc, "Resources/Bucket/Properties/Tags/*|Key==Owner")
            .filter_map(|m| m.node.get_str("Value"))
            .collect();
        assert_eq!(owners, vec!["ops"]);
    }

    #[test]
    fn test_existence_filter() {
        let doc = parse(TEMPLATE).unwrap();
        assert_eq!(
            paths(&doc, "Resources/*|Properties"),
            vec!["/Resources/Bucket"]
        );
        assert_eq!(paths(&doc, "**/*|Value"), vec![
            "/Resources/Bucket/Properties/Tags/0",
            "/Resources/Bucket/Properties/Tags/1",
            "/Outputs/Arn",
        ]);
    }

    #[test]
    fn test_sequence_index() {
        let doc = parse(TEMPLATE).unwrap();
        assert_eq!(
            paths(&doc, "Resources/Bucket/Properties/Tags/1/Key"),
            vec!["/Resources/Bucket/Properties/Tags/1/Key"]
        );
        assert!(paths(&doc, "Resources/Bucket/Properties/Tags/x").is_empty());
        assert!(paths(&doc, "Resources/Bucket/Properties/Tags/9").is_empty());
    }

    #[test]
    fn test_empty_pattern_matches_root() {
        let doc = parse("a: 1").unwrap();
        assert_eq!(paths(&doc, ""), vec!["/"]);
    }

    #[test]
    fn test_lazy_iteration() {
        let doc = parse(TEMPLATE).unwrap();
        let mut q = query(&doc, "**");
        let first = q.next().unwrap();
        assert!(first.path.is_empty());
        assert!(q.next().is_some());
    }

    #[test]
    fn test_query_paths_and_matches_path() {
        let doc = parse(TEMPLATE).unwrap();
        let pattern = Pattern::parse("Resources/*|Type==AWS::SQS::Queue");
        let found = query_paths(&doc, &pattern);
        assert_eq!(found, vec![NodePath::root().key("Resources").key("Queue")]);
        assert!(pattern.matches_path(&doc, &found[0]));
        assert!(!pattern.matches_path(&doc, &NodePath::root().key("Resources").key("Bucket")));
    }
}
