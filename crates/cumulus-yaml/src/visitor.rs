//! Depth-first, pre-order traversal with stop/skip control.
//!
//! Mapping keys are not visited as nodes of their own; a mapping's children
//! are its values, addressed by [`PathSegment::Key`]. Document wrappers are
//! visited and are transparent to paths.

use std::cell::Cell;

use crate::node::{Node, NodeKind};
use crate::path::{NodePath, PathSegment};

#[derive(Default)]
struct Control {
    stop: Cell<bool>,
    skip: Cell<bool>,
}

/// The current position of an immutable walk.
pub struct Visitor<'a, 'v> {
    node: &'a Node,
    parent: Option<&'a Node>,
    path: &'v NodePath,
    control: &'v Control,
}

impl<'a> Visitor<'a, '_> {
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// The enclosing node, `None` at the root.
    pub fn parent(&self) -> Option<&'a Node> {
        self.parent
    }

    pub fn path(&self) -> &NodePath {
        self.path
    }

    /// Abort the whole walk after this callback returns.
    pub fn stop(&self) {
        self.control.stop.set(true);
    }

    /// Do not descend into this node's children.
    pub fn skip_children(&self) {
        self.control.skip.set(true);
    }
}

/// Walk `root` depth-first, calling `f` on every node before its children.
pub fn visit<'a, F>(root: &'a Node, mut f: F)
where
    F: FnMut(&Visitor<'a, '_>),
{
    let control = Control::default();
    let mut path = NodePath::root();
    walk(root, None, &mut path, &control, &mut f);
}

fn walk<'a, F>(
    node: &'a Node,
    parent: Option<&'a Node>,
    path: &mut NodePath,
    control: &Control,
    f: &mut F,
) where
    F: FnMut(&Visitor<'a, '_>),
{
    f(&Visitor {
        node,
        parent,
        path,
        control,
    });
    if control.stop.get() {
        return;
    }
    if control.skip.replace(false) {
        return;
    }

    match &node.kind {
        NodeKind::Document(root) => walk(root, Some(node), path, control, f),
        NodeKind::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                walk(item, Some(node), path, control, f);
                path.pop();
                if control.stop.get() {
                    return;
                }
            }
        }
        NodeKind::Mapping(entries) => {
            for entry in entries {
                path.push(PathSegment::Key(entry.key_str().to_string()));
                walk(&entry.value, Some(node), path, control, f);
                path.pop();
                if control.stop.get() {
                    return;
                }
            }
        }
        NodeKind::Scalar(_) | NodeKind::Alias(_) => {}
    }
}

/// Control handle passed to [`visit_mut`] callbacks.
#[derive(Debug, Default)]
pub struct VisitControl {
    path: NodePath,
    stop: bool,
    skip: bool,
}

impl VisitControl {
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn skip_children(&mut self) {
        self.skip = true;
    }
}

/// Mutable pre-order walk. The callback may replace the node it is given;
/// the walk then descends into the replacement.
pub fn visit_mut<F>(root: &mut Node, mut f: F)
where
    F: FnMut(&mut Node, &mut VisitControl),
{
    let mut control = VisitControl::default();
    walk_mut(root, &mut control, &mut f);
}

fn walk_mut<F>(node: &mut Node, control: &mut VisitControl, f: &mut F)
where
    F: FnMut(&mut Node, &mut VisitControl),
{
    f(node, control);
    if control.stop {
        return;
    }
    if std::mem::take(&mut control.skip) {
        return;
    }

    match &mut node.kind {
        NodeKind::Document(root) => walk_mut(root, control, f),
        NodeKind::Sequence(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                control.path.push(PathSegment::Index(i));
                walk_mut(item, control, f);
                control.path.pop();
                if control.stop {
                    return;
                }
            }
        }
        NodeKind::Mapping(entries) => {
            for entry in entries.iter_mut() {
                control
                    .path
                    .push(PathSegment::Key(entry.key_str().to_string()));
                walk_mut(&mut entry.value, control, f);
                control.path.pop();
                if control.stop {
                    return;
                }
            }
        }
        NodeKind::Scalar(_) | NodeKind::Alias(_) => {}
    }
}

/// Apply `f` to every scalar's text, mapping keys included.
pub fn rewrite_scalars<F>(node: &mut Node, f: &mut F)
where
    F: FnMut(&str) -> Option<String>,
{
    match &mut node.kind {
        NodeKind::Scalar(text) => {
            if let Some(replacement) = f(text) {
                *text = replacement;
            }
        }
        NodeKind::Sequence(items) => {
            for item in items {
                rewrite_scalars(item, f);
            }
        }
        NodeKind::Mapping(entries) => {
            for entry in entries {
                rewrite_scalars(&mut entry.key, f);
                rewrite_scalars(&mut entry.value, f);
            }
        }
        NodeKind::Document(root) => rewrite_scalars(root, f),
        NodeKind::Alias(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_preorder_document_order() {
        let doc = parse("a: [x, y]\nb: z\n").unwrap();
        let mut seen = Vec::new();
        visit(&doc, |v| {
            if let Some(text) = v.node().as_str() {
                seen.push(format!("{}={}", v.path(), text));
            }
        });
        assert_eq!(seen, vec!["/a/0=x", "/a/1=y", "/b=z"]);
    }

    #[test]
    fn test_parent_tracking() {
        let doc = parse("a: {b: 1}").unwrap();
        let mut parent_of_b = None;
        visit(&doc, |v| {
            if v.path().last_key() == Some("b") {
                parent_of_b = v.parent();
            }
        });
        assert!(parent_of_b.unwrap().contains_key("b"));
    }

    #[test]
    fn test_stop_keeps_collected_results() {
        let doc = parse("[1, 2, 3, 4]").unwrap();
        let mut seen = Vec::new();
        visit(&doc, |v| {
            if let Some(text) = v.node().as_str() {
                seen.push(text);
                if text == "2" {
                    v.stop();
                }
            }
        });
        assert_eq!(seen, vec!["1", "2"]);
    }

    #[test]
    fn test_skip_children() {
        let doc = parse("a: {x: 1}\nb: {x: 2}\n").unwrap();
        let mut seen = Vec::new();
        visit(&doc, |v| {
            if v.path().last_key() == Some("a") {
                v.skip_children();
            }
            if let Some(text) = v.node().as_str() {
                seen.push(text);
            }
        });
        assert_eq!(seen, vec!["2"]);
    }

    #[test]
    fn test_visit_mut_replaces() {
        let mut doc = parse("a: 1\nb: [2, 3]\n").unwrap();
        visit_mut(&mut doc, |node, _| {
            if node.as_str() == Some("2") {
                *node = Node::scalar("two");
            }
        });
        let b = doc.unwrap_document().get("b").unwrap();
        assert_eq!(b.as_sequence().unwrap()[0].as_str(), Some("two"));
    }

    #[test]
    fn test_rewrite_scalars_includes_keys() {
        let mut doc = parse("$K: $K").unwrap();
        rewrite_scalars(&mut doc, &mut |s| Some(s.replace("$K", "v")));
        assert_eq!(doc.unwrap_document().get_str("v"), Some("v"));
    }
}
