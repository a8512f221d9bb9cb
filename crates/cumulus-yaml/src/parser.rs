//! YAML parser that builds [`Node`] trees.

use crate::node::{MapEntry, Node, NodeKind, Style};
use crate::{Error, Result, SourceInfo};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// Handle yaml-rust2 reports for `!!` tags.
const CORE_SCHEMA_HANDLE: &str = "tag:yaml.org,2002:";

/// Parse YAML text into a document node.
///
/// Only the first document of a multi-document stream is read. Local tags
/// (`!Ref`) are kept verbatim on the node; anchors are named after the
/// parser's anchor ids, so `&a ... *a` becomes a node with anchor
/// `anchor1` and an alias to `anchor1`.
///
/// # Example
///
/// ```rust
/// use cumulus_yaml::parse;
///
/// let doc = parse("Resources: {}").unwrap();
/// assert!(doc.is_document());
/// assert!(doc.unwrap_document().get("Resources").is_some());
/// ```
///
/// # Errors
///
/// Returns [`Error::Parse`] if the text is not valid YAML, contains
/// no document, or defines the same mapping key twice.
pub fn parse(content: &str) -> Result<Node> {
    parse_impl(content, None)
}

/// Parse YAML text, recording `filename` in every node's source info.
///
/// # Example
///
/// ```rust
/// use cumulus_yaml::parse_file;
///
/// let doc = parse_file("a: 1", "template.yaml").unwrap();
/// assert_eq!(doc.source_info.file, Some("template.yaml".into()));
/// ```
pub fn parse_file(content: &str, filename: &str) -> Result<Node> {
    parse_impl(content, Some(filename))
}

fn parse_impl(content: &str, filename: Option<&str>) -> Result<Node> {
    let mut parser = Parser::new_from_str(content);
    let mut builder = NodeBuilder::new(filename);

    parser.load(&mut builder, false)?;

    builder.result()
}

/// Receives parser events and assembles the tree.
struct NodeBuilder {
    filename: Option<String>,

    /// Collections under construction
    stack: Vec<BuildNode>,

    /// Completed document root
    root: Option<Node>,

    /// First structural error seen; events cannot fail, so it is reported at the end
    error: Option<Error>,
}

/// Properties shared by collections under construction.
struct Header {
    start_marker: Marker,
    tag: Option<String>,
    anchor: Option<String>,
}

enum BuildNode {
    Sequence {
        header: Header,
        items: Vec<Node>,
    },
    Mapping {
        header: Header,
        entries: Vec<(Node, Option<Node>)>,
    },
}

impl NodeBuilder {
    fn new(filename: Option<&str>) -> Self {
        Self {
            filename: filename.map(|s| s.to_string()),
            stack: Vec::new(),
            root: None,
            error: None,
        }
    }

    fn result(self) -> Result<Node> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let root = self.root.ok_or_else(|| Error::Parse {
            message: "No YAML document found".into(),
            location: None,
        })?;
        let source_info = root.source_info.clone();
        Ok(Node::document(root).with_source_info(source_info))
    }

    fn push_complete(&mut self, node: Node) {
        let Some(parent) = self.stack.last_mut() else {
            self.root = Some(node);
            return;
        };

        match parent {
            BuildNode::Sequence { items, .. } => items.push(node),
            BuildNode::Mapping { entries, .. } => match entries.last_mut() {
                Some((_, value @ None)) => *value = Some(node),
                _ => entries.push((node, None)),
            },
        }
    }

    fn make_source_info(&self, marker: &Marker, len: usize) -> SourceInfo {
        let mut info = SourceInfo::from_marker(marker, len);
        if let Some(ref filename) = self.filename {
            info = info.with_file(filename.clone());
        }
        info
    }

    fn record_error(&mut self, message: String, location: SourceInfo) {
        if self.error.is_none() {
            self.error = Some(Error::Parse {
                message,
                location: Some(location),
            });
        }
    }

    fn finish_mapping(&mut self, header: Header, entries: Vec<(Node, Option<Node>)>, end: &Marker) {
        let len = end.index().saturating_sub(header.start_marker.index());
        let source_info = self.make_source_info(&header.start_marker, len);

        let mut mapping: Vec<MapEntry> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key_text = key.as_str().unwrap_or_default().to_string();
            if key.is_scalar() && mapping.iter().any(|e| e.key.as_str() == Some(&key_text)) {
                self.record_error(
                    format!("mapping key \"{}\" already defined", key_text),
                    key.source_info.clone(),
                );
            }
            let value = value.unwrap_or_else(|| {
                Node::null().with_source_info(key.source_info.clone())
            });
            mapping.push(MapEntry { key, value });
        }

        let mut node = Node::mapping(mapping).with_source_info(source_info);
        node.tag = header.tag;
        node.anchor = header.anchor;
        self.push_complete(node);
    }
}

impl MarkedEventReceiver for NodeBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        match ev {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}

            Event::Scalar(value, style, anchor_id, tag) => {
                let source_info = self.make_source_info(&marker, value.len());
                let mut node = Node::scalar(value)
                    .with_source_info(source_info)
                    .with_style(scalar_style(style));
                node.tag = tag.as_ref().map(tag_name);
                node.anchor = anchor_name(anchor_id);
                self.push_complete(node);
            }

            Event::SequenceStart(anchor_id, tag) => {
                self.stack.push(BuildNode::Sequence {
                    header: Header {
                        start_marker: marker,
                        tag: tag.as_ref().map(tag_name),
                        anchor: anchor_name(anchor_id),
                    },
                    items: Vec::new(),
                });
            }

            Event::SequenceEnd => {
                if let Some(BuildNode::Sequence { header, items }) = self.stack.pop() {
                    let len = marker.index().saturating_sub(header.start_marker.index());
                    let source_info = self.make_source_info(&header.start_marker, len);
                    let mut node = Node::sequence(items).with_source_info(source_info);
                    node.tag = header.tag;
                    node.anchor = header.anchor;
                    self.push_complete(node);
                }
            }

            Event::MappingStart(anchor_id, tag) => {
                self.stack.push(BuildNode::Mapping {
                    header: Header {
                        start_marker: marker,
                        tag: tag.as_ref().map(tag_name),
                        anchor: anchor_name(anchor_id),
                    },
                    entries: Vec::new(),
                });
            }

            Event::MappingEnd => {
                if let Some(BuildNode::Mapping { header, entries }) = self.stack.pop() {
                    self.finish_mapping(header, entries, &marker);
                }
            }

            Event::Alias(anchor_id) => {
                let source_info = self.make_source_info(&marker, 0);
                let node = Node {
                    kind: NodeKind::Alias(format!("anchor{}", anchor_id)),
                    ..Node::null()
                }
                .with_source_info(source_info);
                self.push_complete(node);
            }
        }
    }
}

fn anchor_name(anchor_id: usize) -> Option<String> {
    (anchor_id > 0).then(|| format!("anchor{}", anchor_id))
}

/// Render a parsed tag the way it was written: `!Ref`, `!!str`.
fn tag_name(tag: &Tag) -> String {
    if tag.handle == CORE_SCHEMA_HANDLE {
        format!("!!{}", tag.suffix)
    } else {
        format!("{}{}", tag.handle, tag.suffix)
    }
}

fn scalar_style(style: TScalarStyle) -> Style {
    match style {
        TScalarStyle::SingleQuoted => Style::SingleQuoted,
        TScalarStyle::DoubleQuoted => Style::DoubleQuoted,
        TScalarStyle::Literal => Style::Literal,
        TScalarStyle::Folded => Style::Folded,
        #[allow(unreachable_patterns)]
        _ => Style::Plain,
    }
}
