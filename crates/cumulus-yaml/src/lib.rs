//! # cumulus-yaml
//!
//! The template tree used by the packager, with source location tracking.
//!
//! This crate provides [`Node`], an owned tree of scalars, sequences,
//! mappings, aliases and documents. Each node carries its tag, anchor,
//! comments, style hint and [`SourceInfo`], so errors raised during a
//! transformation can point at the text the author wrote.
//!
//! On top of the tree it offers:
//!
//! - a pre-order [`visit`]or with stop/skip control
//! - [`query`], a lazy `/`-delimited path pattern engine (`*`, `**`, `|Key==Value`)
//! - [`flatten_aliases`], turning anchor sharing into independent copies
//! - the codec: [`parse`], [`to_yaml_string`], [`to_json_string`]
//!
//! ## Example
//!
//! ```rust
//! use cumulus_yaml::{parse, query, to_json_string};
//!
//! let doc = parse("Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\n").unwrap();
//! let ids: Vec<String> = query(&doc, "Resources/*")
//!     .map(|m| m.path.to_string())
//!     .collect();
//! assert_eq!(ids, vec!["/Resources/Bucket"]);
//!
//! let json = to_json_string(&doc).unwrap();
//! assert!(json.contains("AWS::S3::Bucket"));
//! ```

mod anchors;
mod emit;
mod error;
mod node;
mod parser;
mod path;
mod query;
mod source_info;
mod visitor;

pub use anchors::{flatten_aliases, has_aliases};
pub use emit::{ScalarValue, to_json_string, to_json_value, to_yaml_string};
pub use error::{Error, Result};
pub use node::{Comments, MapEntry, Node, NodeKind, Style};
pub use parser::{parse, parse_file};
pub use path::{NodePath, PathSegment};
pub use query::{Match, OwnedQuery, Pattern, Query, query, query_paths};
pub use source_info::SourceInfo;
pub use visitor::{VisitControl, Visitor, rewrite_scalars, visit, visit_mut};
