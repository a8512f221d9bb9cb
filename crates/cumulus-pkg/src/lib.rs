//! Template packaging for CloudFormation-style infrastructure templates
//!
//! This crate rewrites a template containing packaging directives into a
//! plain template a deployment service accepts. Directives cover file
//! inclusion, environment and constant lookups, asset uploads, and module
//! inlining, where a reusable sub-template is spliced into the caller with
//! its resources renamed and its parameters bound.
//!
//! # Architecture
//!
//! - [`Packager`] - Entry point, configured with a [`ModuleSource`], an
//!   optional [`ArtifactStore`] and a [`DirectiveRegistry`]
//! - [`DirectiveHandler`] - One rewrite rule, found by a path pattern
//! - [`Scope`] - Constants and package aliases of one document
//! - [`conditions`] - Static evaluation of module conditions
//! - [`iteration`] - `Map` duplication of module references
//!
//! # Example
//!
//! ```ignore
//! use cumulus_pkg::{MemoryModuleSource, ModuleBase, Packager};
//! use cumulus_yaml::{parse, to_yaml_string};
//!
//! let packager = Packager::builder()
//!     .source(MemoryModuleSource::new().with_file("bucket.yaml", MODULE))
//!     .build()?;
//! let output = packager.transform(parse(TEMPLATE)?, &ModuleBase::Dir(".".into()))?;
//! println!("{}", to_yaml_string(&output)?);
//! ```

mod artifact;
pub mod conditions;
pub mod constants;
mod directive;
pub mod directives;
mod driver;
mod error;
pub mod intrinsics;
pub mod iteration;
mod module;
mod options;
mod source;
pub mod sub;

pub use artifact::{
    ArtifactError, ArtifactLocation, ArtifactStore, DirectoryArtifactStore,
    RecordingArtifactStore, UploadRequest,
};
pub use constants::{PackageAlias, Scope};
pub use directive::{DirectiveContext, DirectiveHandler, DirectiveRegistry, ModuleFrame};
pub use driver::{Packager, PackagerBuilder, transform};
pub use error::{ErrorCategory, PackageError, Result};
pub use options::PackageOptions;
pub use source::{
    FileModuleSource, MemoryModuleSource, ModuleBase, ModuleContent, ModuleSource, SourceError,
};
