/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types for template packaging.
 */

use cumulus_yaml::SourceInfo;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::source::SourceError;

/// The broad failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed document or interpolation string
    Syntax,
    /// Directive input has the wrong tree shape
    Structural,
    /// A reference could not be bound
    Resolution,
    /// Semantic misuse, such as overriding a module parameter
    Validation,
    /// The fixpoint pass ceiling was exceeded
    Convergence,
    /// Reading modules, files, or uploading artifacts failed
    Io,
    /// Invalid packager options
    Options,
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("structural error: {0}")]
    Structural(String),

    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("reached the limit of {passes} passes while transforming")]
    Convergence { passes: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Yaml(#[from] cumulus_yaml::Error),

    #[error("invalid options: {0}")]
    Options(String),

    /// An error raised while inlining a module, with the module source.
    #[error("failed to process module {module}: {source}")]
    Module {
        module: String,
        #[source]
        source: Box<PackageError>,
    },
}

impl PackageError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap an error raised while inlining `module`.
    pub fn in_module(module: impl Into<String>, source: PackageError) -> Self {
        Self::Module {
            module: module.into(),
            source: Box::new(source),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PackageError::Syntax(_) | PackageError::Yaml(_) => ErrorCategory::Syntax,
            PackageError::Structural(_) => ErrorCategory::Structural,
            PackageError::Resolution(_) => ErrorCategory::Resolution,
            PackageError::Validation(_) => ErrorCategory::Validation,
            PackageError::Convergence { .. } => ErrorCategory::Convergence,
            PackageError::Io(_) | PackageError::Source(_) | PackageError::Artifact(_) => {
                ErrorCategory::Io
            }
            PackageError::Options(_) => ErrorCategory::Options,
            PackageError::Module { source, .. } => source.category(),
        }
    }

    /// The innermost error, looking through module wrappers.
    pub fn root_cause(&self) -> &PackageError {
        match self {
            PackageError::Module { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Format a source position for inclusion in an error message.
pub(crate) fn at(info: &SourceInfo) -> String {
    format!(" (at {})", info)
}

pub type Result<T> = std::result::Result<T, PackageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_looks_through_module_wrappers() {
        let err = PackageError::in_module(
            "outer.yaml",
            PackageError::in_module("inner.yaml", PackageError::validation("bad override")),
        );
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(matches!(err.root_cause(), PackageError::Validation(_)));
        assert!(err.to_string().contains("outer.yaml"));
    }

    #[test]
    fn test_yaml_errors_are_syntax() {
        let yaml_err = cumulus_yaml::parse("a: [").unwrap_err();
        let err: PackageError = yaml_err.into();
        assert_eq!(err.category(), ErrorCategory::Syntax);
    }
}
