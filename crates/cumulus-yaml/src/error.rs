//! Error types for tree parsing, navigation and serialization.

use crate::SourceInfo;
use thiserror::Error;

/// Result type alias for cumulus-yaml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, navigating or emitting a tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Syntax error in the source document
    #[error("parse error: {message}")]
    Parse {
        message: String,
        location: Option<SourceInfo>,
    },

    /// A mapping lookup did not find the requested key
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A path could not be followed or written
    #[error("invalid path {path}: {message}")]
    Path { path: String, message: String },

    /// The tree could not be serialized
    #[error("failed to emit document: {0}")]
    Emit(String),

    /// JSON serialization failure
    #[error("failed to emit JSON: {0}")]
    Json(String),
}

impl Error {
    /// Source location of the error, when one is known.
    pub fn location(&self) -> Option<&SourceInfo> {
        match self {
            Error::Parse { location, .. } => location.as_ref(),
            _ => None,
        }
    }
}

impl From<yaml_rust2::ScanError> for Error {
    fn from(err: yaml_rust2::ScanError) -> Self {
        let marker = err.marker();
        Error::Parse {
            message: err.info().to_string(),
            location: Some(SourceInfo::from_marker(marker, 0)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}
