/*
 * source.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Module source abstraction: where included files and modules come from.
 */

//! Module sources.
//!
//! Everything the packager reads (modules, `Rain::Include` and
//! `Rain::Embed` files) goes through [`ModuleSource`], so the embedding
//! application decides how local paths, URLs and package archives are
//! fetched.
//!
//! - [`FileModuleSource`] reads local files and rejects remote and archive
//!   locations.
//! - [`MemoryModuleSource`] serves files from memory, for tests and for
//!   hosts without a filesystem.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// The location relative references are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleBase {
    /// A local directory
    Dir(PathBuf),
    /// A remote location, without a trailing slash
    Uri(String),
}

impl ModuleBase {
    /// Human-readable form for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            ModuleBase::Dir(dir) => dir.display().to_string(),
            ModuleBase::Uri(uri) => uri.clone(),
        }
    }
}

/// Bytes of a fetched module or file, plus the base for its own references.
#[derive(Debug, Clone)]
pub struct ModuleContent {
    pub bytes: Vec<u8>,
    pub base: ModuleBase,
    /// Fully resolved location, used in messages and as a cache key
    pub location: String,
}

impl ModuleContent {
    pub fn text(&self) -> Result<&str, SourceError> {
        std::str::from_utf8(&self.bytes).map_err(|_| SourceError::Encoding(self.location.clone()))
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("module not found: {0}")]
    NotFound(String),

    #[error("'{0}' is a directory")]
    IsDirectory(String),

    #[error("unsupported module location {location}: {reason}")]
    Unsupported { location: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not valid UTF-8")]
    Encoding(String),
}

/// Fetches module and file content.
pub trait ModuleSource: Send + Sync {
    /// Fetch `uri`, interpreting relative references against `base`.
    fn resolve(&self, uri: &str, base: &ModuleBase) -> Result<ModuleContent, SourceError>;
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("https://") || uri.starts_with("http://")
}

/// Parent of a remote location: `https://h/a/b.yaml` -> `https://h/a`.
fn remote_parent(uri: &str) -> String {
    match uri.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => uri.to_string(),
    }
}

/// Reads modules from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileModuleSource;

impl ModuleSource for FileModuleSource {
    fn resolve(&self, uri: &str, base: &ModuleBase) -> Result<ModuleContent, SourceError> {
        if is_remote(uri) {
            return Err(SourceError::Unsupported {
                location: uri.to_string(),
                reason: "remote modules are not available from the local filesystem".into(),
            });
        }
        let path = match base {
            ModuleBase::Dir(dir) => {
                let candidate = Path::new(uri);
                if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    dir.join(candidate)
                }
            }
            ModuleBase::Uri(base) => {
                return Err(SourceError::Unsupported {
                    location: format!("{}/{}", base, uri),
                    reason: "relative reference inside a remote module".into(),
                });
            }
        };

        let inside_archive = path
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| c.as_os_str().to_string_lossy().ends_with(".zip"));
        if inside_archive {
            return Err(SourceError::Unsupported {
                location: path.display().to_string(),
                reason: "package archive members must be supplied by the host".into(),
            });
        }

        let metadata = std::fs::metadata(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            _ => SourceError::Read {
                path: path.clone(),
                source: e,
            },
        })?;
        if metadata.is_dir() {
            return Err(SourceError::IsDirectory(path.display().to_string()));
        }
        let bytes = std::fs::read(&path).map_err(|source| SourceError::Read {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Read module file");
        let base = ModuleBase::Dir(path.parent().map(Path::to_path_buf).unwrap_or_default());
        Ok(ModuleContent {
            bytes,
            base,
            location: path.display().to_string(),
        })
    }
}

/// Serves modules from memory.
///
/// Local files are keyed by their normalized relative path (`modules/a.yaml`);
/// remote files by their full URL.
#[derive(Debug, Default, Clone)]
pub struct MemoryModuleSource {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryModuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        let key = if is_remote(path) {
            path.to_string()
        } else {
            normalize(Path::new(path))
        };
        self.files.insert(key, content.into());
    }
}

impl ModuleSource for MemoryModuleSource {
    fn resolve(&self, uri: &str, base: &ModuleBase) -> Result<ModuleContent, SourceError> {
        let (key, base) = if is_remote(uri) {
            (uri.to_string(), ModuleBase::Uri(remote_parent(uri)))
        } else {
            match base {
                ModuleBase::Dir(dir) => {
                    let key = normalize(&dir.join(uri));
                    let parent = Path::new(&key)
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    (key, ModuleBase::Dir(parent))
                }
                ModuleBase::Uri(base) => {
                    let key = format!("{}/{}", base, uri);
                    let parent = remote_parent(&key);
                    (key, ModuleBase::Uri(parent))
                }
            }
        };

        let bytes = self
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(key.clone()))?;
        Ok(ModuleContent {
            bytes,
            base,
            location: key,
        })
    }
}

/// Lexically normalize a relative path, resolving `.` and `..`.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".into());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir => parts.push(String::new()),
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned())
            }
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_relative_resolution() {
        let source = MemoryModuleSource::new()
            .with_file("modules/bucket.yaml", "Resources: {}")
            .with_file("shared/policy.yaml", "x: 1");

        let root = ModuleBase::Dir(PathBuf::new());
        let module = source.resolve("modules/bucket.yaml", &root).unwrap();
        assert_eq!(module.base, ModuleBase::Dir(PathBuf::from("modules")));

        let nested = source.resolve("../shared/policy.yaml", &module.base).unwrap();
        assert_eq!(nested.text().unwrap(), "x: 1");
        assert_eq!(nested.location, "shared/policy.yaml");
    }

    #[test]
    fn test_memory_remote_base() {
        let source = MemoryModuleSource::new()
            .with_file("https://example.com/m/a.yaml", "a")
            .with_file("https://example.com/m/b.yaml", "b");
        let a = source
            .resolve("https://example.com/m/a.yaml", &ModuleBase::Dir(PathBuf::new()))
            .unwrap();
        assert_eq!(a.base, ModuleBase::Uri("https://example.com/m".into()));
        let b = source.resolve("b.yaml", &a.base).unwrap();
        assert_eq!(b.text().unwrap(), "b");
    }

    #[test]
    fn test_memory_not_found() {
        let err = MemoryModuleSource::new()
            .resolve("missing.yaml", &ModuleBase::Dir(PathBuf::new()))
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[test]
    fn test_file_source_reads_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("modules")).unwrap();
        std::fs::write(dir.path().join("modules/a.yaml"), "Resources: {}").unwrap();

        let base = ModuleBase::Dir(dir.path().to_path_buf());
        let content = FileModuleSource.resolve("modules/a.yaml", &base).unwrap();
        assert_eq!(content.text().unwrap(), "Resources: {}");
        assert_eq!(content.base, ModuleBase::Dir(dir.path().join("modules")));

        let err = FileModuleSource.resolve("modules", &base).unwrap_err();
        assert!(matches!(err, SourceError::IsDirectory(_)));
    }

    #[test]
    fn test_file_source_rejects_remote_and_archives() {
        let base = ModuleBase::Dir(PathBuf::from("."));
        assert!(matches!(
            FileModuleSource.resolve("https://example.com/a.yaml", &base),
            Err(SourceError::Unsupported { .. })
        ));
        assert!(matches!(
            FileModuleSource.resolve("pkg.zip/a.yaml", &base),
            Err(SourceError::Unsupported { .. })
        ));
    }
}
