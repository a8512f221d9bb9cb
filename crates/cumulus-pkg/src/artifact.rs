/*
 * artifact.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Artifact storage used by the asset-upload directives.
 */

//! Artifact stores.
//!
//! `Rain::S3` and `Rain::S3Http` hand local files to an [`ArtifactStore`] and
//! write the returned location into the template. Talking to a real bucket
//! is the host's job; this crate ships a directory-backed store for local
//! staging and a recording store for tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

/// One upload: a local file or directory, optionally zipped first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub zip: bool,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            zip: false,
        }
    }

    pub fn zipped(mut self, zip: bool) -> Self {
        self.zip = zip;
        self
    }
}

/// Where an uploaded artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
    pub region: String,
}

impl ArtifactLocation {
    /// `s3://bucket/key`
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// `https://bucket.s3.region.amazonaws.com/key`
    pub fn http_url(&self) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, self.key
        )
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot upload {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error("failed to stage {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Uploads local content and reports where it went.
pub trait ArtifactStore: Send + Sync {
    fn upload(&self, request: &UploadRequest) -> Result<ArtifactLocation, ArtifactError>;
}

/// Stages artifacts into a local directory standing in for a bucket.
///
/// Files are copied to `<root>/<sha256>[.ext]`; directories are copied to
/// `<root>/<sha256>/`, hashed over their relative paths and contents, so
/// identical content always lands under the same key.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    root: PathBuf,
    bucket: String,
    region: String,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location(&self, key: String) -> ArtifactLocation {
        ArtifactLocation {
            bucket: self.bucket.clone(),
            key,
            region: self.region.clone(),
        }
    }

    fn stage_file(&self, path: &Path) -> Result<String, ArtifactError> {
        let content = read(path)?;
        let mut key = content_hash(&content);
        if let Some(ext) = path.extension() {
            key.push('.');
            key.push_str(&ext.to_string_lossy());
        }
        write(&self.root.join(&key), &content)?;
        Ok(key)
    }

    fn stage_dir(&self, dir: &Path) -> Result<String, ArtifactError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| ArtifactError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                files.push((relative, read(entry.path())?));
            }
        }

        let mut hasher = Sha256::new();
        for (relative, content) in &files {
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0]);
            hasher.update(content);
        }
        let key = hex::encode(hasher.finalize());

        let target = self.root.join(&key);
        for (relative, content) in &files {
            write(&target.join(relative), content)?;
        }
        Ok(key)
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn upload(&self, request: &UploadRequest) -> Result<ArtifactLocation, ArtifactError> {
        let path = &request.path;
        if request.zip {
            return Err(ArtifactError::Unsupported {
                path: path.clone(),
                reason: "zip packaging is not available in a directory store".into(),
            });
        }
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArtifactError::NotFound(path.clone()),
            _ => ArtifactError::Io {
                path: path.clone(),
                source: e,
            },
        })?;

        let key = if metadata.is_dir() {
            self.stage_dir(path)?
        } else {
            self.stage_file(path)?
        };
        tracing::debug!(path = %path.display(), key = %key, "Staged artifact");
        Ok(self.location(key))
    }
}

/// Records every request and returns `artifact-<n>` keys without touching disk.
#[derive(Debug, Default)]
pub struct RecordingArtifactStore {
    requests: Mutex<Vec<UploadRequest>>,
}

impl RecordingArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<UploadRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl ArtifactStore for RecordingArtifactStore {
    fn upload(&self, request: &UploadRequest) -> Result<ArtifactLocation, ArtifactError> {
        let mut requests = self.requests.lock().map_err(|_| ArtifactError::Unsupported {
            path: request.path.clone(),
            reason: "recording store lock poisoned".into(),
        })?;
        requests.push(request.clone());
        let suffix = if request.zip { ".zip" } else { "" };
        Ok(ArtifactLocation {
            bucket: "test-bucket".into(),
            key: format!("artifact-{}{}", requests.len(), suffix),
            region: "us-east-1".into(),
        })
    }
}

/// Memo of uploads already performed during one transform call.
#[derive(Debug, Default)]
pub(crate) struct UploadCache {
    done: Mutex<HashMap<UploadRequest, ArtifactLocation>>,
}

impl UploadCache {
    pub(crate) fn upload(
        &self,
        store: &dyn ArtifactStore,
        request: UploadRequest,
    ) -> Result<ArtifactLocation, ArtifactError> {
        if let Some(location) = self.done.lock().ok().and_then(|done| done.get(&request).cloned()) {
            tracing::debug!(path = %request.path.display(), "Reusing earlier upload");
            return Ok(location);
        }
        let location = store.upload(&request)?;
        tracing::debug!(path = %request.path.display(), uri = %location.uri(), "Uploaded artifact");
        if let Ok(mut done) = self.done.lock() {
            done.insert(request, location.clone());
        }
        Ok(location)
    }
}

fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &[u8]) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_formats() {
        let location = ArtifactLocation {
            bucket: "b".into(),
            key: "k.zip".into(),
            region: "us-west-2".into(),
        };
        assert_eq!(location.uri(), "s3://b/k.zip");
        assert_eq!(location.http_url(), "https://b.s3.us-west-2.amazonaws.com/k.zip");
    }

    #[test]
    fn test_directory_store_content_addressed() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), "hello").unwrap();
        std::fs::write(src.path().join("b.txt"), "hello").unwrap();

        let store = DirectoryArtifactStore::new(out.path(), "bucket", "us-east-1");
        let a = store.upload(&UploadRequest::new(src.path().join("a.txt"))).unwrap();
        let b = store.upload(&UploadRequest::new(src.path().join("b.txt"))).unwrap();
        assert_eq!(a.key, b.key);
        assert!(a.key.ends_with(".txt"));
        assert_eq!(std::fs::read_to_string(out.path().join(&a.key)).unwrap(), "hello");
    }

    #[test]
    fn test_directory_store_copies_directories() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("lib")).unwrap();
        std::fs::write(src.path().join("lib/handler.py"), "def f(): pass").unwrap();

        let store = DirectoryArtifactStore::new(out.path(), "bucket", "us-east-1");
        let location = store.upload(&UploadRequest::new(src.path())).unwrap();
        assert!(out.path().join(&location.key).join("lib/handler.py").is_file());
    }

    #[test]
    fn test_directory_store_errors() {
        let out = tempfile::tempdir().unwrap();
        let store = DirectoryArtifactStore::new(out.path(), "bucket", "us-east-1");
        assert!(matches!(
            store.upload(&UploadRequest::new(out.path().join("missing"))),
            Err(ArtifactError::NotFound(_))
        ));
        assert!(matches!(
            store.upload(&UploadRequest::new(out.path()).zipped(true)),
            Err(ArtifactError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_upload_cache_memoizes() {
        let store = RecordingArtifactStore::new();
        let cache = UploadCache::default();
        let first = cache.upload(&store, UploadRequest::new("lambda")).unwrap();
        let second = cache.upload(&store, UploadRequest::new("lambda")).unwrap();
        let zipped = cache
            .upload(&store, UploadRequest::new("lambda").zipped(true))
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first, zipped);
        assert_eq!(store.requests().len(), 2);
    }
}
