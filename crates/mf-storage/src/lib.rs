// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backend-agnostic storage context for mediaforge (§4.4).
//!
//! [`StorageContext`] is the narrow key/value + blob interface the event
//! log, manifest service, and runner depend on. [`FilesystemStorage`] is the
//! only concrete implementation shipped here; object-store/in-memory
//! backends are expected to implement the same trait.
//!
//! Every path accepted by this crate is composed through [`contain`], which
//! rejects any component that could escape the configured root — `..`,
//! absolute paths, and Windows path prefixes are all refused before they
//! ever reach the filesystem.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use mf_core::{extension_for_mime, Blob};
use mf_error::{ErrorCode, MediaforgeError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors from storage-context operations (§7 `StorageError`).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The composed path would escape the configured root.
    #[error("path escapes storage root: {path}")]
    PathEscape {
        /// The offending relative path.
        path: String,
    },
    /// The underlying filesystem operation failed.
    #[error("storage I/O error at '{path}': {source}")]
    Io {
        /// The path the operation was attempted against.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<StorageError> for MediaforgeError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::PathEscape { .. } => ErrorCode::StoragePathEscape,
            StorageError::Io { .. } => ErrorCode::StorageIoError,
        };
        let message = err.to_string();
        MediaforgeError::new(code, message).with_source(err)
    }
}

/// Join `rel` onto `root`, rejecting any component that could traverse
/// outside `root` (§4.4).
///
/// # Errors
///
/// Returns [`StorageError::PathEscape`] if `rel` contains a `..`, an
/// absolute root, or a path prefix (Windows drive letters/UNC).
pub fn contain(root: &Path, rel: &str) -> Result<PathBuf, StorageError> {
    mf_glob::contained_join(root, rel).ok_or_else(|| StorageError::PathEscape {
        path: rel.to_string(),
    })
}

/// The narrow storage interface depended on by the event log, manifest
/// service, and runner (§4.4).
#[async_trait]
pub trait StorageContext: Send + Sync {
    /// Write `bytes` at `path`, creating parent directories as needed.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the file at `path` as a UTF-8 string.
    async fn read_to_string(&self, path: &str) -> Result<String, StorageError>;

    /// Read the file at `path` as raw bytes.
    async fn read_to_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create `path` (and any missing ancestors) as a directory.
    async fn create_directory(&self, path: &str) -> Result<(), StorageError>;

    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// List the immediate entries of the directory at `path`, as paths
    /// relative to the storage root.
    async fn list(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Atomically move `from` to `to`, both relative to the storage root.
    /// Used to flip pointer files (e.g. `manifests/latest`) without a
    /// reader ever observing a partially written target.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;
}

/// A [`StorageContext`] backed by the local filesystem, rooted at a single
/// directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Create a filesystem storage context rooted at `root`. `root` itself
    /// is not required to exist yet; it is created lazily on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageContext for FilesystemStorage {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = contain(&self.root, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|source| io_err(&full, source))
    }

    async fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        let full = contain(&self.root, path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|source| io_err(&full, source))
    }

    async fn read_to_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = contain(&self.root, path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|source| io_err(&full, source))
    }

    async fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        let full = contain(&self.root, path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|source| io_err(&full, source))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = contain(&self.root, path)?;
        Ok(tokio::fs::try_exists(&full)
            .await
            .map_err(|source| io_err(&full, source))?)
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let full = contain(&self.root, path)?;
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(source) => return Err(io_err(&full, source)),
        };
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|source| io_err(&full, source))?
        {
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                entries.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let full_from = contain(&self.root, from)?;
        let full_to = contain(&self.root, to)?;
        if let Some(parent) = full_to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        tokio::fs::rename(&full_from, &full_to)
            .await
            .map_err(|source| io_err(&full_to, source))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `bytes` as a content-addressed blob under `movie_id` and return its
/// [`Blob`] reference (§4.4).
///
/// Idempotent: if a blob with the computed hash already exists at its
/// storage key, the write is skipped (hash equality implies byte equality,
/// §3 Lifecycle — blobs are write-once).
///
/// # Errors
///
/// Returns [`StorageError`] if the underlying storage context fails.
pub async fn write_blob(
    storage: &dyn StorageContext,
    movie_id: &str,
    bytes: &[u8],
    mime_type: &str,
) -> Result<Blob, StorageError> {
    let hash = mf_core::hash::sha256_hex(bytes);
    let blob = Blob {
        hash,
        size: bytes.len() as u64,
        mime_type: mime_type.to_string(),
    };
    let key = blob.storage_key(movie_id);
    if storage.exists(&key).await? {
        debug!(target: "mf_storage", %key, "blob already exists, skipping write");
        return Ok(blob);
    }
    storage.write(&key, bytes).await?;
    Ok(blob)
}

/// Read a previously written blob's raw bytes by its storage key (§4.4,
/// §6.3).
///
/// # Errors
///
/// Returns [`StorageError`] if the blob does not exist or cannot be read.
pub async fn read_blob(
    storage: &dyn StorageContext,
    movie_id: &str,
    blob: &Blob,
) -> Result<Vec<u8>, StorageError> {
    storage.read_to_bytes(&blob.storage_key(movie_id)).await
}

/// Re-export so callers constructing blob keys do not need a separate
/// `mf-core` dependency just for [`extension_for_mime`].
pub use extension_for_mime as mime_extension;
