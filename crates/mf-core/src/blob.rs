//! Content-addressed [`Blob`] reference and the MIME → extension table used
//! for blob pathing (§3, §6).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A content-addressed reference to stored artefact bytes.
///
/// Blobs are write-once: once a hash exists in the blob store it is never
/// rewritten (§3 Lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Blob {
    /// Lowercase hex SHA-256 digest of the raw bytes.
    pub hash: String,
    /// Byte length of the blob.
    pub size: u64,
    /// MIME type as reported by the producer handler.
    pub mime_type: String,
}

impl Blob {
    /// The storage key for this blob under a given movie id:
    /// `<movie_id>/blobs/<hash[..2]>/<hash>.<ext>` (§4.4, §6.3).
    ///
    /// # Panics
    ///
    /// Panics if `hash` is shorter than 2 characters — callers always
    /// derive `hash` from [`crate::hash::sha256_hex`], which is 64
    /// characters.
    #[must_use]
    pub fn storage_key(&self, movie_id: &str) -> String {
        let prefix = &self.hash[..2];
        let ext = extension_for_mime(&self.mime_type);
        format!("{movie_id}/blobs/{prefix}/{}.{ext}", self.hash)
    }
}

/// Map a MIME type to a file extension via the fixed table in §6.3.
/// Unrecognised MIME types fall back to `"bin"`.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "text/plain" => "txt",
        "application/json" => "json",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "video/mp4" => "mp4",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ => "bin",
    }
}
