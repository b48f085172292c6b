// SPDX-License-Identifier: MIT OR Apache-2.0
//! Manifest snapshot service (§4.6).
//!
//! A [`Manifest`] is the derived, queryable current-state projection of a
//! movie: canonical input id → resolved value, canonical artefact id →
//! stored output. It is rebuilt from the event log, never mutated in
//! place. [`ManifestService::commit`] is the one place a manifest becomes
//! durable, and it does so atomically — the `manifests/latest` pointer
//! flips only once the new revision's snapshot file is fully written.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mf_core::{ArtefactEvent, EventStatus, Manifest, ManifestArtefact};
use mf_error::{ErrorCode, MediaforgeError};
use mf_storage::StorageContext;
use std::collections::BTreeMap;
use tracing::instrument;

/// Errors from manifest-service operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The underlying storage context failed.
    #[error("manifest storage error: {0}")]
    Storage(#[from] mf_storage::StorageError),
    /// The `latest` pointer or a manifest snapshot could not be parsed.
    #[error("corrupt manifest state: {0}")]
    Corrupt(String),
}

impl From<ManifestError> for MediaforgeError {
    fn from(err: ManifestError) -> Self {
        MediaforgeError::new(ErrorCode::ManifestCommitFailed, err.to_string()).with_source(err)
    }
}

/// The manifest-service interface depended on by the runner (§4.6).
#[async_trait]
pub trait ManifestService: Send + Sync {
    /// Load the most recently committed manifest for `movie_id`, or the
    /// zero manifest if none has ever been committed.
    async fn load_latest(&self, movie_id: &str) -> Result<Manifest, ManifestError>;

    /// Compose a fresh manifest from a revision's events, layered over the
    /// resolved input values that produced them. Only `Succeeded` and
    /// `Skipped` events contribute an artefact entry; the latest entry per
    /// canonical id wins.
    fn build_from_events(
        &self,
        revision: &str,
        base_revision: Option<String>,
        events_for_revision: &[ArtefactEvent],
        inputs: BTreeMap<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Manifest;

    /// Persist `manifest` as `movie_id`'s new current revision.
    ///
    /// Writes `manifests/<revision>.json`, then atomically flips the
    /// `manifests/latest` pointer file to contain the new revision id.
    async fn commit(&self, movie_id: &str, manifest: &Manifest) -> Result<(), ManifestError>;
}

fn manifest_path(movie_id: &str, revision: &str) -> String {
    format!("{movie_id}/manifests/{revision}.json")
}

fn latest_pointer_path(movie_id: &str) -> String {
    format!("{movie_id}/manifests/latest")
}

/// A [`ManifestService`] backed by a [`StorageContext`].
pub struct StorageManifestService<S: StorageContext> {
    storage: S,
}

impl<S: StorageContext> StorageManifestService<S> {
    /// Wrap a storage context as a manifest service.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: StorageContext> ManifestService for StorageManifestService<S> {
    #[instrument(skip(self), fields(movie_id))]
    async fn load_latest(&self, movie_id: &str) -> Result<Manifest, ManifestError> {
        let pointer_path = latest_pointer_path(movie_id);
        let revision = match self.storage.read_to_string(&pointer_path).await {
            Ok(s) => s.trim().to_string(),
            Err(mf_storage::StorageError::Io { .. }) => return Ok(Manifest::zero(Utc::now())),
            Err(other) => return Err(other.into()),
        };
        let body = self
            .storage
            .read_to_string(&manifest_path(movie_id, &revision))
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| ManifestError::Corrupt(format!("revision {revision}: {e}")))
    }

    fn build_from_events(
        &self,
        revision: &str,
        base_revision: Option<String>,
        events_for_revision: &[ArtefactEvent],
        inputs: BTreeMap<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Manifest {
        let mut artefacts: BTreeMap<String, ManifestArtefact> = BTreeMap::new();
        for event in events_for_revision {
            match event.status {
                EventStatus::Succeeded | EventStatus::Skipped => {
                    let Some(output) = event.output.clone() else {
                        continue;
                    };
                    artefacts.insert(
                        event.artefact_id.as_wire(),
                        ManifestArtefact {
                            output,
                            produced_by: event.produced_by.clone(),
                            inputs_hash: event.inputs_hash.clone(),
                            revision: event.revision.clone(),
                        },
                    );
                }
                EventStatus::Failed => {
                    artefacts.remove(&event.artefact_id.as_wire());
                }
            }
        }
        Manifest {
            revision: revision.into(),
            base_revision,
            created_at,
            inputs,
            artefacts,
        }
    }

    #[instrument(skip(self, manifest), fields(movie_id, revision = %manifest.revision))]
    async fn commit(&self, movie_id: &str, manifest: &Manifest) -> Result<(), ManifestError> {
        let body = serde_json::to_vec_pretty(manifest)
            .map_err(|e| ManifestError::Corrupt(e.to_string()))?;
        let snapshot_path = manifest_path(movie_id, &manifest.revision);
        self.storage.write(&snapshot_path, &body).await?;

        let pointer_path = latest_pointer_path(movie_id);
        let tmp_pointer_path = format!(
            "{movie_id}/manifests/.latest.tmp-{}",
            uuid::Uuid::new_v4()
        );
        self.storage
            .write(&tmp_pointer_path, manifest.revision.as_bytes())
            .await?;
        self.storage.rename(&tmp_pointer_path, &pointer_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::canon::NodeKind;
    use mf_core::{ArtefactOutput, CanonicalId, Diagnostics};
    use mf_storage::FilesystemStorage;

    fn artefact_id(name: &str) -> CanonicalId {
        CanonicalId::new(NodeKind::Artifact, name)
    }

    fn producer_id() -> CanonicalId {
        CanonicalId::new(NodeKind::Producer, "scene.render")
    }

    #[tokio::test]
    async fn load_latest_on_fresh_movie_returns_zero_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let svc = StorageManifestService::new(FilesystemStorage::new(dir.path()));
        let manifest = svc.load_latest("movie-1").await.unwrap();
        assert!(manifest.is_zero());
    }

    #[tokio::test]
    async fn commit_then_load_latest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let svc = StorageManifestService::new(FilesystemStorage::new(dir.path()));

        let events = vec![ArtefactEvent::succeeded(
            artefact_id("scene.audio"),
            "1",
            "hash-1",
            ArtefactOutput::Inline {
                value: serde_json::json!("ok"),
            },
            producer_id(),
            Utc::now(),
        )];
        let manifest = svc.build_from_events("1", None, &events, BTreeMap::new(), Utc::now());
        svc.commit("movie-1", &manifest).await.unwrap();

        let loaded = svc.load_latest("movie-1").await.unwrap();
        assert_eq!(loaded.revision, "1");
        assert_eq!(loaded.artefacts.len(), 1);
    }

    #[tokio::test]
    async fn build_from_events_later_failure_removes_prior_success() {
        let svc = StorageManifestService::new(FilesystemStorage::new(
            tempfile::tempdir().unwrap().path(),
        ));
        let id = artefact_id("scene.audio");
        let events = vec![
            ArtefactEvent::succeeded(
                id.clone(),
                "1",
                "hash-1",
                ArtefactOutput::Inline {
                    value: serde_json::json!("ok"),
                },
                producer_id(),
                Utc::now(),
            ),
            ArtefactEvent::failed(
                id.clone(),
                "1",
                "hash-2",
                producer_id(),
                Utc::now(),
                Diagnostics {
                    code: "PROVIDER_FAILURE".to_string(),
                    message: "regenerated and failed".to_string(),
                    user_action_required: false,
                    attempt: 2,
                },
            ),
        ];
        let manifest = svc.build_from_events("1", None, &events, BTreeMap::new(), Utc::now());
        assert!(manifest.artefacts.get(&id.as_wire()).is_none());
    }

    #[tokio::test]
    async fn build_from_events_keeps_latest_succeeded_entry() {
        let svc = StorageManifestService::new(FilesystemStorage::new(
            tempfile::tempdir().unwrap().path(),
        ));
        let id = artefact_id("scene.audio");
        let events = vec![
            ArtefactEvent::succeeded(
                id.clone(),
                "1",
                "hash-1",
                ArtefactOutput::Inline {
                    value: serde_json::json!("first"),
                },
                producer_id(),
                Utc::now(),
            ),
            ArtefactEvent::succeeded(
                id.clone(),
                "1",
                "hash-2",
                ArtefactOutput::Inline {
                    value: serde_json::json!("second"),
                },
                producer_id(),
                Utc::now(),
            ),
        ];
        let manifest = svc.build_from_events("1", None, &events, BTreeMap::new(), Utc::now());
        let entry = manifest.artefact(&id.as_wire()).unwrap();
        assert_eq!(entry.inputs_hash, "hash-2");
    }

    #[tokio::test]
    async fn commit_is_atomic_across_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let svc = StorageManifestService::new(FilesystemStorage::new(dir.path()));

        let m1 = svc.build_from_events("1", None, &[], BTreeMap::new(), Utc::now());
        svc.commit("movie-1", &m1).await.unwrap();
        let m2 = svc.build_from_events(
            "2",
            Some(m1.content_hash().unwrap()),
            &[],
            BTreeMap::new(),
            Utc::now(),
        );
        svc.commit("movie-1", &m2).await.unwrap();

        let loaded = svc.load_latest("movie-1").await.unwrap();
        assert_eq!(loaded.revision, "2");
        assert_eq!(loaded.base_revision, Some(m1.content_hash().unwrap()));
    }
}
