// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only artefact event log (§4.5).
//!
//! One NDJSON file per movie at `<movie_id>/events/events.ndjson`. Every
//! [`mf_core::ArtefactEvent`] ever recorded for a movie lives in this file,
//! appended to but never rewritten or truncated — the manifest is rebuilt
//! from this log, not the other way around.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use mf_core::ArtefactEvent;
use mf_error::{ErrorCode, MediaforgeError};
use mf_storage::StorageContext;
use tracing::{instrument, warn};

/// Errors from event-log operations.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The underlying storage context failed.
    #[error("event log storage error: {0}")]
    Storage(#[from] mf_storage::StorageError),
    /// A line in the log could not be parsed as an `ArtefactEvent`.
    #[error("malformed event log record at line {line}: {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Parse failure reason.
        reason: String,
    },
}

impl From<EventLogError> for MediaforgeError {
    fn from(err: EventLogError) -> Self {
        let code = match &err {
            EventLogError::Storage(_) => ErrorCode::StorageIoError,
            EventLogError::Malformed { .. } => ErrorCode::EventLogCorrupt,
        };
        MediaforgeError::new(code, err.to_string()).with_source(err)
    }
}

/// The append-only event log interface depended on by the manifest service
/// and runner (§4.5).
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event record to the movie's log.
    async fn append_artefact(
        &self,
        movie_id: &str,
        event: &ArtefactEvent,
    ) -> Result<(), EventLogError>;

    /// Return every event recorded for `movie_id`, in append order.
    async fn list_artefacts(&self, movie_id: &str) -> Result<Vec<ArtefactEvent>, EventLogError>;

    /// Return the most recent event for `artefact_id` within `movie_id`, if
    /// any, scanning the log in append order and keeping the last match.
    async fn latest_artefact(
        &self,
        movie_id: &str,
        artefact_id: &mf_core::CanonicalId,
    ) -> Result<Option<ArtefactEvent>, EventLogError>;
}

fn events_path(movie_id: &str) -> String {
    format!("{movie_id}/events/events.ndjson")
}

/// An [`EventLog`] backed by a [`StorageContext`], one NDJSON file per
/// movie.
pub struct StorageEventLog<S: StorageContext> {
    storage: S,
}

impl<S: StorageContext> StorageEventLog<S> {
    /// Wrap a storage context as an event log.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: StorageContext> EventLog for StorageEventLog<S> {
    #[instrument(skip(self, event), fields(movie_id, artefact_id = %event.artefact_id))]
    async fn append_artefact(
        &self,
        movie_id: &str,
        event: &ArtefactEvent,
    ) -> Result<(), EventLogError> {
        let path = events_path(movie_id);
        let mut line = serde_json::to_string(event)
            .map_err(|e| EventLogError::Malformed {
                line: 0,
                reason: e.to_string(),
            })?;
        line.push('\n');

        let existing = match self.storage.read_to_bytes(&path).await {
            Ok(bytes) => bytes,
            Err(mf_storage::StorageError::Io { .. }) => Vec::new(),
            Err(other) => return Err(other.into()),
        };
        let mut combined = existing;
        combined.extend_from_slice(line.as_bytes());
        self.storage.write(&path, &combined).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(movie_id))]
    async fn list_artefacts(&self, movie_id: &str) -> Result<Vec<ArtefactEvent>, EventLogError> {
        let path = events_path(movie_id);
        let contents = match self.storage.read_to_string(&path).await {
            Ok(s) => s,
            Err(mf_storage::StorageError::Io { .. }) => return Ok(Vec::new()),
            Err(other) => return Err(other.into()),
        };
        let mut events = Vec::new();
        for (idx, raw_line) in contents.lines().enumerate() {
            if raw_line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArtefactEvent>(raw_line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(target: "mf_eventlog", line = idx + 1, %err, "skipping malformed event record");
                    return Err(EventLogError::Malformed {
                        line: idx + 1,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(events)
    }

    async fn latest_artefact(
        &self,
        movie_id: &str,
        artefact_id: &mf_core::CanonicalId,
    ) -> Result<Option<ArtefactEvent>, EventLogError> {
        let events = self.list_artefacts(movie_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| &e.artefact_id == artefact_id)
            .last())
    }
}
