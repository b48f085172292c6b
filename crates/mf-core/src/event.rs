//! `ArtefactEvent` (§3): the immutable, append-only record persisted for
//! every job attempt.

use crate::blob::Blob;
use crate::canon::CanonicalId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Terminal status of one artefact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The handler produced this artefact successfully.
    Succeeded,
    /// The handler failed to produce this artefact (exhausted retries and
    /// fallbacks, or a fatal/cancelled error).
    Failed,
    /// A cache hit: the job was not dispatched because a prior `Succeeded`
    /// event already matched `inputs_hash` (§4.7 step 4).
    Skipped,
}

/// Either a content-addressed blob reference or an inline structured JSON
/// value — an explicit discriminator rather than structural typing (§9
/// Design Notes).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtefactOutput {
    /// Bytes were persisted to the blob store.
    Blob {
        /// The stored blob's reference.
        blob: Blob,
    },
    /// A small structured value stored inline in the manifest/event.
    Inline {
        /// The inline JSON value.
        value: serde_json::Value,
    },
}

/// Structured diagnostics attached to a failed or cancelled event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostics {
    /// Stable error code (see `mf-error::ErrorCode`, carried as a string so
    /// this crate does not depend on every producing crate's error type).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether this failure required user action (e.g. sensitive content).
    #[serde(default)]
    pub user_action_required: bool,
    /// Attempt number (1-based) at which this failure occurred.
    pub attempt: u32,
}

/// One immutable, append-only record of a job attempt (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtefactEvent {
    /// Canonical id of the artefact this event describes.
    pub artefact_id: CanonicalId,
    /// The run revision this event belongs to.
    pub revision: String,
    /// Stable hash of the resolved inputs that produced (or attempted to
    /// produce) this artefact (§4.7 step 3); used both as the manifest key
    /// and as the cache-check key.
    pub inputs_hash: String,
    /// The produced output, present only when `status == Succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ArtefactOutput>,
    /// Terminal status of this attempt.
    pub status: EventStatus,
    /// Canonical id of the producer that generated this event.
    pub produced_by: CanonicalId,
    /// When this event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Failure/cancellation diagnostics, present only when
    /// `status != Succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl ArtefactEvent {
    /// Construct a `Succeeded` event.
    #[must_use]
    pub fn succeeded(
        artefact_id: CanonicalId,
        revision: impl Into<String>,
        inputs_hash: impl Into<String>,
        output: ArtefactOutput,
        produced_by: CanonicalId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            artefact_id,
            revision: revision.into(),
            inputs_hash: inputs_hash.into(),
            output: Some(output),
            status: EventStatus::Succeeded,
            produced_by,
            timestamp,
            diagnostics: None,
        }
    }

    /// Construct a `Failed` event.
    #[must_use]
    pub fn failed(
        artefact_id: CanonicalId,
        revision: impl Into<String>,
        inputs_hash: impl Into<String>,
        produced_by: CanonicalId,
        timestamp: DateTime<Utc>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            artefact_id,
            revision: revision.into(),
            inputs_hash: inputs_hash.into(),
            output: None,
            status: EventStatus::Failed,
            produced_by,
            timestamp,
            diagnostics: Some(diagnostics),
        }
    }

    /// Construct a `Skipped` (cache-hit) event, carrying forward the
    /// previously succeeded output.
    #[must_use]
    pub fn skipped(
        artefact_id: CanonicalId,
        revision: impl Into<String>,
        inputs_hash: impl Into<String>,
        output: ArtefactOutput,
        produced_by: CanonicalId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            artefact_id,
            revision: revision.into(),
            inputs_hash: inputs_hash.into(),
            output: Some(output),
            status: EventStatus::Skipped,
            produced_by,
            timestamp,
            diagnostics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::NodeKind;

    #[test]
    fn succeeded_event_carries_output_no_diagnostics() {
        let ev = ArtefactEvent::succeeded(
            CanonicalId::new(NodeKind::Artifact, "a"),
            "rev-1",
            "hash-1",
            ArtefactOutput::Inline {
                value: serde_json::json!("hello"),
            },
            CanonicalId::new(NodeKind::Producer, "p"),
            Utc::now(),
        );
        assert_eq!(ev.status, EventStatus::Succeeded);
        assert!(ev.output.is_some());
        assert!(ev.diagnostics.is_none());
    }

    #[test]
    fn failed_event_carries_diagnostics_no_output() {
        let ev = ArtefactEvent::failed(
            CanonicalId::new(NodeKind::Artifact, "a"),
            "rev-1",
            "hash-1",
            CanonicalId::new(NodeKind::Producer, "p"),
            Utc::now(),
            Diagnostics {
                code: "HANDLER_PROVIDER_FAILURE".to_string(),
                message: "boom".to_string(),
                user_action_required: false,
                attempt: 1,
            },
        );
        assert_eq!(ev.status, EventStatus::Failed);
        assert!(ev.output.is_none());
        assert!(ev.diagnostics.is_some());
    }

    #[test]
    fn serde_roundtrip() {
        let ev = ArtefactEvent::succeeded(
            CanonicalId::new(NodeKind::Artifact, "a"),
            "rev-1",
            "hash-1",
            ArtefactOutput::Blob {
                blob: Blob {
                    hash: "h".repeat(64),
                    size: 3,
                    mime_type: "audio/wav".to_string(),
                },
            },
            CanonicalId::new(NodeKind::Producer, "p"),
            Utc::now(),
        );
        let json = serde_json::to_string(&ev).unwrap();
        let back: ArtefactEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.artefact_id, ev.artefact_id);
        assert_eq!(back.status, ev.status);
    }
}
