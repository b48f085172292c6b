//! `Manifest` (§3): a revision-scoped snapshot mapping canonical ids to
//! stored outputs, built and committed by the manifest service.

use crate::canon::CanonicalId;
use crate::event::ArtefactOutput;
use crate::hash::{hash_value, ContractError};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One artefact's entry in a committed [`Manifest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestArtefact {
    /// The artefact's output (blob reference or inline value).
    pub output: ArtefactOutput,
    /// Canonical id of the producer that generated this output.
    pub produced_by: CanonicalId,
    /// The resolved-inputs hash that produced this output.
    pub inputs_hash: String,
    /// The revision at which this output was (most recently) produced.
    pub revision: String,
}

/// A revision-scoped snapshot of a movie's current state (§3).
///
/// Carries only references (blob hash + metadata) or inline values, never
/// raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// This manifest's revision id.
    pub revision: String,
    /// The revision this manifest extends, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<String>,
    /// When this manifest was built.
    pub created_at: DateTime<Utc>,
    /// Canonical input id (wire format) → resolved value.
    pub inputs: BTreeMap<String, serde_json::Value>,
    /// Canonical artefact id (wire format) → its stored output entry.
    pub artefacts: BTreeMap<String, ManifestArtefact>,
}

impl Manifest {
    /// A zero manifest: revision `"0"`, no base, empty inputs/artefacts.
    /// Returned by `ManifestService::load_latest` when no manifest has ever
    /// been committed for a movie (§4.6).
    #[must_use]
    pub fn zero(created_at: DateTime<Utc>) -> Self {
        Self {
            revision: "0".to_string(),
            base_revision: None,
            created_at,
            inputs: BTreeMap::new(),
            artefacts: BTreeMap::new(),
        }
    }

    /// Whether this is the zero manifest.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.revision == "0" && self.base_revision.is_none() && self.artefacts.is_empty()
    }

    /// Content hash of this manifest (canonical JSON → SHA-256), used as
    /// the `base_revision` pointer for the plan built against it.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError`] if the manifest cannot be serialized.
    pub fn content_hash(&self) -> Result<String, ContractError> {
        hash_value(self)
    }

    /// Look up an artefact entry by its wire-format canonical id string.
    #[must_use]
    pub fn artefact(&self, canonical_id: &str) -> Option<&ManifestArtefact> {
        self.artefacts.get(canonical_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;
    use crate::canon::NodeKind;

    #[test]
    fn zero_manifest_has_no_artefacts() {
        let m = Manifest::zero(Utc::now());
        assert!(m.is_zero());
        assert!(m.artefacts.is_empty());
        assert_eq!(m.revision, "0");
    }

    #[test]
    fn non_zero_manifest_is_not_zero() {
        let mut m = Manifest::zero(Utc::now());
        m.revision = "1".to_string();
        assert!(!m.is_zero());
    }

    #[test]
    fn content_hash_deterministic_modulo_created_at_inclusion() {
        let m = Manifest::zero(Utc::now());
        assert_eq!(m.content_hash().unwrap(), m.content_hash().unwrap());
    }

    #[test]
    fn artefact_lookup_by_wire_id() {
        let mut m = Manifest::zero(Utc::now());
        let id = CanonicalId::new(NodeKind::Artifact, "x");
        m.artefacts.insert(
            id.as_wire(),
            ManifestArtefact {
                output: ArtefactOutput::Blob {
                    blob: Blob {
                        hash: "a".repeat(64),
                        size: 1,
                        mime_type: "text/plain".to_string(),
                    },
                },
                produced_by: CanonicalId::new(NodeKind::Producer, "p"),
                inputs_hash: "h".to_string(),
                revision: "1".to_string(),
            },
        );
        assert!(m.artefact(&id.as_wire()).is_some());
        assert!(m.artefact("Artifact:missing").is_none());
    }
}
