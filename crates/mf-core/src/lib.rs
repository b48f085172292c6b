//! Stable data model for mediaforge.
//!
//! If you only take one dependency in the mediaforge workspace, take this
//! one: every other crate (`mf-parser`, `mf-plan`, `mf-storage`,
//! `mf-eventlog`, `mf-manifest`, `mf-runtime`) builds on the types defined
//! here and nowhere else.
//!
//! - [`canon`] — the canonical-id layer (§4.1): [`CanonicalId`],
//!   [`NodeKind`], and name resolution.
//! - [`blueprint`] — the parsed blueprint tree (§3): [`BlueprintNode`],
//!   [`ProducerVariant`], [`LoadedInputs`].
//! - [`job`] — one schedulable unit: [`JobDescriptor`], [`FanInDescriptor`].
//! - [`plan`] — the execution plan: [`ExecutionPlan`], [`Layer`].
//! - [`blob`] — content-addressed [`Blob`] references and MIME→extension.
//! - [`event`] — the append-only [`ArtefactEvent`] record.
//! - [`manifest`] — the derived [`Manifest`] snapshot.
//! - [`hash`] — canonical-JSON + SHA-256 helpers shared across the above.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Content-addressed blob references (§3, §6).
pub mod blob;
/// The parsed blueprint tree (§3, §4.2).
pub mod blueprint;
/// The canonical-id layer (§4.1).
pub mod canon;
/// The append-only artefact event record (§3, §4.5).
pub mod event;
/// Canonical-JSON encoding and SHA-256 hashing.
pub mod hash;
/// One schedulable execution unit (§3).
pub mod job;
/// The derived manifest snapshot (§3, §4.6).
pub mod manifest;
/// The execution plan (§3, §4.3).
pub mod plan;

pub use blob::{extension_for_mime, Blob};
pub use blueprint::{
    ArtefactDecl, BlueprintNode, Edge, InputDecl, LoadedInputs, ModelSelection, ProducerDecl,
    ProducerVariant, Provider, SubBlueprintRef, VariantPriority, INQUIRY_PROMPT_KEY,
};
pub use canon::{
    format_canonical_artifact_id, format_canonical_input_id, format_canonical_producer_id,
    format_producer_scoped_input_id, join_namespace, resolve_input_id, CanonicalId,
    InputResolution, NodeKind,
};
pub use event::{ArtefactEvent, ArtefactOutput, Diagnostics, EventStatus};
pub use hash::{canonical_json, hash_value, sha256_hex, ContractError};
pub use job::{FanInDescriptor, FanInMember, InputBinding, JobContext, JobDescriptor};
pub use manifest::{Manifest, ManifestArtefact};
pub use plan::{ExecutionPlan, Layer};

/// Current contract/schema version, bumped whenever a breaking change is
/// made to any type re-exported from this crate's root.
pub const CONTRACT_VERSION: &str = "1.0.0";
