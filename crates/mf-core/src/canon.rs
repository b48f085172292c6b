//! Canonical-ID layer (§4.1): fully-qualified names for every input,
//! artefact, and producer declared in a blueprint, plus resolution of
//! user-supplied short names to canonical form.

use mf_error::{ErrorCode, MediaforgeError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three kinds of blueprint node that carry a canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A declared input value.
    Input,
    /// A declared artefact output.
    Artifact,
    /// A declared producer.
    Producer,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "Input",
            Self::Artifact => "Artifact",
            Self::Producer => "Producer",
        };
        f.write_str(s)
    }
}

/// A fully-qualified, globally unique identifier for a blueprint node.
///
/// Wire format: `"<Kind>:<dot.joined.qualified.name>[<key>=<value>]*"`, with
/// bracketed index segments sorted lexicographically by key, e.g.
/// `Artifact:ImageGenerator.SegmentImage[image=2][segment=0]`.
///
/// Two canonical ids are equal iff `kind`, `qualified_name`, and the index
/// multiset are all identical — [`PartialEq`]/[`Eq`]/[`Hash`] are derived
/// directly from the fields so this holds without custom impls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalId {
    /// Which of the three node kinds this id names.
    pub kind: NodeKind,
    /// Dot-joined namespace path plus leaf name.
    pub qualified_name: String,
    /// Fan-out index assignments, e.g. `segment=0`. Stored sorted by key so
    /// that equality and the wire format are order-independent of insertion.
    pub indices: BTreeMap<String, u64>,
}

impl CanonicalId {
    /// Construct a canonical id with no fan-out indices.
    #[must_use]
    pub fn new(kind: NodeKind, qualified_name: impl Into<String>) -> Self {
        Self {
            kind,
            qualified_name: qualified_name.into(),
            indices: BTreeMap::new(),
        }
    }

    /// Construct a canonical id with the given fan-out indices.
    #[must_use]
    pub fn with_indices(
        kind: NodeKind,
        qualified_name: impl Into<String>,
        indices: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            kind,
            qualified_name: qualified_name.into(),
            indices,
        }
    }

    /// Returns a copy of this id with one additional index key set.
    ///
    /// Nested artefacts compose their parents' index sets by repeated calls
    /// to this method during plan instantiation (§4.3 step 1).
    #[must_use]
    pub fn with_index(&self, key: impl Into<String>, value: u64) -> Self {
        let mut indices = self.indices.clone();
        indices.insert(key.into(), value);
        Self {
            kind: self.kind,
            qualified_name: self.qualified_name.clone(),
            indices,
        }
    }

    /// The wire-format string representation (§6.4).
    #[must_use]
    pub fn as_wire(&self) -> String {
        let mut s = format!("{}:{}", self.kind, self.qualified_name);
        for (k, v) in &self.indices {
            s.push('[');
            s.push_str(k);
            s.push('=');
            s.push_str(&v.to_string());
            s.push(']');
        }
        s
    }

    /// Parse a canonical id from its wire-format string.
    ///
    /// # Errors
    ///
    /// Returns [`MediaforgeError`] with [`ErrorCode::ParseMalformedDocument`]
    /// if the string does not match `<Kind>:<name>[k=v]*`.
    pub fn parse(s: &str) -> Result<Self, MediaforgeError> {
        let (kind_str, rest) = s.split_once(':').ok_or_else(|| malformed(s))?;
        let kind = match kind_str {
            "Input" => NodeKind::Input,
            "Artifact" => NodeKind::Artifact,
            "Producer" => NodeKind::Producer,
            _ => return Err(malformed(s)),
        };
        let bracket_start = rest.find('[');
        let (name, bracket_tail) = match bracket_start {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Err(malformed(s));
        }
        let mut indices = BTreeMap::new();
        let mut remainder = bracket_tail;
        while !remainder.is_empty() {
            let close = remainder.find(']').ok_or_else(|| malformed(s))?;
            let segment = &remainder[1..close];
            let (k, v) = segment.split_once('=').ok_or_else(|| malformed(s))?;
            let parsed: u64 = v.parse().map_err(|_| malformed(s))?;
            indices.insert(k.to_string(), parsed);
            remainder = &remainder[close + 1..];
        }
        Ok(Self::with_indices(kind, name, indices))
    }
}

fn malformed(s: &str) -> MediaforgeError {
    MediaforgeError::new(
        ErrorCode::ParseMalformedDocument,
        format!("malformed canonical id: {s:?}"),
    )
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_wire())
    }
}

/// Join a namespace path (ordered sequence of identifiers) with `.`.
#[must_use]
pub fn join_namespace(path: &[impl AsRef<str>], leaf: &str) -> String {
    if path.is_empty() {
        leaf.to_string()
    } else {
        let mut s = path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".");
        s.push('.');
        s.push_str(leaf);
        s
    }
}

/// `formatCanonicalInputId(ns, name) -> "Input:<qualified>"` (§4.1).
#[must_use]
pub fn format_canonical_input_id(ns: &[impl AsRef<str>], name: &str) -> CanonicalId {
    CanonicalId::new(NodeKind::Input, join_namespace(ns, name))
}

/// `formatCanonicalArtifactId` with an optional index set.
#[must_use]
pub fn format_canonical_artifact_id(
    ns: &[impl AsRef<str>],
    name: &str,
    indices: BTreeMap<String, u64>,
) -> CanonicalId {
    CanonicalId::with_indices(NodeKind::Artifact, join_namespace(ns, name), indices)
}

/// `formatCanonicalProducerId` with an optional index set.
#[must_use]
pub fn format_canonical_producer_id(
    ns: &[impl AsRef<str>],
    name: &str,
    indices: BTreeMap<String, u64>,
) -> CanonicalId {
    CanonicalId::with_indices(NodeKind::Producer, join_namespace(ns, name), indices)
}

/// Producer-scoped input id: `Input:<qualifiedProducer>.<key>`, with nested
/// config keys flattened by `.` in `key` by the caller.
#[must_use]
pub fn format_producer_scoped_input_id(qualified_producer: &str, key: &str) -> CanonicalId {
    CanonicalId::new(NodeKind::Input, format!("{qualified_producer}.{key}"))
}

/// Result of resolving a user-supplied input key against the known set of
/// declared input canonical ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResolution {
    /// Resolved to exactly one canonical id.
    Resolved(CanonicalId),
    /// The base name matched more than one namespace; candidates listed.
    Ambiguous(Vec<CanonicalId>),
    /// The key did not match any known input.
    Unknown,
}

/// Resolve a user-supplied key (canonical id, fully-qualified name, or base
/// name) against the set of declared input canonical ids (§4.1).
///
/// Resolution order:
/// 1. If `key` parses as a canonical id (`Input:...`) and is present in
///    `known`, it resolves directly.
/// 2. If `key` matches a `qualified_name` exactly, it resolves directly.
/// 3. If `key` matches the final dot-segment (base name) of exactly one
///    known input, that input resolves.
/// 4. Otherwise `Unknown`, or `Ambiguous` if more than one base-name match
///    exists.
#[must_use]
pub fn resolve_input_id(key: &str, known: &[CanonicalId]) -> InputResolution {
    if let Ok(parsed) = CanonicalId::parse(key) {
        if parsed.kind == NodeKind::Input {
            if let Some(found) = known.iter().find(|id| **id == parsed) {
                return InputResolution::Resolved(found.clone());
            }
        }
    }

    if let Some(found) = known.iter().find(|id| id.qualified_name == key) {
        return InputResolution::Resolved(found.clone());
    }

    let candidates: Vec<CanonicalId> = known
        .iter()
        .filter(|id| id.qualified_name.rsplit('.').next() == Some(key))
        .cloned()
        .collect();

    match candidates.len() {
        0 => InputResolution::Unknown,
        1 => InputResolution::Resolved(candidates.into_iter().next().unwrap()),
        _ => InputResolution::Ambiguous(candidates),
    }
}
