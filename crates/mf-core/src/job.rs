//! `JobDescriptor` and its planner-supplied context (§3): one execution
//! unit's producer, inputs, outputs, rate key, and fan-in/alias bindings.

use crate::blueprint::ProducerVariant;
use crate::canon::CanonicalId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a single declared input is bound to a concrete source (§4.3 step 3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputBinding {
    /// Bound directly to a scalar/nested value in the inputs document.
    Input {
        /// The bound input's canonical id.
        id: CanonicalId,
    },
    /// Bound to a single upstream artefact (respecting index propagation).
    Artifact {
        /// The bound artefact's canonical id.
        id: CanonicalId,
    },
    /// Bound to a group of upstream artefacts via fan-in aggregation.
    FanIn {
        /// The fan-in descriptor governing grouping/ordering.
        descriptor: FanInDescriptor,
    },
}

/// One member artefact of a fan-in group (§4.3 fan-in contract).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FanInMember {
    /// The member artefact's canonical id.
    pub id: CanonicalId,
    /// Value of the `group_by` index key for this member.
    pub group: u64,
    /// Value of the `order_by` index key for this member, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
}

/// Aggregates multiple indexed `Artifact` instances into a grouped array
/// for a single fan-in input (§3, §4.3 fan-in contract).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FanInDescriptor {
    /// The index key whose distinct values define group identity.
    pub group_by: String,
    /// Optional secondary index key sorted within each group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    /// Every contributing artefact, unordered; [`FanInDescriptor::grouped`]
    /// produces the ordered 2-D array the runner exposes to handlers.
    pub members: Vec<FanInMember>,
}

impl FanInDescriptor {
    /// Materialise `members` into `groups[][]`: groups ordered by ascending
    /// `group` value, members within each group ordered by ascending
    /// `order` (ties broken by canonical id for determinism), members
    /// lacking `order` sorted last in declaration order.
    #[must_use]
    pub fn grouped(&self) -> Vec<Vec<CanonicalId>> {
        let mut by_group: BTreeMap<u64, Vec<&FanInMember>> = BTreeMap::new();
        for m in &self.members {
            by_group.entry(m.group).or_default().push(m);
        }
        let mut groups = Vec::with_capacity(by_group.len());
        for (_, mut members) in by_group {
            members.sort_by(|a, b| match (a.order, b.order) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.as_wire().cmp(&b.id.as_wire())),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.id.as_wire().cmp(&b.id.as_wire()),
            });
            groups.push(members.into_iter().map(|m| m.id.clone()).collect());
        }
        groups
    }
}

/// Namespace path, fan-out index assignments, input bindings (alias →
/// source), and fan-in descriptors for one job (§3 `JobDescriptor`
/// context).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobContext {
    /// Namespace path of the producing node.
    pub namespace: Vec<String>,
    /// Fan-out index assignments active for this job instance.
    pub indices: BTreeMap<String, u64>,
    /// Alias (the producer's locally-declared input name) → resolved
    /// binding.
    pub input_bindings: BTreeMap<String, InputBinding>,
}

/// One schedulable execution unit (§3 `JobDescriptor`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDescriptor {
    /// Process-unique job identifier (stable across planner runs for the
    /// same blueprint instantiation index).
    pub job_id: String,
    /// Canonical id of the producer this job instantiates.
    pub producer_id: CanonicalId,
    /// Ordered list of canonical ids this job consumes, in the producer's
    /// declared input order.
    pub input_ids: Vec<CanonicalId>,
    /// Canonical ids of artefacts this job produces.
    pub artefact_ids: Vec<CanonicalId>,
    /// The chosen variant (provider + model + prompts) for this job's
    /// first attempt.
    pub variant: ProducerVariant,
    /// Fallback variants in declaration order, tried in turn if `variant`
    /// (and any earlier fallback) exhausts its retries (§4.7 step 7).
    #[serde(default)]
    pub fallback_variants: Vec<ProducerVariant>,
    /// Rate key jobs contend for (`<provider>:<model>` by default, §4.3
    /// step 5).
    pub rate_key: String,
    /// Namespace/index/binding context for input resolution.
    pub context: JobContext,
}
