//! `ExecutionPlan` (§3): ordered layers of [`JobDescriptor`]s plus the
//! revision/hash bookkeeping the manifest service depends on.

use crate::hash::{hash_value, ContractError};
use crate::job::JobDescriptor;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One layer of independent jobs. Every job in layer *k* may run
/// concurrently; layer *k+1* does not start until every job in layer *k*
/// reaches a terminal state (§5).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Layer {
    /// Jobs in this layer, ordered deterministically by canonical producer
    /// id for stable dispatch order (§4.3 step 4).
    pub jobs: Vec<JobDescriptor>,
}

/// A deterministic, hash-stamped execution plan (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPlan {
    /// This plan's revision id (derived from `plan_hash`, §4.3 step 6).
    pub revision: String,
    /// Hash of the base manifest this plan extends, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<String>,
    /// Topologically ordered layers.
    pub layers: Vec<Layer>,
    /// When this plan was computed.
    pub created_at: DateTime<Utc>,
}

/// The subset of an [`ExecutionPlan`] that feeds `plan_hash` — everything
/// except `created_at`, so identical blueprint+inputs always produce an
/// identical hash regardless of wall-clock time (§8 determinism
/// invariant).
#[derive(Serialize)]
struct PlanHashInput<'a> {
    base_revision: &'a Option<String>,
    layers: &'a [Layer],
}

impl ExecutionPlan {
    /// Compute the deterministic plan hash: SHA-256 over the canonical JSON
    /// encoding of `(base_revision, layers)` (§4.3 step 6).
    ///
    /// # Errors
    ///
    /// Returns [`ContractError`] if the plan cannot be serialized.
    pub fn plan_hash(&self) -> Result<String, ContractError> {
        hash_value(&PlanHashInput {
            base_revision: &self.base_revision,
            layers: &self.layers,
        })
    }

    /// Total job count across every layer.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.layers.iter().map(|l| l.jobs.len()).sum()
    }

    /// Iterate every job across every layer, in layer then dispatch order.
    pub fn jobs(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.layers.iter().flat_map(|l| l.jobs.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Provider, ProducerVariant, VariantPriority};
    use crate::canon::{CanonicalId, NodeKind};
    use crate::job::JobContext;
    use std::collections::BTreeMap;

    fn sample_job(id: &str) -> JobDescriptor {
        JobDescriptor {
            job_id: id.to_string(),
            producer_id: CanonicalId::new(NodeKind::Producer, id),
            input_ids: vec![],
            artefact_ids: vec![],
            variant: ProducerVariant {
                provider: Provider::Openai,
                provider_model: "gpt-4.1".to_string(),
                config: None,
                system_prompt: None,
                user_prompt: None,
                variables: vec![],
                response_schema: None,
                text_format: None,
                priority: VariantPriority::Main,
            },
            fallback_variants: vec![],
            rate_key: "openai:gpt-4.1".to_string(),
            context: JobContext {
                namespace: vec![],
                indices: BTreeMap::new(),
                input_bindings: BTreeMap::new(),
            },
        }
    }

    fn sample_plan() -> ExecutionPlan {
        ExecutionPlan {
            revision: "placeholder".to_string(),
            base_revision: None,
            layers: vec![Layer {
                jobs: vec![sample_job("p1")],
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn plan_hash_is_deterministic() {
        let a = sample_plan();
        let mut b = sample_plan();
        b.created_at = a.created_at + chrono::Duration::hours(5);
        assert_eq!(a.plan_hash().unwrap(), b.plan_hash().unwrap());
    }

    #[test]
    fn plan_hash_changes_with_layer_contents() {
        let a = sample_plan();
        let mut b = sample_plan();
        b.layers[0].jobs.push(sample_job("p2"));
        assert_ne!(a.plan_hash().unwrap(), b.plan_hash().unwrap());
    }

    #[test]
    fn job_count_and_iteration() {
        let mut plan = sample_plan();
        plan.layers.push(Layer {
            jobs: vec![sample_job("p2"), sample_job("p3")],
        });
        assert_eq!(plan.job_count(), 3);
        assert_eq!(plan.jobs().count(), 3);
    }
}
