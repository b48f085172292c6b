//! Input binding (§4.3 step 3): resolves each producer instance's declared
//! inputs to a concrete [`InputBinding`] — a plain input value, an upstream
//! artefact, or a fan-in group.

use crate::error::PlanError;
use crate::instantiate::ProducerInstance;
use mf_core::{
    resolve_input_id, BlueprintNode, CanonicalId, FanInDescriptor, FanInMember, InputBinding,
    InputResolution,
};
use std::collections::BTreeMap;

/// Every artefact instance produced anywhere in the tree, indexed by
/// `(namespace, local artefact name)` for edge-binding lookups.
pub type ArtefactInstanceIndex = BTreeMap<(Vec<String>, String), Vec<BTreeMap<String, u64>>>;

/// Record every artefact instance implied by `producers`' `produces` lists,
/// keyed for fast lookup by [`bind_inputs`].
#[must_use]
pub fn index_artefact_instances(root: &BlueprintNode, producers: &[ProducerInstance]) -> ArtefactInstanceIndex {
    let mut index = ArtefactInstanceIndex::new();
    for node in root.walk() {
        for producer in &node.producers {
            for instance in producers
                .iter()
                .filter(|p| p.namespace == node.namespace && p.local_name == producer.name)
            {
                for artefact_name in &producer.produces {
                    index
                        .entry((node.namespace.clone(), artefact_name.clone()))
                        .or_default()
                        .push(instance.indices.clone());
                }
            }
        }
    }
    index
}

/// Resolve every input binding for one producer instance (§4.3 step 3).
///
/// # Errors
///
/// Returns [`PlanError::UnboundInput`] if a `consumes` name or edge-bound
/// input slot cannot be resolved to exactly one source.
pub fn bind_inputs(
    node: &BlueprintNode,
    producer: &mf_core::ProducerDecl,
    instance: &ProducerInstance,
    known_inputs: &[CanonicalId],
    artefacts: &ArtefactInstanceIndex,
) -> Result<BTreeMap<String, InputBinding>, PlanError> {
    let mut bindings = BTreeMap::new();
    let qualified_producer = mf_core::join_namespace(&node.namespace, &producer.name);

    for name in &producer.consumes {
        match resolve_input_id(name, known_inputs) {
            InputResolution::Resolved(id) => {
                bindings.insert(name.clone(), InputBinding::Input { id });
            }
            _ => {
                return Err(PlanError::UnboundInput {
                    producer: qualified_producer.clone(),
                    input: name.clone(),
                });
            }
        }
    }

    for edge in node.edges.iter().filter(|e| e.to_producer == producer.name) {
        let Some(source) = node.artefacts.iter().find(|a| a.name == edge.from_artefact) else {
            return Err(PlanError::UnboundInput {
                producer: qualified_producer.clone(),
                input: edge.to_input.clone(),
            });
        };

        let key = (node.namespace.clone(), source.name.clone());
        let all_instances = artefacts.get(&key).map(Vec::as_slice).unwrap_or(&[]);

        let is_fan_in = node
            .inputs
            .iter()
            .find(|i| i.name == edge.to_input)
            .is_some_and(|i| i.type_tag == "fan_in");

        let binding = if is_fan_in {
            InputBinding::FanIn {
                descriptor: gather_fan_in(&node.namespace, &source.name, all_instances, &instance.indices)
                    .ok_or_else(|| PlanError::UnboundInput {
                        producer: qualified_producer.clone(),
                        input: edge.to_input.clone(),
                    })?,
            }
        } else {
            let matched = all_instances
                .iter()
                .find(|idx| idx.iter().all(|(k, v)| instance.indices.get(k) == Some(v)))
                .ok_or_else(|| PlanError::UnboundInput {
                    producer: qualified_producer.clone(),
                    input: edge.to_input.clone(),
                })?;
            InputBinding::Artifact {
                id: mf_core::format_canonical_artifact_id(&node.namespace, &source.name, matched.clone()),
            }
        };

        let alias = edge.alias.clone().unwrap_or_else(|| edge.to_input.clone());
        bindings.insert(alias, binding);
    }

    Ok(bindings)
}

fn gather_fan_in(
    namespace: &[String],
    source_name: &str,
    instances: &[BTreeMap<String, u64>],
    consumer_indices: &BTreeMap<String, u64>,
) -> Option<FanInDescriptor> {
    let filtered: Vec<&BTreeMap<String, u64>> = instances
        .iter()
        .filter(|idx| {
            idx.iter()
                .all(|(k, v)| consumer_indices.get(k).is_none_or(|cv| cv == v))
        })
        .collect();

    let mut extra_keys: Vec<String> = filtered
        .iter()
        .flat_map(|idx| idx.keys())
        .filter(|k| !consumer_indices.contains_key(*k))
        .cloned()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    if extra_keys.is_empty() {
        return None;
    }

    let group_by = extra_keys.remove(0);
    let order_by = if extra_keys.is_empty() { None } else { Some(extra_keys.remove(0)) };

    let members = filtered
        .into_iter()
        .map(|idx| FanInMember {
            id: mf_core::format_canonical_artifact_id(namespace, source_name, idx.clone()),
            group: idx[&group_by],
            order: order_by.as_ref().map(|k| idx[k]),
        })
        .collect();

    Some(FanInDescriptor {
        group_by,
        order_by,
        members,
    })
}
