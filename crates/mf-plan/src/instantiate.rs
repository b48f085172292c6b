//! Artefact and producer instantiation (§4.3 steps 1-2): resolves
//! `count_input` fan-out cardinalities and computes each producer's full
//! composite index set.

use crate::error::PlanError;
use mf_core::{
    resolve_input_id, BlueprintNode, CanonicalId, InputResolution, LoadedInputs, ProducerDecl,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One instantiated producer: a specific combination of fan-out index
/// assignments for one [`ProducerDecl`] (§4.3 step 2).
#[derive(Debug, Clone)]
pub struct ProducerInstance {
    /// Namespace of the node declaring this producer.
    pub namespace: Vec<String>,
    /// Local (unqualified) producer name.
    pub local_name: String,
    /// This instance's fan-out index assignments.
    pub indices: BTreeMap<String, u64>,
}

impl ProducerInstance {
    /// This instance's canonical producer id.
    #[must_use]
    pub fn canonical_id(&self) -> CanonicalId {
        mf_core::format_canonical_producer_id(&self.namespace, &self.local_name, self.indices.clone())
    }
}

/// The fan-out key an artefact's own `count_input` introduces: the
/// artefact's local name, lowercased (§9 Design Notes: no separate index-key
/// vocabulary is declared in the blueprint, so the artefact's own identity
/// names its dimension).
#[must_use]
pub fn own_key_for(artefact_name: &str) -> String {
    artefact_name.to_ascii_lowercase()
}

/// Resolved fan-out cardinality for every indexed artefact declaration,
/// keyed by `(namespace, local artefact name)`.
pub type CountsByArtefact = HashMap<(Vec<String>, String), u64>;

/// Resolve every `count_input` in the tree against `inputs` (§4.3 step 1).
///
/// # Errors
///
/// Returns [`PlanError::UnresolvedCountInput`] if a `count_input` does not
/// resolve to exactly one known input, or if the resolved value is not a
/// non-negative integer.
pub fn resolve_counts(root: &BlueprintNode, inputs: &LoadedInputs) -> Result<CountsByArtefact, PlanError> {
    let known_inputs: Vec<CanonicalId> = root
        .walk()
        .flat_map(|node| {
            node.inputs
                .iter()
                .map(move |i| mf_core::format_canonical_input_id(&node.namespace, &i.name))
        })
        .collect();

    let mut counts = CountsByArtefact::new();
    for node in root.walk() {
        for artefact in &node.artefacts {
            let Some(count_name) = &artefact.count_input else {
                continue;
            };
            let count = resolve_count_value(count_name, &known_inputs, inputs).ok_or_else(|| {
                PlanError::UnresolvedCountInput {
                    artefact: mf_core::join_namespace(&node.namespace, &artefact.name),
                    input: count_name.clone(),
                }
            })?;
            counts.insert((node.namespace.clone(), artefact.name.clone()), count);
        }
    }
    Ok(counts)
}

fn resolve_count_value(count_name: &str, known: &[CanonicalId], inputs: &LoadedInputs) -> Option<u64> {
    let InputResolution::Resolved(id) = resolve_input_id(count_name, known) else {
        return None;
    };
    inputs.values.get(&id.as_wire())?.as_u64()
}

/// One producer declaration plus the node that owns it, located by
/// namespace for edge/produces lookups.
struct OwnedProducer<'a> {
    namespace: &'a [String],
    decl: &'a ProducerDecl,
}

/// Compute every producer's composite index set (§4.3 step 2) and
/// instantiate the cartesian product of its fan-out dimensions.
///
/// A producer's own dimensions come from its own indexed `produces`
/// artefacts. Edge-bound inputs additionally propagate the source
/// artefact's dimension into the consuming producer's own set *unless* the
/// bound input slot is declared with `type_tag == "fan_in"`, in which case
/// the dimension is left to [`crate::bind`] to aggregate instead of
/// propagate (§4.3 fan-in contract, Open Question resolved in DESIGN.md).
///
/// # Errors
///
/// Returns [`PlanError::UnresolvedCountInput`] propagated from
/// [`resolve_counts`], or [`PlanError::UnboundInput`] if an own-key
/// dimension's cardinality cannot be found.
pub fn instantiate_producers(
    root: &BlueprintNode,
    inputs: &LoadedInputs,
) -> Result<Vec<ProducerInstance>, PlanError> {
    let counts = resolve_counts(root, inputs)?;
    let mut instances = Vec::new();

    for node in root.walk() {
        for producer in &node.producers {
            let owned = OwnedProducer {
                namespace: &node.namespace,
                decl: producer,
            };
            let mut own_keys: BTreeSet<String> = owned
                .decl
                .produces
                .iter()
                .filter_map(|name| node.artefacts.iter().find(|a| &a.name == name))
                .filter(|a| a.count_input.is_some())
                .map(|a| own_key_for(&a.name))
                .collect();

            for edge in node.edges.iter().filter(|e| e.to_producer == producer.name) {
                let Some(source) = node.artefacts.iter().find(|a| a.name == edge.from_artefact) else {
                    continue;
                };
                if source.count_input.is_none() {
                    continue;
                }
                let is_fan_in = node
                    .inputs
                    .iter()
                    .find(|i| i.name == edge.to_input)
                    .is_some_and(|i| i.type_tag == "fan_in");
                if !is_fan_in {
                    own_keys.insert(own_key_for(&source.name));
                }
            }

            let mut dimensions: Vec<(String, u64)> = Vec::with_capacity(own_keys.len());
            for key in &own_keys {
                let decl_name = node
                    .artefacts
                    .iter()
                    .find(|a| own_key_for(&a.name) == *key)
                    .map(|a| a.name.clone())
                    .ok_or_else(|| PlanError::UnboundInput {
                        producer: mf_core::join_namespace(owned.namespace, &producer.name),
                        input: key.clone(),
                    })?;
                let count = counts
                    .get(&(node.namespace.clone(), decl_name.clone()))
                    .copied()
                    .ok_or_else(|| PlanError::UnboundInput {
                        producer: mf_core::join_namespace(owned.namespace, &producer.name),
                        input: decl_name,
                    })?;
                dimensions.push((key.clone(), count));
            }

            for combo in cartesian_product(&dimensions) {
                instances.push(ProducerInstance {
                    namespace: node.namespace.clone(),
                    local_name: producer.name.clone(),
                    indices: combo,
                });
            }
        }
    }

    Ok(instances)
}

/// Every combination of `0..count` for each `(key, count)` dimension, as
/// sorted-key index maps. A single all-empty combo is produced when
/// `dimensions` is empty (the non-fan-out case).
fn cartesian_product(dimensions: &[(String, u64)]) -> Vec<BTreeMap<String, u64>> {
    let mut combos = vec![BTreeMap::new()];
    for (key, count) in dimensions {
        let mut next = Vec::with_capacity(combos.len() * (*count).max(1) as usize);
        for combo in &combos {
            for i in 0..*count {
                let mut extended = combo.clone();
                extended.insert(key.clone(), i);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}
