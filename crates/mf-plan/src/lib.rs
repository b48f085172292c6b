//! Blueprint-to-execution-plan compiler (§4.3): compiles an expanded
//! [`BlueprintNode`] tree plus [`LoadedInputs`] into a deterministic, layered
//! [`ExecutionPlan`].
//!
//! - [`instantiate`] — steps 1-2, artefact/producer fan-out instantiation.
//! - [`bind`] — step 3, per-instance input binding.
//! - [`plan`] — steps 4-6, layering, rate-key assignment, plan hashing; the
//!   crate's single public entry point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Input binding (§4.3 step 3).
pub mod bind;
/// Planner error taxonomy.
pub mod error;
/// Artefact and producer instantiation (§4.3 steps 1-2).
pub mod instantiate;

pub use bind::{index_artefact_instances, ArtefactInstanceIndex};
pub use error::PlanError;
pub use instantiate::{instantiate_producers, own_key_for, ProducerInstance};

use mf_core::{
    ArtefactDecl, BlueprintNode, CanonicalId, ExecutionPlan, InputBinding, JobContext,
    JobDescriptor, Layer, LoadedInputs, Manifest, NodeKind, ProducerDecl,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Compile `root` + `inputs` into a deterministic [`ExecutionPlan`] (§4.3).
///
/// `base_manifest` supplies the `base_revision` pointer the new plan extends
/// (a zero manifest if this is the first run for the movie). `rate_key_overrides`
/// maps a variant's default rate key (`provider:model`) to a catalog-supplied
/// override (§4.3 step 5); pass an empty map to use defaults throughout.
///
/// # Errors
///
/// Returns [`PlanError`] if `count_input` resolution, input binding, or
/// layering fails (including a genuine cycle in producer/artefact wiring).
pub fn plan(
    root: &BlueprintNode,
    inputs: &LoadedInputs,
    base_manifest: &Manifest,
    rate_key_overrides: &HashMap<String, String>,
) -> Result<ExecutionPlan, PlanError> {
    let instances = instantiate_producers(root, inputs)?;
    let artefact_index = index_artefact_instances(root, &instances);
    let known_inputs = known_input_ids(root);

    let mut jobs = Vec::with_capacity(instances.len());
    let mut produced_by: HashMap<String, String> = HashMap::new();

    for instance in &instances {
        let (node, decl) = find_producer(root, instance)
            .expect("every ProducerInstance is instantiated from a declared ProducerDecl");

        let variant = decl
            .main_variant()
            .ok_or_else(|| PlanError::NoMainVariant {
                producer: mf_core::join_namespace(&instance.namespace, &instance.local_name),
            })?
            .clone();

        let rate_key = rate_key_overrides
            .get(&variant.default_rate_key())
            .cloned()
            .unwrap_or_else(|| variant.default_rate_key());

        let bindings = bind::bind_inputs(node, decl, instance, &known_inputs, &artefact_index)?;

        let input_ids = ordered_input_ids(&bindings);
        let artefact_ids = produced_artefact_ids(node, decl, instance);

        let producer_id = instance.canonical_id();
        let job_id = producer_id.as_wire();

        for artefact_id in &artefact_ids {
            let wire = artefact_id.as_wire();
            if let Some(existing) = produced_by.insert(wire.clone(), job_id.clone()) {
                if existing != job_id {
                    return Err(PlanError::DuplicateCanonicalId { id: wire });
                }
            }
        }

        jobs.push(JobDescriptor {
            job_id,
            producer_id,
            input_ids,
            artefact_ids,
            variant,
            fallback_variants: decl.fallback_variants().cloned().collect(),
            rate_key,
            context: JobContext {
                namespace: instance.namespace.clone(),
                indices: instance.indices.clone(),
                input_bindings: bindings,
            },
        });
    }

    let layers = layer_jobs(jobs, &produced_by)?;

    let base_revision = if base_manifest.is_zero() {
        None
    } else {
        Some(base_manifest.revision.clone())
    };

    let mut execution_plan = ExecutionPlan {
        revision: String::new(),
        base_revision,
        layers,
        created_at: chrono::Utc::now(),
    };
    execution_plan.revision = execution_plan
        .plan_hash()
        .map_err(|e| PlanError::HashFailure(e.to_string()))?;

    Ok(execution_plan)
}

/// Every Input canonical id declared anywhere in `root` (§4.1), the universe
/// [`mf_core::resolve_input_id`] resolves `consumes` names against.
fn known_input_ids(root: &BlueprintNode) -> Vec<CanonicalId> {
    root.walk()
        .flat_map(|node| {
            node.inputs
                .iter()
                .map(move |i| mf_core::format_canonical_input_id(&node.namespace, &i.name))
        })
        .collect()
}

/// Locate the declaring node and [`ProducerDecl`] for a [`ProducerInstance`].
fn find_producer<'a>(
    root: &'a BlueprintNode,
    instance: &ProducerInstance,
) -> Option<(&'a BlueprintNode, &'a ProducerDecl)> {
    root.walk()
        .find(|node| node.namespace == instance.namespace)
        .and_then(|node| {
            node.producers
                .iter()
                .find(|p| p.name == instance.local_name)
                .map(|p| (node, p))
        })
}

/// Canonical ids this producer instance produces, each restricted to the
/// index keys that artefact's own `count_input` introduces (§4.3 step 2).
fn produced_artefact_ids(
    node: &BlueprintNode,
    decl: &ProducerDecl,
    instance: &ProducerInstance,
) -> Vec<CanonicalId> {
    decl.produces
        .iter()
        .filter_map(|name| node.artefacts.iter().find(|a| &a.name == name))
        .map(|artefact: &ArtefactDecl| {
            let indices = if artefact.count_input.is_some() {
                let key = own_key_for(&artefact.name);
                instance
                    .indices
                    .get(&key)
                    .map(|v| BTreeMap::from([(key, *v)]))
                    .unwrap_or_default()
            } else {
                BTreeMap::new()
            };
            mf_core::format_canonical_artifact_id(&node.namespace, &artefact.name, indices)
        })
        .collect()
}

/// Flatten every binding's canonical id(s) in alias order (§3 `JobDescriptor`:
/// "in the producer's declared input order" — aliases sort lexicographically
/// since [`BTreeMap`] iteration is used consistently across the planner).
fn ordered_input_ids(bindings: &BTreeMap<String, InputBinding>) -> Vec<CanonicalId> {
    let mut ids = Vec::new();
    for binding in bindings.values() {
        match binding {
            InputBinding::Input { id } | InputBinding::Artifact { id } => ids.push(id.clone()),
            InputBinding::FanIn { descriptor } => {
                ids.extend(descriptor.members.iter().map(|m| m.id.clone()));
            }
        }
    }
    ids
}

/// Kahn-sort `jobs` into layers (§4.3 step 4): layer *k* contains every job
/// whose artefact dependencies are all satisfied by layers `< k` (or are
/// plain `Input` bindings, which carry no job dependency). Within a layer,
/// order is stable by canonical producer id.
///
/// # Errors
///
/// Returns [`PlanError::Cycle`] if a non-empty remainder has no ready jobs.
fn layer_jobs(
    jobs: Vec<JobDescriptor>,
    produced_by: &HashMap<String, String>,
) -> Result<Vec<Layer>, PlanError> {
    let mut by_id: HashMap<String, JobDescriptor> =
        jobs.into_iter().map(|j| (j.job_id.clone(), j)).collect();

    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
    for (job_id, job) in &by_id {
        let mut d = HashSet::new();
        for input_id in &job.input_ids {
            if let Some(upstream_job) = produced_by.get(&input_id.as_wire()) {
                if upstream_job != job_id {
                    d.insert(upstream_job.clone());
                }
            }
        }
        deps.insert(job_id.clone(), d);
    }

    let mut placed: HashSet<String> = HashSet::new();
    let mut layers = Vec::new();

    while placed.len() < by_id.len() {
        let mut ready: Vec<String> = by_id
            .keys()
            .filter(|id| !placed.contains(*id))
            .filter(|id| deps[*id].iter().all(|d| placed.contains(d)))
            .cloned()
            .collect();

        if ready.is_empty() {
            return Err(PlanError::Cycle);
        }

        ready.sort();
        let mut layer_jobs = Vec::with_capacity(ready.len());
        for id in &ready {
            placed.insert(id.clone());
            layer_jobs.push(by_id.remove(id).expect("id came from by_id.keys()"));
        }
        layers.push(Layer { jobs: layer_jobs });
    }

    Ok(layers)
}
