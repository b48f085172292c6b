// SPDX-License-Identifier: MIT OR Apache-2.0
//! The runner (§4.7): layer-barrier scheduling over an [`ExecutionPlan`],
//! cache-aware dispatch through the [`crate::handler::ProducerHandler`]
//! contract, and retry/fallback on handler failure (§4.7 step 7, §4.8).
//!
//! Scheduling model: jobs are grouped by planner layer; a layer is a
//! barrier — no job in layer *N+1* starts until every job in layer *N* has
//! reached a terminal state. Within a layer, jobs run concurrently on a
//! `tokio` [`JoinSet`]; dispatch order follows the planner's declared job
//! order but completion order is unconstrained.

use crate::cancel::CancellationToken;
use crate::handler::{HandlerError, HandlerOutput, ProviderJobContext};
use crate::registry::{provider_key, ProviderRegistry};
use crate::template;
use mf_core::{
    ArtefactEvent, ArtefactOutput, CanonicalId, Diagnostics, EventStatus, ExecutionPlan,
    InputBinding, JobDescriptor, LoadedInputs, Manifest, Provider,
};
use mf_error::{ErrorCode, MediaforgeError};
use mf_eventlog::{EventLog, EventLogError};
use mf_manifest::{ManifestError, ManifestService};
use mf_ratelimit::RateLimiter;
use mf_retry::{RetryDecision, RetryPolicy};
use mf_storage::{StorageContext, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Errors from running an [`ExecutionPlan`] end to end.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The event log could not be read or appended to.
    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),
    /// The manifest could not be composed or committed.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    /// Blob persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// A job's resolved inputs could not be hashed.
    #[error("failed to hash inputs for job {job_id}: {source}")]
    Hash {
        /// The job whose inputs could not be hashed.
        job_id: String,
        /// The underlying serialization failure.
        #[source]
        source: mf_core::ContractError,
    },
    /// A job's input binding referenced a canonical id with no resolved
    /// value, either from the inputs document or an earlier layer's
    /// output. Indicates a planner/runner contract violation, not a
    /// user-facing error.
    #[error("job {job_id} references unresolved canonical id {canonical_id}")]
    UnresolvedInput {
        /// The job whose binding could not be resolved.
        job_id: String,
        /// The canonical id (wire format) that had no resolved value.
        canonical_id: String,
    },
    /// No handler is registered for the provider key a job's variant
    /// dispatches through.
    #[error("no handler registered for provider key '{provider_key}'")]
    NoHandler {
        /// The unresolved provider key.
        provider_key: String,
    },
}

impl From<RunnerError> for MediaforgeError {
    fn from(err: RunnerError) -> Self {
        let code = match &err {
            RunnerError::EventLog(_) => ErrorCode::EventLogAppendFailed,
            RunnerError::Manifest(_) => ErrorCode::ManifestCommitFailed,
            RunnerError::Storage(_) => ErrorCode::StorageIoError,
            RunnerError::Hash { .. } => ErrorCode::Internal,
            RunnerError::UnresolvedInput { .. } => ErrorCode::PlanUnboundInput,
            RunnerError::NoHandler { .. } => ErrorCode::HandlerUnknown,
        };
        let message = err.to_string();
        MediaforgeError::new(code, message).with_source(err)
    }
}

/// Terminal status of one job after a run attempt (§3 Lifecycle, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The handler produced every declared artefact successfully.
    Succeeded,
    /// Every declared artefact was already current (cache hit on
    /// `inputs_hash`); the handler was never dispatched.
    Skipped,
    /// The handler failed and retries/fallbacks were exhausted.
    Failed,
    /// The run was cancelled before this job reached a terminal state.
    Cancelled,
}

/// Terminal status of an entire run (§4.7: "Succeeded only if every job's
/// terminal state is Succeeded").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every job succeeded or was skipped (cache hit).
    Succeeded,
    /// At least one job failed and the run was not cancelled.
    Failed,
    /// The run was cancelled; per-job outcomes are informational only.
    Cancelled,
}

/// The full result of [`Runner::run`]: the run's terminal status, the
/// manifest committed for this revision, and every job's outcome.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The run's terminal status.
    pub status: RunStatus,
    /// The manifest committed at the end of this run (§4.6, §9 Design
    /// Notes: committed once per run regardless of partial failure).
    pub manifest: Manifest,
    /// Per-job terminal outcome, keyed by [`JobDescriptor::job_id`].
    pub job_outcomes: BTreeMap<String, JobOutcome>,
}

impl RunReport {
    /// Whether every job in this run either succeeded or was skipped.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

struct JobResult {
    job_id: String,
    status: JobOutcome,
    updates: Vec<(String, serde_json::Value)>,
    events: Vec<ArtefactEvent>,
}

/// Concurrency and retry/fallback configuration shared across every
/// dispatched job (§4.7, §5 Concurrency & Resource Model).
///
/// `Runner` is a constructed value, not a singleton: build one per run (or
/// share one across runs of the same movie) and pass it to [`Runner::run`]
/// with the plan and cancellation token for that run.
#[derive(Clone)]
pub struct Runner {
    storage: Arc<dyn StorageContext>,
    event_log: Arc<dyn EventLog>,
    manifest_service: Arc<dyn ManifestService>,
    registry: ProviderRegistry,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    timeout: Duration,
    max_in_flight: Option<Arc<Semaphore>>,
}

impl Runner {
    /// Construct a runner from its four collaborators (§4.7).
    ///
    /// Defaults to [`RetryPolicy::default`] and a 120-second per-attempt
    /// timeout; override with [`Runner::with_retry_policy`] /
    /// [`Runner::with_timeout`].
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageContext>,
        event_log: Arc<dyn EventLog>,
        manifest_service: Arc<dyn ManifestService>,
        registry: ProviderRegistry,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            storage,
            event_log,
            manifest_service,
            registry,
            rate_limiter,
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(120),
            max_in_flight: None,
        }
    }

    /// Override the retry/fallback policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Override the per-attempt dispatch timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap the number of jobs dispatched concurrently across the whole run,
    /// independent of per-rate-key limits (§5 Concurrency & Resource Model).
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = Some(Arc::new(Semaphore::new(max_in_flight.max(1))));
        self
    }

    /// The registry this runner dispatches through.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run `plan` to completion against `movie_id`, honouring `cancellation`
    /// (§4.7, §5).
    ///
    /// Committing the manifest is unconditional: a partially failed run
    /// still advances the manifest to reflect every artefact that did
    /// succeed (§9 Design Notes, partial-failure manifest revisioning).
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the event log, manifest service, or
    /// storage context fail. Handler failures are not propagated as
    /// [`RunnerError`] — they are recorded as `Failed` events and reflected
    /// in the returned [`RunReport`].
    #[instrument(skip(self, plan, inputs, cancellation), fields(movie_id, revision = %plan.revision, jobs = plan.job_count()))]
    pub async fn run(
        &self,
        movie_id: &str,
        plan: &ExecutionPlan,
        inputs: &LoadedInputs,
        cancellation: &CancellationToken,
    ) -> Result<RunReport, RunnerError> {
        let mut resolved: BTreeMap<String, serde_json::Value> = inputs.values.clone();
        let mut job_outcomes: BTreeMap<String, JobOutcome> = BTreeMap::new();
        let mut events: Vec<ArtefactEvent> = Vec::new();
        let mut run_cancelled = cancellation.is_cancelled();

        'layers: for (layer_index, layer) in plan.layers.iter().enumerate() {
            if cancellation.is_cancelled() {
                run_cancelled = true;
                break;
            }
            debug!(target: "mf_runtime", layer = layer_index, jobs = layer.jobs.len(), "starting layer");

            let snapshot = resolved.clone();
            let mut set: JoinSet<Result<JobResult, RunnerError>> = JoinSet::new();
            for job in &layer.jobs {
                let runner = self.clone();
                let job = job.clone();
                let movie_id = movie_id.to_string();
                let revision = plan.revision.clone();
                let snapshot = snapshot.clone();
                let cancellation = cancellation.clone();
                set.spawn(async move {
                    runner
                        .dispatch_job(&movie_id, &revision, &job, &snapshot, &cancellation)
                        .await
                });
            }

            while let Some(joined) = set.join_next().await {
                let result = joined.expect("job task panicked");
                let result = result?;
                for (wire, value) in result.updates {
                    resolved.insert(wire, value);
                }
                events.extend(result.events);
                job_outcomes.insert(result.job_id, result.status);
            }

            if cancellation.is_cancelled() {
                run_cancelled = true;
                break 'layers;
            }
        }

        let base_manifest = self.manifest_service.load_latest(movie_id).await?;
        let base_revision = if base_manifest.is_zero() {
            None
        } else {
            Some(base_manifest.revision.clone())
        };
        let manifest = self.manifest_service.build_from_events(
            &plan.revision,
            base_revision,
            &events,
            resolved,
            chrono::Utc::now(),
        );
        self.manifest_service.commit(movie_id, &manifest).await?;

        let status = if run_cancelled {
            RunStatus::Cancelled
        } else if job_outcomes.values().all(|o| matches!(o, JobOutcome::Succeeded | JobOutcome::Skipped)) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        info!(target: "mf_runtime", ?status, jobs = job_outcomes.len(), "run complete");

        Ok(RunReport {
            status,
            manifest,
            job_outcomes,
        })
    }

    #[instrument(skip(self, resolved, cancellation), fields(job_id = %job.job_id, rate_key = %job.rate_key))]
    async fn dispatch_job(
        &self,
        movie_id: &str,
        revision: &str,
        job: &JobDescriptor,
        resolved: &BTreeMap<String, serde_json::Value>,
        cancellation: &CancellationToken,
    ) -> Result<JobResult, RunnerError> {
        if cancellation.is_cancelled() {
            return Ok(JobResult {
                job_id: job.job_id.clone(),
                status: JobOutcome::Cancelled,
                updates: vec![],
                events: vec![],
            });
        }

        let inputs_map = resolve_job_inputs(job, resolved)?;
        let inputs_hash = mf_core::hash_value(&inputs_map).map_err(|source| RunnerError::Hash {
            job_id: job.job_id.clone(),
            source,
        })?;

        if let Some(cached) = self.cached_outputs(movie_id, job, &inputs_hash).await? {
            let now = chrono::Utc::now();
            let mut updates = Vec::with_capacity(cached.len());
            let mut events = Vec::with_capacity(cached.len());
            for (artefact_id, output) in cached {
                updates.push((artefact_id.as_wire(), artefact_value(&output)));
                events.push(ArtefactEvent::skipped(
                    artefact_id,
                    revision.to_string(),
                    inputs_hash.clone(),
                    output,
                    job.producer_id.clone(),
                    now,
                ));
            }
            debug!(target: "mf_runtime", job_id = %job.job_id, "cache hit, skipping dispatch");
            return Ok(JobResult {
                job_id: job.job_id.clone(),
                status: JobOutcome::Skipped,
                updates,
                events,
            });
        }

        let _global_permit = match &self.max_in_flight {
            Some(sem) => {
                let sem = sem.clone();
                tokio::select! {
                    () = cancellation.cancelled() => {
                        return Ok(JobResult {
                            job_id: job.job_id.clone(),
                            status: JobOutcome::Cancelled,
                            updates: vec![],
                            events: vec![],
                        });
                    }
                    permit = sem.acquire_owned() => {
                        Some(permit.expect("global in-flight semaphore is never closed"))
                    }
                }
            }
            None => None,
        };

        self.dispatch_with_retry(movie_id, revision, job, &inputs_map, &inputs_hash, cancellation)
            .await
    }

    /// Every declared artefact's most recent event is `Succeeded` with a
    /// matching `inputs_hash` (§4.7 step 4, §9 Open Question: only
    /// `Succeeded` is ever cached).
    async fn cached_outputs(
        &self,
        movie_id: &str,
        job: &JobDescriptor,
        inputs_hash: &str,
    ) -> Result<Option<Vec<(CanonicalId, ArtefactOutput)>>, RunnerError> {
        let mut outputs = Vec::with_capacity(job.artefact_ids.len());
        for artefact_id in &job.artefact_ids {
            let latest = self.event_log.latest_artefact(movie_id, artefact_id).await?;
            match latest {
                Some(event)
                    if event.status == EventStatus::Succeeded && event.inputs_hash == inputs_hash =>
                {
                    let Some(output) = event.output else {
                        return Ok(None);
                    };
                    outputs.push((artefact_id.clone(), output));
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(outputs))
    }

    async fn dispatch_with_retry(
        &self,
        movie_id: &str,
        revision: &str,
        job: &JobDescriptor,
        inputs_map: &BTreeMap<String, serde_json::Value>,
        inputs_hash: &str,
        cancellation: &CancellationToken,
    ) -> Result<JobResult, RunnerError> {
        let mut variant = job.variant.clone();
        let mut tried: Vec<(Provider, String)> = vec![];
        let mut attempt_in_variant: u32 = 0;

        loop {
            if cancellation.is_cancelled() {
                return Ok(JobResult {
                    job_id: job.job_id.clone(),
                    status: JobOutcome::Cancelled,
                    updates: vec![],
                    events: vec![],
                });
            }

            attempt_in_variant += 1;
            let key = provider_key(&variant.provider);
            let Some(handler) = self.registry.get_arc(&key) else {
                return Err(RunnerError::NoHandler { provider_key: key });
            };

            let missing = template::unresolved_variables(&variant.variables, inputs_map);
            let handler_result = if missing.is_empty() {
                let permit = tokio::select! {
                    () = cancellation.cancelled() => {
                        return Ok(JobResult {
                            job_id: job.job_id.clone(),
                            status: JobOutcome::Cancelled,
                            updates: vec![],
                            events: vec![],
                        });
                    }
                    permit = self.rate_limiter.acquire(&job.rate_key) => permit,
                };

                let system_prompt = variant.system_prompt.as_deref().map(|t| template::render(t, inputs_map));
                let user_prompt = variant.user_prompt.as_deref().map(|t| template::render(t, inputs_map));
                let ctx = ProviderJobContext::new(
                    job.clone(),
                    variant.clone(),
                    inputs_map.clone(),
                    system_prompt,
                    user_prompt,
                    attempt_in_variant,
                    movie_id.to_string(),
                    self.storage.clone(),
                );

                let attempt = tokio::select! {
                    () = cancellation.cancelled() => {
                        drop(permit);
                        return Ok(JobResult {
                            job_id: job.job_id.clone(),
                            status: JobOutcome::Cancelled,
                            updates: vec![],
                            events: vec![],
                        });
                    }
                    result = tokio::time::timeout(self.timeout, handler.invoke(&ctx)) => result,
                };
                drop(permit);

                match attempt {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(HandlerError::transient_provider_error(format!(
                        "handler timed out after {:?}",
                        self.timeout
                    ))),
                }
            } else {
                warn!(target: "mf_runtime", job_id = %job.job_id, missing = ?missing, "variant declares unresolved variable(s)");
                Err(HandlerError::missing_input(format!(
                    "unresolved variable(s): {}",
                    missing.join(", ")
                )))
            };

            match handler_result {
                Ok(produced) => {
                    return self
                        .persist_success(movie_id, revision, job, inputs_hash, produced)
                        .await;
                }
                Err(handler_error) => {
                    tried.push((variant.provider.clone(), variant.provider_model.clone()));
                    let has_fallback = job
                        .fallback_variants
                        .iter()
                        .any(|v| !tried.iter().any(|(p, m)| *p == v.provider && *m == v.provider_model));

                    match self.retry_policy.decide(attempt_in_variant, handler_error.code, has_fallback) {
                        RetryDecision::RetrySameVariant { .. } => {
                            let delay = self.retry_policy.delay_for(attempt_in_variant, handler_error.retry_after);
                            let delay_ms = delay.as_millis() as u64;
                            warn!(target: "mf_runtime", job_id = %job.job_id, attempt = attempt_in_variant, delay_ms, "retrying variant after handler failure");
                            tokio::select! {
                                () = cancellation.cancelled() => {
                                    return Ok(JobResult {
                                        job_id: job.job_id.clone(),
                                        status: JobOutcome::Cancelled,
                                        updates: vec![],
                                        events: vec![],
                                    });
                                }
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        RetryDecision::Fallback => {
                            let Some(next) = job
                                .fallback_variants
                                .iter()
                                .find(|v| !tried.iter().any(|(p, m)| *p == v.provider && *m == v.provider_model))
                            else {
                                return self
                                    .persist_failure(movie_id, revision, job, inputs_hash, attempt_in_variant, handler_error)
                                    .await;
                            };
                            info!(target: "mf_runtime", job_id = %job.job_id, provider = ?next.provider, model = %next.provider_model, "falling back to next variant");
                            variant = next.clone();
                            attempt_in_variant = 0;
                        }
                        RetryDecision::GiveUp => {
                            return self
                                .persist_failure(movie_id, revision, job, inputs_hash, attempt_in_variant, handler_error)
                                .await;
                        }
                    }
                }
            }
        }
    }

    async fn persist_success(
        &self,
        movie_id: &str,
        revision: &str,
        job: &JobDescriptor,
        inputs_hash: &str,
        produced: crate::handler::ProduceResult,
    ) -> Result<JobResult, RunnerError> {
        let now = chrono::Utc::now();
        let mut updates = Vec::with_capacity(job.artefact_ids.len());
        let mut events = Vec::with_capacity(job.artefact_ids.len());

        for artefact_id in &job.artefact_ids {
            let wire = artefact_id.as_wire();
            let Some(handler_output) = produced.outputs.get(&wire) else {
                return Err(RunnerError::UnresolvedInput {
                    job_id: job.job_id.clone(),
                    canonical_id: wire,
                });
            };
            let output = match handler_output {
                HandlerOutput::Blob { bytes, mime_type } => {
                    let blob = mf_storage::write_blob(self.storage.as_ref(), movie_id, bytes, mime_type).await?;
                    ArtefactOutput::Blob { blob }
                }
                HandlerOutput::Inline { value } => ArtefactOutput::Inline { value: value.clone() },
            };
            let event = ArtefactEvent::succeeded(
                artefact_id.clone(),
                revision.to_string(),
                inputs_hash.to_string(),
                output.clone(),
                job.producer_id.clone(),
                now,
            );
            self.event_log.append_artefact(movie_id, &event).await?;
            updates.push((wire, artefact_value(&output)));
            events.push(event);
        }

        Ok(JobResult {
            job_id: job.job_id.clone(),
            status: JobOutcome::Succeeded,
            updates,
            events,
        })
    }

    async fn persist_failure(
        &self,
        movie_id: &str,
        revision: &str,
        job: &JobDescriptor,
        inputs_hash: &str,
        attempt: u32,
        handler_error: HandlerError,
    ) -> Result<JobResult, RunnerError> {
        let now = chrono::Utc::now();
        let diagnostics = Diagnostics {
            code: format!("{:?}", handler_error.code),
            message: handler_error.message.clone(),
            user_action_required: handler_error.user_action_required,
            attempt,
        };
        let mut events = Vec::with_capacity(job.artefact_ids.len());
        for artefact_id in &job.artefact_ids {
            let event = ArtefactEvent::failed(
                artefact_id.clone(),
                revision.to_string(),
                inputs_hash.to_string(),
                job.producer_id.clone(),
                now,
                diagnostics.clone(),
            );
            self.event_log.append_artefact(movie_id, &event).await?;
            events.push(event);
        }
        warn!(target: "mf_runtime", job_id = %job.job_id, code = ?handler_error.code, "job terminally failed");
        Ok(JobResult {
            job_id: job.job_id.clone(),
            status: JobOutcome::Failed,
            updates: vec![],
            events,
        })
    }
}

/// The JSON value a job sees for one resolved artefact: a blob's metadata
/// (never raw bytes, §4.8) or the inline value itself.
fn artefact_value(output: &ArtefactOutput) -> serde_json::Value {
    match output {
        ArtefactOutput::Blob { blob } => serde_json::json!({
            "blob": {
                "hash": blob.hash,
                "size": blob.size,
                "mime_type": blob.mime_type,
            }
        }),
        ArtefactOutput::Inline { value } => value.clone(),
    }
}

/// Resolve every alias in `job.context.input_bindings` against `resolved`
/// (the inputs document plus every prior layer's committed outputs),
/// applying fan-in grouping where declared (§4.3 step 3, §4.7).
fn resolve_job_inputs(
    job: &JobDescriptor,
    resolved: &BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<String, serde_json::Value>, RunnerError> {
    let mut inputs_map = BTreeMap::new();
    for (alias, binding) in &job.context.input_bindings {
        let value = match binding {
            InputBinding::Input { id } | InputBinding::Artifact { id } => {
                resolved.get(&id.as_wire()).cloned().ok_or_else(|| RunnerError::UnresolvedInput {
                    job_id: job.job_id.clone(),
                    canonical_id: id.as_wire(),
                })?
            }
            InputBinding::FanIn { descriptor } => {
                let mut groups = Vec::with_capacity(descriptor.grouped().len());
                for group in descriptor.grouped() {
                    let mut members = Vec::with_capacity(group.len());
                    for id in group {
                        let value = resolved.get(&id.as_wire()).cloned().ok_or_else(|| {
                            RunnerError::UnresolvedInput {
                                job_id: job.job_id.clone(),
                                canonical_id: id.as_wire(),
                            }
                        })?;
                        members.push(value);
                    }
                    groups.push(serde_json::Value::Array(members));
                }
                serde_json::Value::Array(groups)
            }
        };
        inputs_map.insert(alias.clone(), value);
    }
    Ok(inputs_map)
}
