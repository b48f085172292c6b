// SPDX-License-Identifier: MIT OR Apache-2.0
//! Full blueprint → inputs → plan → run pipeline tests, exercising the
//! parser and planner together with the runner rather than hand-built
//! `JobDescriptor`s.

use async_trait::async_trait;
use mf_core::LoadedInputs;
use mf_eventlog::StorageEventLog;
use mf_manifest::{ManifestService, StorageManifestService};
use mf_ratelimit::RateLimiter;
use mf_runtime::{
    CancellationToken, HandlerError, HandlerOutput, ProduceResult, ProducerHandler,
    ProviderJobContext, ProviderRegistry, RunStatus, Runner,
};
use mf_storage::FilesystemStorage;
use std::collections::HashMap;

const TWO_LAYER_BLUEPRINT: &str = r#"
inputs:
  - name: Dialogue
    type_tag: string
    required: true
artefacts:
  - name: Script
    type_tag: text
  - name: Narration
    type_tag: audio
producers:
  - name: Writer
    default_provider: internal
    default_model: "n/a"
    produces: [Script]
    consumes: [Dialogue]
    variants:
      - provider: internal
        provider_model: "n/a"
        priority: main
  - name: Narrator
    default_provider: internal
    default_model: "n/a"
    produces: [Narration]
    consumes: []
    variants:
      - provider: internal
        provider_model: "n/a"
        priority: main
edges:
  - from_artefact: Script
    to_producer: Narrator
    to_input: script
    alias: transcript
"#;

const TWO_LAYER_INPUTS: &str = r#"
Dialogue: "Hello, world."
"#;

const FAN_IN_BLUEPRINT: &str = r#"
inputs:
  - name: SegmentCount
    type_tag: number
    required: true
  - name: segments
    type_tag: fan_in
    required: false
artefacts:
  - name: Segment
    type_tag: text
    count_input: SegmentCount
producers:
  - name: SegmentWriter
    default_provider: internal
    default_model: "n/a"
    produces: [Segment]
    consumes: []
    variants:
      - provider: internal
        provider_model: "n/a"
        priority: main
  - name: TimelineAssembler
    default_provider: internal
    default_model: "n/a"
    produces: []
    consumes: []
    variants:
      - provider: internal
        provider_model: "n/a"
        priority: main
edges:
  - from_artefact: Segment
    to_producer: TimelineAssembler
    to_input: segments
"#;

const FAN_IN_INPUTS: &str = r#"
SegmentCount: 3
"#;

/// Echoes the resolved inputs map back as the artefact payload so tests can
/// assert on exactly what the runner threaded through from binding.
struct EchoInputs;

#[async_trait]
impl ProducerHandler for EchoInputs {
    async fn invoke(&self, ctx: &ProviderJobContext) -> Result<ProduceResult, HandlerError> {
        let Some(artefact_id) = ctx.job.artefact_ids.first() else {
            return Ok(ProduceResult::default());
        };
        Ok(ProduceResult::single(
            artefact_id,
            HandlerOutput::Inline {
                value: serde_json::json!(ctx.inputs),
            },
        ))
    }
}

fn internal_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::default();
    registry.register(mf_runtime::provider_key(&mf_core::Provider::Internal), EchoInputs);
    registry
}

async fn run_blueprint(
    dir: &std::path::Path,
    movie_id: &str,
    blueprint_yaml: &str,
    inputs_yaml: &str,
) -> mf_runtime::RunReport {
    let root = mf_parser::parse_and_expand_blueprint(blueprint_yaml).unwrap();
    let document = mf_parser::parse_inputs_document(inputs_yaml).unwrap();
    let inputs = mf_parser::load_inputs(&root, &document).unwrap();

    let storage = FilesystemStorage::new(dir.to_path_buf());
    let manifest_service = StorageManifestService::new(storage.clone());
    let base_manifest = manifest_service.load_latest(movie_id).await.unwrap();

    let plan = mf_plan::plan(&root, &inputs, &base_manifest, &HashMap::new()).unwrap();

    let runner = Runner::new(
        std::sync::Arc::new(storage.clone()),
        std::sync::Arc::new(StorageEventLog::new(storage.clone())),
        std::sync::Arc::new(StorageManifestService::new(storage)),
        internal_registry(),
        RateLimiter::with_defaults(),
    );

    runner
        .run(movie_id, &plan, &inputs, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn two_layer_blueprint_runs_producer_before_consumer() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_blueprint(dir.path(), "movie-a", TWO_LAYER_BLUEPRINT, TWO_LAYER_INPUTS).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.job_outcomes.len(), 2);
    assert!(report
        .manifest
        .artefacts
        .keys()
        .any(|k| k.contains("Script")));
    assert!(report
        .manifest
        .artefacts
        .keys()
        .any(|k| k.contains("Narration")));
}

#[tokio::test]
async fn alias_binding_is_visible_alongside_the_declared_input_name() {
    let root = mf_parser::parse_and_expand_blueprint(TWO_LAYER_BLUEPRINT).unwrap();
    let document = mf_parser::parse_inputs_document(TWO_LAYER_INPUTS).unwrap();
    let inputs = mf_parser::load_inputs(&root, &document).unwrap();
    let base_manifest = mf_core::Manifest::zero(chrono::Utc::now());
    let plan = mf_plan::plan(&root, &inputs, &base_manifest, &HashMap::new()).unwrap();

    let narrator_job = plan
        .layers
        .iter()
        .flat_map(|l| &l.jobs)
        .find(|j| j.producer_id.qualified_name == "Narrator")
        .unwrap();

    // An edge's `alias` replaces the bare `to_input` slot name as the key the
    // handler sees; only the alias is present once one is declared.
    assert!(narrator_job.context.input_bindings.contains_key("transcript"));
    assert!(!narrator_job.context.input_bindings.contains_key("script"));
}

#[tokio::test]
async fn fan_in_aggregates_every_fanned_out_segment() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_blueprint(dir.path(), "movie-b", FAN_IN_BLUEPRINT, FAN_IN_INPUTS).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    // Three SegmentWriter instances plus one TimelineAssembler.
    assert_eq!(report.job_outcomes.len(), 4);
}

#[tokio::test]
async fn rerunning_an_unchanged_plan_skips_every_job_via_cache() {
    let dir = tempfile::tempdir().unwrap();
    let first = run_blueprint(dir.path(), "movie-c", TWO_LAYER_BLUEPRINT, TWO_LAYER_INPUTS).await;
    assert_eq!(first.status, RunStatus::Succeeded);

    let second = run_blueprint(dir.path(), "movie-c", TWO_LAYER_BLUEPRINT, TWO_LAYER_INPUTS).await;
    assert_eq!(second.status, RunStatus::Succeeded);
    assert!(second
        .job_outcomes
        .values()
        .all(|o| matches!(o, mf_runtime::JobOutcome::Skipped)));
}
