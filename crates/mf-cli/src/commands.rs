// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared command implementations for the mediaforge CLI.
//!
//! These functions are library-level so they can be tested without
//! spawning the binary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mf_core::{BlueprintNode, LoadedInputs, Manifest};
use mf_eventlog::StorageEventLog;
use mf_manifest::{ManifestService, StorageManifestService};
use mf_ratelimit::RateLimiter;
use mf_retry::RetryPolicy;
use mf_runtime::{
    CancellationToken, HandlerError, HandlerOutput, ProduceResult, ProducerHandler,
    ProviderJobContext, ProviderRegistry, RunReport, Runner,
};
use mf_storage::FilesystemStorage;
use schemars::schema_for;
use std::path::Path;

/// Schema types that can be printed by the `schema` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`BlueprintNode`].
    Blueprint,
    /// JSON schema for [`Manifest`].
    Manifest,
    /// JSON schema for [`mf_config::Settings`].
    Settings,
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::Blueprint => serde_json::to_value(schema_for!(BlueprintNode))?,
        SchemaKind::Manifest => serde_json::to_value(schema_for!(Manifest))?,
        SchemaKind::Settings => serde_json::to_value(schema_for!(mf_config::Settings))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

/// Load a blueprint YAML document from disk and expand it, including all
/// sub-blueprint and module references, into a single tree.
pub fn load_blueprint_file(path: &Path) -> Result<BlueprintNode> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("read blueprint file '{}'", path.display()))?;
    mf_parser::parse_and_expand_blueprint(&source)
        .with_context(|| format!("parse blueprint from '{}'", path.display()))
}

/// Validate a blueprint file: parse, expand, and report success or the
/// first structural error encountered.
pub fn validate_blueprint_file(path: &Path) -> Result<()> {
    load_blueprint_file(path)?;
    Ok(())
}

/// Load an inputs YAML document and resolve it against an already-expanded
/// blueprint tree.
pub fn load_inputs_file(root: &BlueprintNode, path: &Path) -> Result<LoadedInputs> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("read inputs file '{}'", path.display()))?;
    let document = mf_parser::parse_inputs_document(&source)
        .with_context(|| format!("parse inputs from '{}'", path.display()))?;
    mf_parser::load_inputs(root, &document)
        .with_context(|| format!("resolve inputs from '{}'", path.display()))
}

/// Inspect a manifest file: deserialize it and summarize revision and
/// artefact counts.
pub fn inspect_manifest_file(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse manifest from '{}'", path.display()))
}

/// Diff two manifest files, returning a human-readable summary of
/// differences.
pub fn manifest_diff(path1: &Path, path2: &Path) -> Result<String> {
    let m1 = inspect_manifest_file(path1)?;
    let m2 = inspect_manifest_file(path2)?;

    let mut diffs = Vec::new();

    if m1.revision != m2.revision {
        diffs.push(format!("revision: {} -> {}", m1.revision, m2.revision));
    }
    if m1.base_revision != m2.base_revision {
        diffs.push(format!(
            "base_revision: {:?} -> {:?}",
            m1.base_revision, m2.base_revision
        ));
    }
    if m1.artefacts.len() != m2.artefacts.len() {
        diffs.push(format!(
            "artefacts: {} -> {}",
            m1.artefacts.len(),
            m2.artefacts.len()
        ));
    }
    for (id, a1) in &m1.artefacts {
        match m2.artefacts.get(id) {
            Some(a2) if a2.inputs_hash != a1.inputs_hash => {
                diffs.push(format!("artefact '{id}' inputs_hash changed"));
            }
            None => diffs.push(format!("artefact '{id}' removed")),
            _ => {}
        }
    }
    for id in m2.artefacts.keys() {
        if !m1.artefacts.contains_key(id) {
            diffs.push(format!("artefact '{id}' added"));
        }
    }

    if diffs.is_empty() {
        Ok("no differences".to_string())
    } else {
        Ok(diffs.join("\n"))
    }
}

/// A [`ProducerHandler`] for [`mf_core::Provider::Internal`] producers: ones
/// that require no external provider call. It returns the already-rendered
/// prompt (or the job's resolved inputs, if no prompt was declared) as an
/// inline JSON artefact per declared output.
struct InternalHandler;

#[async_trait]
impl ProducerHandler for InternalHandler {
    async fn invoke(&self, ctx: &ProviderJobContext) -> Result<ProduceResult, HandlerError> {
        let value = match &ctx.user_prompt {
            Some(prompt) => serde_json::json!({ "rendered": prompt }),
            None => serde_json::to_value(&ctx.inputs).unwrap_or(serde_json::Value::Null),
        };
        let Some(artefact_id) = ctx.job.artefact_ids.first() else {
            return Ok(ProduceResult::default());
        };
        Ok(ProduceResult::single(
            artefact_id,
            HandlerOutput::Inline { value },
        ))
    }
}

/// Run a movie end to end: load a blueprint and inputs file, plan, and
/// execute against a filesystem-backed storage root.
pub async fn run_movie(
    movie_root: &Path,
    movie_id: &str,
    blueprint_path: &Path,
    inputs_path: &Path,
) -> Result<RunReport> {
    let root = load_blueprint_file(blueprint_path)?;
    let inputs = load_inputs_file(&root, inputs_path)?;

    let storage = FilesystemStorage::new(movie_root.to_path_buf());
    let manifest_service = StorageManifestService::new(storage.clone());
    let base_manifest = manifest_service
        .load_latest(movie_id)
        .await
        .context("load latest manifest")?;

    let plan = mf_plan::plan(&root, &inputs, &base_manifest, &std::collections::HashMap::new())
        .context("compile execution plan")?;

    let mut registry = ProviderRegistry::default();
    registry.register(mf_runtime::provider_key(&mf_core::Provider::Internal), InternalHandler);

    let runner = Runner::new(
        std::sync::Arc::new(storage.clone()),
        std::sync::Arc::new(StorageEventLog::new(storage.clone())),
        std::sync::Arc::new(StorageManifestService::new(storage)),
        registry,
        RateLimiter::with_defaults(),
    )
    .with_retry_policy(RetryPolicy::default());

    runner
        .run(movie_id, &plan, &inputs, &CancellationToken::new())
        .await
        .context("run execution plan")
}
