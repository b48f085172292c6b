// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting utilities for the mediaforge CLI.

use mf_core::Manifest;
use mf_runtime::{JobOutcome, RunReport, RunStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Compact JSON (single line).
    Json,
    /// Pretty-printed JSON.
    JsonPretty,
    /// Human-readable multi-line text.
    Text,
    /// Key-value aligned table.
    Table,
    /// Single-line summary.
    Compact,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Text => "text",
            Self::Table => "table",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Formats run reports and manifests for CLI output.
#[derive(Debug, Clone)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Create a new formatter with the given output format.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a [`RunReport`] according to the configured output format.
    ///
    /// `RunReport` has no `Serialize` impl (its inner `JobOutcome`/
    /// `RunStatus` are plain enums used internally by the runner), so the
    /// JSON variants are built by hand rather than delegated to `serde_json`.
    #[must_use]
    pub fn format_run_report(&self, report: &RunReport) -> String {
        match &self.format {
            OutputFormat::Json => run_report_json(report).to_string(),
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(&run_report_json(report)).unwrap_or_default()
            }
            OutputFormat::Text => format_run_report_text(report),
            OutputFormat::Table => format_run_report_table(report),
            OutputFormat::Compact => format_run_report_compact(report),
        }
    }

    /// Format a [`Manifest`] according to the configured output format.
    #[must_use]
    pub fn format_manifest(&self, manifest: &Manifest) -> String {
        match &self.format {
            OutputFormat::Json => serde_json::to_string(manifest).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(manifest).unwrap_or_default(),
            OutputFormat::Text => format_manifest_text(manifest),
            OutputFormat::Table => format_manifest_table(manifest),
            OutputFormat::Compact => format_manifest_compact(manifest),
        }
    }

    /// Format an error message according to the configured output format.
    #[must_use]
    pub fn format_error(&self, err: &str) -> String {
        match &self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                serde_json::json!({"error": err}).to_string()
            }
            OutputFormat::Text => format!("Error: {err}"),
            OutputFormat::Table => format!("error  {err}"),
            OutputFormat::Compact => format!("[error] {err}"),
        }
    }
}

// ── helpers ───────────────────────────────────────────────────────────

fn status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn outcome_str(o: JobOutcome) -> &'static str {
    match o {
        JobOutcome::Succeeded => "succeeded",
        JobOutcome::Skipped => "skipped",
        JobOutcome::Failed => "failed",
        JobOutcome::Cancelled => "cancelled",
    }
}

fn run_report_json(report: &RunReport) -> serde_json::Value {
    let job_outcomes: serde_json::Map<String, serde_json::Value> = report
        .job_outcomes
        .iter()
        .map(|(job_id, outcome)| (job_id.clone(), serde_json::Value::from(outcome_str(*outcome))))
        .collect();
    serde_json::json!({
        "status": status_str(report.status),
        "manifest_revision": report.manifest.revision,
        "job_outcomes": job_outcomes,
    })
}

// ── RunReport formatters ──────────────────────────────────────────────

fn format_run_report_text(report: &RunReport) -> String {
    let mut lines = vec![
        format!("Status: {}", status_str(report.status)),
        format!("Manifest revision: {}", report.manifest.revision),
        format!("Jobs: {}", report.job_outcomes.len()),
    ];
    for (job_id, outcome) in &report.job_outcomes {
        lines.push(format!("  {job_id}: {}", outcome_str(*outcome)));
    }
    lines.join("\n")
}

fn format_run_report_table(report: &RunReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<12} {}", "status", status_str(report.status)));
    lines.push(format!("{:<12} {}", "revision", report.manifest.revision));
    lines.push(format!("{:<12} {}", "jobs", report.job_outcomes.len()));
    for (job_id, outcome) in &report.job_outcomes {
        lines.push(format!("{:<12} {}", job_id, outcome_str(*outcome)));
    }
    lines.join("\n")
}

fn format_run_report_compact(report: &RunReport) -> String {
    let succeeded = report
        .job_outcomes
        .values()
        .filter(|o| matches!(o, JobOutcome::Succeeded | JobOutcome::Skipped))
        .count();
    format!(
        "[{}] revision={} jobs_ok={}/{}",
        status_str(report.status),
        report.manifest.revision,
        succeeded,
        report.job_outcomes.len(),
    )
}

// ── Manifest formatters ────────────────────────────────────────────────

fn format_manifest_text(m: &Manifest) -> String {
    format!(
        "Revision: {}\nBase revision: {}\nCreated: {}\nArtefacts: {}",
        m.revision,
        m.base_revision.as_deref().unwrap_or("<none>"),
        m.created_at,
        m.artefacts.len(),
    )
}

fn format_manifest_table(m: &Manifest) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{:<14} {}", "revision", m.revision));
    lines.push(format!(
        "{:<14} {}",
        "base_revision",
        m.base_revision.as_deref().unwrap_or("<none>")
    ));
    lines.push(format!("{:<14} {}", "created_at", m.created_at));
    lines.push(format!("{:<14} {}", "artefacts", m.artefacts.len()));
    lines.join("\n")
}

fn format_manifest_compact(m: &Manifest) -> String {
    format!(
        "[rev {}] base={} artefacts={}",
        m.revision,
        m.base_revision.as_deref().unwrap_or("none"),
        m.artefacts.len(),
    )
}
