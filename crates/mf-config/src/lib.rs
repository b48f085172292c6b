// SPDX-License-Identifier: MIT OR Apache-2.0
//! Settings-file loading, validation, and merging for mediaforge (§6.1).
//!
//! The settings file is JSON: a `general` project-config object plus a list
//! of `producers[]`, each naming a main provider and zero or more fallback
//! providers. Each provider entry may point at a `config_file`, resolved
//! relative to the settings file's own directory and loaded as TOML, JSON,
//! or plain text depending on its extension.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested settings or config file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid JSON/TOML.
    #[error("failed to parse config '{path}': {reason}")]
    ParseError {
        /// Path of the file that failed to parse.
        path: String,
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("settings validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// Two settings documents could not be merged because of conflicting
    /// constraints.
    #[error("merge conflict: {reason}")]
    MergeConflict {
        /// Description of the conflict.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A producer declares only fallback variants, no `main`.
    NoMainProvider {
        /// Producer name.
        producer: String,
    },
    /// A producer's default timeout is unusually large.
    LargeTimeout {
        /// Timeout value in seconds.
        secs: u64,
    },
    /// A `config_file` reference could not be resolved at validation time
    /// (advisory only — resolution is re-attempted at load time).
    UnresolvedConfigFile {
        /// Producer name.
        producer: String,
        /// The configured path.
        path: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMainProvider { producer } => {
                write!(f, "producer '{producer}' has no main provider")
            }
            Self::LargeTimeout { secs } => {
                write!(f, "default_timeout_secs is unusually large ({secs}s)")
            }
            Self::UnresolvedConfigFile { producer, path } => {
                write!(f, "producer '{producer}' config_file '{path}' not found")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Settings model (§6.1)
// ---------------------------------------------------------------------------

/// Project-wide settings (`general`, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeneralConfig {
    /// Root directory under which every movie's persisted state is stored.
    pub movie_root: String,
    /// Default handler invocation timeout, in seconds, used when a
    /// provider-model catalog entry does not override it.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Global in-flight job cap (§5), independent of per-rate-key limits.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_in_flight() -> usize {
    8
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            movie_root: "./movies".to_string(),
            default_timeout_secs: default_timeout_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Scheduling priority of a provider entry within a producer's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPriority {
    /// The provider attempted first.
    Main,
    /// A provider attempted only after every main/higher-priority provider
    /// fails.
    Fallback,
}

/// One provider entry in a producer's settings (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderEntry {
    /// Scheduling priority among this producer's providers.
    pub priority: ProviderPriority,
    /// Provider name, e.g. `"openai"`, `"anthropic"`, `"replicate"`.
    pub provider: String,
    /// The provider's own model identifier.
    pub model: String,
    /// Path to a provider config file, resolved relative to the settings
    /// file's directory and loaded via [`resolve_config_file`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    /// Free-form provider-specific attributes not covered by the common
    /// fields above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_attributes: Option<serde_json::Value>,
}

/// Settings for one producer kind (`producers[]`, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProducerSettings {
    /// Which producer these settings apply to (a qualified producer name or
    /// a producer kind shared by several blueprint nodes).
    pub producer: String,
    /// Candidate providers for this producer, at least one of which should
    /// be [`ProviderPriority::Main`] (advisory — see
    /// [`ConfigWarning::NoMainProvider`]).
    pub providers: Vec<ProviderEntry>,
}

impl ProducerSettings {
    /// The first provider entry with [`ProviderPriority::Main`], if any.
    #[must_use]
    pub fn main_provider(&self) -> Option<&ProviderEntry> {
        self.providers
            .iter()
            .find(|p| p.priority == ProviderPriority::Main)
    }

    /// Fallback provider entries in declaration order.
    pub fn fallback_providers(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.providers
            .iter()
            .filter(|p| p.priority == ProviderPriority::Fallback)
    }
}

/// Top-level settings document (§6.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    /// Project-wide configuration.
    pub general: GeneralConfig,
    /// Per-producer provider catalogs.
    #[serde(default)]
    pub producers: Vec<ProducerSettings>,
}

impl Settings {
    /// Look up a producer's settings by name.
    #[must_use]
    pub fn producer(&self, name: &str) -> Option<&ProducerSettings> {
        self.producers.iter().find(|p| p.producer == name)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a settings document from a JSON file.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` does not exist, or
/// [`ConfigError::ParseError`] if it is not valid JSON matching [`Settings`].
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// The decoded contents of a resolved `config_file`, tagged by the format it
/// was sniffed as (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedConfig {
    /// Parsed as TOML (`.toml`).
    Toml(toml::Value),
    /// Parsed as JSON (`.json`).
    Json(serde_json::Value),
    /// Loaded as raw text (any other extension).
    Text(String),
}

/// Resolve and load a provider's `config_file`, relative to the directory
/// containing the settings file at `settings_path`.
///
/// Dispatches on the file extension: `.toml` → TOML, `.json` → JSON,
/// anything else → raw text (§6.1).
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if the resolved path does not
/// exist, or [`ConfigError::ParseError`] if a `.toml`/`.json` file fails to
/// parse.
pub fn resolve_config_file(
    settings_path: &Path,
    config_file: &str,
) -> Result<ResolvedConfig, ConfigError> {
    let base = settings_path.parent().unwrap_or_else(|| Path::new("."));
    let resolved: PathBuf = base.join(config_file);
    let content = std::fs::read_to_string(&resolved).map_err(|_| ConfigError::FileNotFound {
        path: resolved.display().to_string(),
    })?;

    match resolved.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .map(ResolvedConfig::Toml)
            .map_err(|e| ConfigError::ParseError {
                path: resolved.display().to_string(),
                reason: e.to_string(),
            }),
        Some("json") => serde_json::from_str(&content)
            .map(ResolvedConfig::Json)
            .map_err(|e| ConfigError::ParseError {
                path: resolved.display().to_string(),
                reason: e.to_string(),
            }),
        _ => Ok(ResolvedConfig::Text(content)),
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "MEDIAFORGE_";

/// Apply `MEDIAFORGE_*` environment overrides to `settings.general`.
///
/// Recognised variables: `MEDIAFORGE_MOVIE_ROOT`,
/// `MEDIAFORGE_DEFAULT_TIMEOUT_SECS`, `MEDIAFORGE_MAX_IN_FLIGHT`. Malformed
/// numeric overrides are ignored (the existing value is kept) rather than
/// treated as fatal, matching the advisory nature of environment overlays.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_env_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Testable variant of [`apply_env_overrides`] taking an injectable lookup
/// function instead of reading the real process environment.
pub fn apply_env_overrides_from(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup(&format!("{ENV_PREFIX}MOVIE_ROOT")) {
        settings.general.movie_root = v;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}DEFAULT_TIMEOUT_SECS"))
        && let Ok(parsed) = v.parse()
    {
        settings.general.default_timeout_secs = parsed;
    }
    if let Some(v) = lookup(&format!("{ENV_PREFIX}MAX_IN_FLIGHT"))
        && let Ok(parsed) = v.parse()
    {
        settings.general.max_in_flight = parsed;
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const LARGE_TIMEOUT_SECS: u64 = 3_600;

/// Validate a parsed settings document.
///
/// Returns hard [`ConfigError`]s (duplicate producer names, an empty
/// provider/model string) as `Err`, or advisory [`ConfigWarning`]s as `Ok`
/// when the document is structurally usable but worth a second look.
pub fn validate_settings(settings: &Settings) -> Result<Vec<ConfigWarning>, Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = BTreeMap::new();

    for p in &settings.producers {
        if seen.insert(p.producer.clone(), ()).is_some() {
            errors.push(ConfigError::ValidationError {
                reasons: vec![format!("duplicate producer settings: {}", p.producer)],
            });
        }

        if p.main_provider().is_none() {
            warnings.push(ConfigWarning::NoMainProvider {
                producer: p.producer.clone(),
            });
        }

        for provider in &p.providers {
            if provider.provider.trim().is_empty() || provider.model.trim().is_empty() {
                errors.push(ConfigError::ValidationError {
                    reasons: vec![format!(
                        "producer '{}' has a provider entry with an empty provider/model",
                        p.producer
                    )],
                });
            }
        }
    }

    if settings.general.default_timeout_secs > LARGE_TIMEOUT_SECS {
        warnings.push(ConfigWarning::LargeTimeout {
            secs: settings.general.default_timeout_secs,
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two settings documents, with `overlay` taking precedence.
///
/// `general` fields are overridden wholesale by `overlay.general`.
/// `producers[]` are merged by producer name: an overlay entry replaces a
/// base entry with the same name; entries present only in one side are kept
/// as-is.
#[must_use]
pub fn merge_settings(base: Settings, overlay: Settings) -> Settings {
    let mut by_name: BTreeMap<String, ProducerSettings> = base
        .producers
        .into_iter()
        .map(|p| (p.producer.clone(), p))
        .collect();
    for p in overlay.producers {
        by_name.insert(p.producer.clone(), p);
    }
    Settings {
        general: overlay.general,
        producers: by_name.into_values().collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
