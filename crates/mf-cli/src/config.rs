// SPDX-License-Identifier: MIT OR Apache-2.0
//! Settings loading for the mediaforge CLI.

use anyhow::{Context, Result};
use mf_config::Settings;
use std::path::Path;

/// Load a settings file and apply `MEDIAFORGE_*` environment overrides on
/// top of whatever the file declares.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = mf_config::load_settings(path)
        .with_context(|| format!("load settings from '{}'", path.display()))?;
    mf_config::apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load and validate a settings file, returning human-readable diagnostics
/// (errors and warnings) rather than failing outright.
pub fn check_settings(path: &Path) -> Result<Vec<String>> {
    let mut diagnostics = Vec::new();

    let settings = match load_settings(path) {
        Ok(s) => s,
        Err(e) => {
            diagnostics.push(format!("error: {e:#}"));
            return Ok(diagnostics);
        }
    };

    match mf_config::validate_settings(&settings) {
        Ok(warnings) => {
            if warnings.is_empty() {
                diagnostics.push("settings: ok".to_string());
            }
            for w in &warnings {
                diagnostics.push(format!("warning: {w}"));
            }
        }
        Err(errors) => {
            for e in &errors {
                diagnostics.push(format!("error: {e}"));
            }
        }
    }

    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_settings_missing_file_reports_error() {
        let diags = check_settings(Path::new("/nonexistent/settings.json")).unwrap();
        assert!(diags.iter().any(|d| d.starts_with("error:")));
    }

    #[test]
    fn check_settings_valid_file_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"general": {"movie_root": "./movies"}}"#).unwrap();
        let diags = check_settings(&path).unwrap();
        assert!(diags.iter().any(|d| d.contains("ok")));
    }

    #[test]
    fn check_settings_bad_json_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        let diags = check_settings(&path).unwrap();
        assert!(diags.iter().any(|d| d.starts_with("error:")));
    }

    #[test]
    fn load_settings_applies_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"general": {"movie_root": "./movies"}}"#).unwrap();
        // SAFETY: test-only, single-threaded environment mutation.
        unsafe {
            std::env::set_var("MEDIAFORGE_MOVIE_ROOT", "/tmp/override-root");
        }
        let settings = load_settings(&path).unwrap();
        unsafe {
            std::env::remove_var("MEDIAFORGE_MOVIE_ROOT");
        }
        assert_eq!(settings.general.movie_root, "/tmp/override-root");
    }
}
