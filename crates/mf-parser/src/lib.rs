//! Blueprint and inputs-document parser (§4.2).
//!
//! Turns author-time YAML/JSON documents into the canonical, fully-resolved
//! shapes [`mf_core::BlueprintNode`] and [`mf_core::LoadedInputs`] that the
//! rest of the workspace (`mf-plan`, `mf-runtime`) builds on. Parsing never
//! partially succeeds: any [`ParseError`] aborts the whole document.
//!
//! - [`expand`] — sub-blueprint expansion: [`expand::RawBlueprintNode`],
//!   [`expand::expand_blueprint`].
//! - [`inputs`] — inputs-document resolution: [`inputs::load_inputs`].
//! - [`error`] — the [`ParseError`] taxonomy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Sub-blueprint expansion (§4.2).
pub mod expand;
/// Parser error taxonomy.
pub mod error;
/// Inputs-document resolution (§4.2, §6.2).
pub mod inputs;

pub use error::ParseError;
pub use expand::{expand_blueprint, ModuleLibrary, RawBlueprintNode};
pub use inputs::{load_inputs, parse_inputs_document, InputsDocument, RawModelSelection};

use mf_core::BlueprintNode;

/// Parse a blueprint document (the root node plus its module library) from
/// YAML or JSON source text.
///
/// # Errors
///
/// Returns [`ParseError::MalformedDocument`] if `source` does not deserialize
/// into a [`BlueprintDocument`].
pub fn parse_blueprint_document(source: &str) -> Result<BlueprintDocument, ParseError> {
    serde_yaml::from_str(source).map_err(|e| ParseError::MalformedDocument(e.to_string()))
}

/// Top-level shape of a blueprint source file: the root node plus a named
/// library of reusable sub-blueprint modules (§4.2).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct BlueprintDocument {
    /// The root node, expanded relative to `modules`.
    #[serde(flatten)]
    pub root: RawBlueprintNode,
    /// Named sub-blueprint modules available to `sub_blueprints` references
    /// anywhere in the tree.
    #[serde(default)]
    pub modules: ModuleLibrary,
}

/// Parse and fully expand a blueprint document in one step: deserialize
/// `source`, then expand every `sub_blueprints` reference against its own
/// `modules` library.
///
/// # Errors
///
/// Returns [`ParseError::MalformedDocument`] on invalid YAML/JSON, or any
/// expansion error from [`expand_blueprint`] (unknown module, cyclic
/// sub-blueprint, duplicate identifier).
pub fn parse_and_expand_blueprint(source: &str) -> Result<BlueprintNode, ParseError> {
    let document = parse_blueprint_document(source)?;
    expand_blueprint(&document.root, &document.modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_blueprint_document() {
        let yaml = r#"
inputs:
  - name: Dialogue
    type_tag: string
    required: true
"#;
        let root = parse_and_expand_blueprint(yaml).unwrap();
        assert_eq!(root.inputs[0].name, "Dialogue");
    }

    #[test]
    fn parses_blueprint_with_sub_blueprint_module() {
        let yaml = r#"
sub_blueprints:
  - module: narration
    alias: Narration
modules:
  narration:
    inputs:
      - name: Script
        type_tag: string
        required: true
"#;
        let root = parse_and_expand_blueprint(yaml).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].namespace, vec!["Narration".to_string()]);
    }

    #[test]
    fn malformed_document_reports_parse_error() {
        let err = parse_and_expand_blueprint(": not valid : yaml : [").unwrap_err();
        assert!(matches!(err, ParseError::MalformedDocument(_)));
    }
}
