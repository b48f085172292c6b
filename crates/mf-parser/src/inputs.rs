//! Inputs-document resolution (§4.2, §6.2): maps a user-authored YAML/JSON
//! document of input values and model selections onto the canonical ids
//! declared by an expanded blueprint tree.

use crate::error::ParseError;
use mf_core::{
    format_producer_scoped_input_id, resolve_input_id, BlueprintNode, CanonicalId, InputResolution,
    LoadedInputs, ModelSelection, NodeKind, Provider, INQUIRY_PROMPT_KEY,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Top-level shape of an inputs document: arbitrary input keys plus an
/// optional `models` list of explicit provider/model overrides (§6.2).
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct InputsDocument {
    /// Raw input keys as written by the author, values as supplied.
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,
    /// Explicit model selections, taking precedence over any
    /// `<producer>.provider`/`<producer>.model` keys found in `inputs`.
    #[serde(default)]
    pub models: Vec<RawModelSelection>,
    /// Top-level override injected directly at the canonical id for
    /// [`INQUIRY_PROMPT_KEY`], bypassing normal namespace resolution since it
    /// applies pipeline-wide rather than to a single declared input (§4.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inquiry_prompt: Option<serde_json::Value>,
}

/// One `models[]` entry as written in an inputs document.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RawModelSelection {
    /// Producer name (qualified or base), resolved the same way a
    /// `<producer>.provider` input key is.
    pub producer: String,
    /// Selected provider.
    pub provider: Provider,
    /// Selected provider model string.
    pub model: String,
    /// Optional nested provider configuration, flattened into producer-
    /// scoped input ids on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Parse an inputs document from YAML or JSON source text.
///
/// # Errors
///
/// Returns [`ParseError::MalformedDocument`] if `source` is neither valid
/// YAML nor valid JSON.
pub fn parse_inputs_document(source: &str) -> Result<InputsDocument, ParseError> {
    serde_yaml::from_str(source).map_err(|e| ParseError::MalformedDocument(e.to_string()))
}

/// Every known input canonical id declared anywhere in `root`, plus a
/// lookup from qualified producer name to its declaring namespace, used to
/// resolve `models[]`/`<producer>.*` keys (§4.2, §6.2).
struct KnownDeclarations {
    inputs: Vec<CanonicalId>,
    producers: Vec<String>,
}

fn collect_known(root: &BlueprintNode) -> KnownDeclarations {
    let mut inputs = Vec::new();
    let mut producers = Vec::new();
    for node in root.walk() {
        for input in &node.inputs {
            inputs.push(mf_core::format_canonical_input_id(&node.namespace, &input.name));
        }
        for producer in &node.producers {
            producers.push(mf_core::join_namespace(&node.namespace, &producer.name));
        }
    }
    KnownDeclarations { inputs, producers }
}

/// Resolve a producer name (qualified or base) against the known producer
/// list, mirroring [`resolve_input_id`]'s resolution order for inputs.
fn resolve_producer_name(key: &str, known: &[String]) -> Result<String, ParseError> {
    if known.iter().any(|p| p == key) {
        return Ok(key.to_string());
    }
    let candidates: Vec<&String> = known
        .iter()
        .filter(|p| p.rsplit('.').next() == Some(key))
        .collect();
    match candidates.len() {
        0 => Err(ParseError::UnknownProducer { key: key.to_string() }),
        1 => Ok(candidates[0].clone()),
        _ => Err(ParseError::AmbiguousProducer {
            key: key.to_string(),
            candidates: candidates.into_iter().cloned().collect(),
        }),
    }
}

/// Flatten a (possibly nested) JSON object into dot-joined key → scalar
/// pairs, e.g. `{"voice": {"stability": 0.5}}` → `"voice.stability" -> 0.5`.
fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_json(&key, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Resolve an [`InputsDocument`] against the declarations in `root`,
/// producing a [`LoadedInputs`] keyed by canonical id wire strings (§4.2).
///
/// Resolution steps:
/// 1. Every `inputs` key is matched against declared input canonical ids via
///    [`resolve_input_id`]; duplicates resolving to the same id are an
///    error, as are keys matching nothing or more than one namespace.
/// 2. Every `<producer>.provider` / `<producer>.model` pair found among the
///    raw input keys becomes an inferred [`ModelSelection`].
/// 3. Every `models[]` entry becomes an explicit [`ModelSelection`],
///    overriding any inferred selection for the same producer (processed
///    after inferred selections, §6.2).
/// 4. Declared inputs with no resolved value and no default are reported as
///    [`ParseError::MissingRequiredInputs`].
pub fn load_inputs(root: &BlueprintNode, document: &InputsDocument) -> Result<LoadedInputs, ParseError> {
    let known = collect_known(root);

    let mut values: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut resolved_from: HashMap<String, String> = HashMap::new();
    let mut inferred_models: BTreeMap<String, (Option<Provider>, Option<String>)> = BTreeMap::new();

    for (raw_key, raw_value) in &document.inputs {
        if let Some((producer_part, suffix)) = split_producer_model_key(raw_key) {
            if let Ok(producer_id) = resolve_producer_name(producer_part, &known.producers) {
                let entry = inferred_models.entry(producer_id).or_default();
                match suffix {
                    "provider" => {
                        entry.0 = serde_json::from_value(raw_value.clone()).ok();
                    }
                    "model" => {
                        entry.1 = raw_value.as_str().map(str::to_string);
                    }
                    _ => unreachable!("split_producer_model_key only returns provider/model"),
                }
                continue;
            }
        }

        match resolve_input_id(raw_key, &known.inputs) {
            InputResolution::Resolved(id) => {
                let wire = id.as_wire();
                if let Some(existing_key) = resolved_from.get(&wire) {
                    if existing_key != raw_key {
                        return Err(ParseError::DuplicateResolvedInput { canonical_id: wire });
                    }
                }
                resolved_from.insert(wire.clone(), raw_key.clone());
                values.insert(wire, raw_value.clone());
            }
            InputResolution::Ambiguous(candidates) => {
                return Err(ParseError::AmbiguousInput {
                    key: raw_key.clone(),
                    candidates: candidates.iter().map(CanonicalId::as_wire).collect(),
                });
            }
            InputResolution::Unknown => {
                return Err(ParseError::UnknownInput { key: raw_key.clone() });
            }
        }
    }

    let mut model_selections: Vec<ModelSelection> = inferred_models
        .into_iter()
        .filter_map(|(producer_id, (provider, model))| {
            Some(ModelSelection {
                producer_id,
                provider: provider?,
                model: model?,
                config: None,
            })
        })
        .collect();

    for raw in &document.models {
        let producer_id = resolve_producer_name(&raw.producer, &known.producers)?;
        if let Some(existing) = model_selections.iter_mut().find(|m| m.producer_id == producer_id) {
            existing.provider = raw.provider.clone();
            existing.model = raw.model.clone();
            existing.config = raw.config.clone();
        } else {
            model_selections.push(ModelSelection {
                producer_id: producer_id.clone(),
                provider: raw.provider.clone(),
                model: raw.model.clone(),
                config: raw.config.clone(),
            });
        }

        if let Some(config) = &raw.config {
            let mut flattened = BTreeMap::new();
            flatten_json("", config, &mut flattened);
            for (key, value) in flattened {
                let canonical = format_producer_scoped_input_id(&producer_id, &key);
                values.insert(canonical.as_wire(), value);
            }
        }
    }

    let missing: Vec<String> = root
        .walk()
        .flat_map(|node| node.inputs.iter().map(move |input| (node, input)))
        .filter_map(|(node, input)| {
            let id = mf_core::format_canonical_input_id(&node.namespace, &input.name);
            let wire = id.as_wire();
            if values.contains_key(&wire) || input.default.is_some() || !input.required {
                None
            } else {
                Some(wire)
            }
        })
        .collect();

    if !missing.is_empty() {
        return Err(ParseError::MissingRequiredInputs { ids: missing });
    }

    for node in root.walk() {
        for input in &node.inputs {
            let id = mf_core::format_canonical_input_id(&node.namespace, &input.name);
            let wire = id.as_wire();
            if !values.contains_key(&wire) {
                if let Some(default) = &input.default {
                    values.insert(wire, default.clone());
                }
            }
        }
    }

    if let Some(value) = &document.inquiry_prompt {
        let id = CanonicalId::new(NodeKind::Input, INQUIRY_PROMPT_KEY);
        values.insert(id.as_wire(), value.clone());
    }

    Ok(LoadedInputs {
        values,
        model_selections,
    })
}

/// If `key` looks like `<producer>.provider` or `<producer>.model`, split it
/// into `(producer_part, "provider" | "model")`.
fn split_producer_model_key(key: &str) -> Option<(&str, &'static str)> {
    if let Some(producer) = key.strip_suffix(".provider") {
        Some((producer, "provider"))
    } else if let Some(producer) = key.strip_suffix(".model") {
        Some((producer, "model"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::{ArtefactDecl, InputDecl, ProducerDecl, ProducerVariant, VariantPriority};

    fn producer(name: &str) -> ProducerDecl {
        ProducerDecl {
            name: name.to_string(),
            default_provider: Provider::Openai,
            default_model: "gpt-4.1".to_string(),
            variants: vec![ProducerVariant {
                provider: Provider::Openai,
                provider_model: "gpt-4.1".to_string(),
                config: None,
                system_prompt: None,
                user_prompt: None,
                variables: vec![],
                response_schema: None,
                text_format: None,
                priority: VariantPriority::Main,
            }],
            produces: vec![],
            consumes: vec![],
        }
    }

    fn sample_root() -> BlueprintNode {
        BlueprintNode {
            namespace: vec![],
            inputs: vec![InputDecl {
                name: "Dialogue".to_string(),
                type_tag: "string".to_string(),
                required: true,
                default: None,
            }],
            artefacts: vec![ArtefactDecl {
                name: "Script".to_string(),
                type_tag: "text".to_string(),
                count_input: None,
            }],
            producers: vec![producer("ScriptGeneration")],
            sub_blueprints: vec![],
            edges: vec![],
            children: vec![],
        }
    }

    #[test]
    fn resolves_base_name_input() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Dialogue".to_string(), serde_json::json!("hello"));
        let loaded = load_inputs(&root, &doc).unwrap();
        assert_eq!(loaded.values.get("Input:Dialogue").unwrap(), "hello");
    }

    #[test]
    fn missing_required_input_is_an_error() {
        let root = sample_root();
        let doc = InputsDocument::default();
        let err = load_inputs(&root, &doc).unwrap_err();
        assert!(matches!(err, ParseError::MissingRequiredInputs { .. }));
    }

    #[test]
    fn default_value_fills_missing_input() {
        let mut root = sample_root();
        root.inputs[0].required = false;
        root.inputs[0].default = Some(serde_json::json!("fallback"));
        let doc = InputsDocument::default();
        let loaded = load_inputs(&root, &doc).unwrap();
        assert_eq!(loaded.values.get("Input:Dialogue").unwrap(), "fallback");
    }

    #[test]
    fn unknown_input_key_is_an_error() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Nonexistent".to_string(), serde_json::json!(1));
        let err = load_inputs(&root, &doc).unwrap_err();
        assert!(matches!(err, ParseError::UnknownInput { .. }));
    }

    #[test]
    fn inferred_model_selection_from_provider_and_model_keys() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Dialogue".to_string(), serde_json::json!("hi"));
        doc.inputs
            .insert("ScriptGeneration.provider".to_string(), serde_json::json!("anthropic"));
        doc.inputs
            .insert("ScriptGeneration.model".to_string(), serde_json::json!("claude-3.5"));
        let loaded = load_inputs(&root, &doc).unwrap();
        assert_eq!(loaded.model_selections.len(), 1);
        assert_eq!(loaded.model_selections[0].producer_id, "ScriptGeneration");
        assert_eq!(loaded.model_selections[0].provider, Provider::Anthropic);
        assert_eq!(loaded.model_selections[0].model, "claude-3.5");
    }

    #[test]
    fn explicit_models_entry_overrides_inferred_selection() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Dialogue".to_string(), serde_json::json!("hi"));
        doc.inputs
            .insert("ScriptGeneration.provider".to_string(), serde_json::json!("anthropic"));
        doc.inputs
            .insert("ScriptGeneration.model".to_string(), serde_json::json!("claude-3.5"));
        doc.models.push(RawModelSelection {
            producer: "ScriptGeneration".to_string(),
            provider: Provider::Openai,
            model: "gpt-4.1".to_string(),
            config: Some(serde_json::json!({"temperature": 0.2})),
        });
        let loaded = load_inputs(&root, &doc).unwrap();
        assert_eq!(loaded.model_selections.len(), 1);
        assert_eq!(loaded.model_selections[0].provider, Provider::Openai);
        assert_eq!(
            loaded.values.get("Input:ScriptGeneration.temperature").unwrap(),
            &serde_json::json!(0.2)
        );
    }

    #[test]
    fn inquiry_prompt_override_injects_at_fixed_canonical_id() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Dialogue".to_string(), serde_json::json!("hi"));
        doc.inquiry_prompt = Some(serde_json::json!("describe the mood"));
        let loaded = load_inputs(&root, &doc).unwrap();
        assert_eq!(
            loaded.values.get("Input:InquiryPrompt").unwrap(),
            "describe the mood"
        );
    }

    #[test]
    fn duplicate_keys_resolving_to_same_canonical_id_is_an_error() {
        let root = sample_root();
        let mut doc = InputsDocument::default();
        doc.inputs.insert("Dialogue".to_string(), serde_json::json!("hi"));
        doc.inputs.insert("dialogue".to_string(), serde_json::json!("bye"));
        let err = load_inputs(&root, &doc);
        assert!(err.is_err());
    }
}
