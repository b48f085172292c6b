//! `BlueprintNode` tree (§3): namespaces, declared inputs/artefacts/
//! producers, sub-blueprint references, and wire-level edges.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One of a closed set of generation providers, or an escape hatch for
/// providers not yet modelled (`Custom`) and in-process producers
/// (`Internal`, e.g. the timeline assembler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OpenAI models.
    Openai,
    /// Anthropic models.
    Anthropic,
    /// Replicate-hosted models.
    Replicate,
    /// Stability AI models.
    Stability,
    /// ElevenLabs audio models.
    Elevenlabs,
    /// A provider not yet in the closed enum, named by string.
    Custom(String),
    /// An in-process producer requiring no external provider call (e.g.
    /// `timeline.assemble`).
    Internal,
}

/// Scheduling priority of a [`ProducerVariant`] within a producer's
/// declared variant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VariantPriority {
    /// The variant attempted first.
    Main,
    /// A variant attempted only after every higher-priority variant fails
    /// (§4.7 step 7).
    Fallback,
}

/// A provider + model selection plus prompt templates, used to generate one
/// attempt at a producer's output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProducerVariant {
    /// Which provider serves this variant.
    pub provider: Provider,
    /// The provider's own model identifier, e.g. `"gpt-4.1"`.
    pub provider_model: String,
    /// Free-form provider configuration (temperature, size, voice, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// System prompt template (`{{Variable}}` substitution, §9).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// User prompt template (`{{Variable}}` substitution, §9).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    /// Declared template variable names, resolved via canonical-id rules.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Optional structured response schema (JSON Schema) the provider
    /// should be constrained to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    /// Optional plain-text output format hint (as opposed to
    /// `response_schema`'s structured form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_format: Option<String>,
    /// Scheduling priority among this producer's variants.
    pub priority: VariantPriority,
}

impl ProducerVariant {
    /// The default rate key for jobs dispatched to this variant:
    /// `"<provider>:<provider_model>"` (§4.3 step 5), unless overridden by a
    /// rate-key catalog entry.
    #[must_use]
    pub fn default_rate_key(&self) -> String {
        let provider = match &self.provider {
            Provider::Openai => "openai".to_string(),
            Provider::Anthropic => "anthropic".to_string(),
            Provider::Replicate => "replicate".to_string(),
            Provider::Stability => "stability".to_string(),
            Provider::Elevenlabs => "elevenlabs".to_string(),
            Provider::Custom(name) => name.clone(),
            Provider::Internal => "internal".to_string(),
        };
        format!("{provider}:{}", self.provider_model)
    }
}

/// A declared input slot on a blueprint node.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputDecl {
    /// Local (unqualified) name, unique within its owning node.
    pub name: String,
    /// Free-form type tag (`"string"`, `"number"`, `"image"`, …);
    /// interpreted by producer handlers, not validated by the core.
    pub type_tag: String,
    /// Whether omission (with no default) is a parse error.
    pub required: bool,
    /// Default value used when the inputs document omits this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// A declared artefact output slot on a blueprint node.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtefactDecl {
    /// Local (unqualified) name, unique within its owning node.
    pub name: String,
    /// Free-form type tag (`"text"`, `"image"`, `"audio"`, …).
    pub type_tag: String,
    /// Name of the input supplying the fan-out cardinality, if any. When
    /// set, the planner materialises one artefact instance per integer in
    /// `0..count` (§4.3 step 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_input: Option<String>,
}

/// A declared producer on a blueprint node.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProducerDecl {
    /// Local (unqualified) name, unique within its owning node.
    pub name: String,
    /// Default provider, used when no [`ProducerVariant`] overrides it.
    pub default_provider: Provider,
    /// Default provider model string.
    pub default_model: String,
    /// One or more candidate variants, at least one of which must have
    /// [`VariantPriority::Main`].
    pub variants: Vec<ProducerVariant>,
    /// Names of artefacts (declared on the same node) this producer
    /// produces.
    pub produces: Vec<String>,
    /// Names of inputs (declared on this node or an ancestor) this producer
    /// consumes, in declaration order.
    pub consumes: Vec<String>,
}

impl ProducerDecl {
    /// The variant list's single main variant.
    ///
    /// # Panics
    ///
    /// Never panics in a parsed (validated) blueprint; returns `None` if no
    /// variant is marked [`VariantPriority::Main`], which parsing rejects.
    #[must_use]
    pub fn main_variant(&self) -> Option<&ProducerVariant> {
        self.variants
            .iter()
            .find(|v| v.priority == VariantPriority::Main)
    }

    /// Fallback variants in declaration order.
    pub fn fallback_variants(&self) -> impl Iterator<Item = &ProducerVariant> {
        self.variants
            .iter()
            .filter(|v| v.priority == VariantPriority::Fallback)
    }
}

/// A reference to a sub-blueprint, expanded by the parser into a child
/// node whose namespace path is `parent + ref_alias` (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubBlueprintRef {
    /// Name of the module in the module library.
    pub module: String,
    /// Local alias under which the expanded child node is namespaced.
    pub alias: String,
}

/// A wire-level connection from a producer's declared output to a
/// consumer's declared input, independent of fan-out/fan-in resolution
/// (which the planner performs).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    /// Local name of the producing artefact.
    pub from_artefact: String,
    /// Local name of the consuming producer.
    pub to_producer: String,
    /// Local name of the input slot on `to_producer` bound by this edge.
    pub to_input: String,
    /// Optional alias under which the handler sees this binding, in
    /// addition to the canonical id (Testable Scenario 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// One node in the blueprint namespace tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BlueprintNode {
    /// Ordered namespace path from the tree root to this node (empty at the
    /// root).
    pub namespace: Vec<String>,
    /// Inputs declared directly on this node.
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    /// Artefacts declared directly on this node.
    #[serde(default)]
    pub artefacts: Vec<ArtefactDecl>,
    /// Producers declared directly on this node.
    #[serde(default)]
    pub producers: Vec<ProducerDecl>,
    /// Sub-blueprint references, expanded into `children` by the parser.
    #[serde(default)]
    pub sub_blueprints: Vec<SubBlueprintRef>,
    /// Wire-level edges declared on this node.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Child nodes, either declared inline or produced by sub-blueprint
    /// expansion.
    #[serde(default)]
    pub children: Vec<BlueprintNode>,
}

impl BlueprintNode {
    /// A new node at the given namespace path with no declarations.
    #[must_use]
    pub fn new(namespace: Vec<String>) -> Self {
        Self {
            namespace,
            ..Default::default()
        }
    }

    /// The dot-joined qualified name of this node's namespace path.
    #[must_use]
    pub fn qualified_path(&self) -> String {
        self.namespace.join(".")
    }

    /// Depth-first iterator over this node and every descendant.
    pub fn walk(&self) -> BlueprintWalk<'_> {
        BlueprintWalk {
            stack: vec![self],
        }
    }
}

/// Depth-first iterator produced by [`BlueprintNode::walk`].
pub struct BlueprintWalk<'a> {
    stack: Vec<&'a BlueprintNode>,
}

impl<'a> Iterator for BlueprintWalk<'a> {
    type Item = &'a BlueprintNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// User-supplied top-level override for a producer's prompt, injected at
/// the canonical id for `InquiryPrompt` (§4.2).
pub const INQUIRY_PROMPT_KEY: &str = "InquiryPrompt";

/// The parsed inputs document: resolved scalar/nested values plus any
/// model-selection overrides (§4.2, §6.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoadedInputs {
    /// Canonical input id (wire format) → resolved JSON value.
    pub values: BTreeMap<String, serde_json::Value>,
    /// Canonical, de-duplicated model selections.
    pub model_selections: Vec<ModelSelection>,
}

/// One resolved `{producerId, provider, model, config?}` selection (§6.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSelection {
    /// Qualified producer name this selection applies to.
    pub producer_id: String,
    /// Selected provider.
    pub provider: Provider,
    /// Selected provider model string.
    pub model: String,
    /// Optional flattened config, injected back into the input map under
    /// producer-scoped canonical ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}
