//! Sub-blueprint expansion (§4.2): turns an author-time tree of local names
//! into a [`BlueprintNode`] tree whose `namespace` fields are fully
//! qualified, recursively inlining every `sub_blueprints` reference against
//! a module library.

use crate::error::ParseError;
use mf_core::{ArtefactDecl, BlueprintNode, Edge, InputDecl, ProducerDecl, SubBlueprintRef};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Author-time blueprint node: declarations plus a *local* name (empty at
/// the root), as opposed to [`BlueprintNode`] whose `namespace` is already
/// the fully qualified path (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawBlueprintNode {
    /// Local (unqualified) name of this node; empty at the root and on
    /// sub-blueprint module roots (the alias supplies the name instead).
    #[serde(default)]
    pub name: String,
    /// Inputs declared directly on this node.
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    /// Artefacts declared directly on this node.
    #[serde(default)]
    pub artefacts: Vec<ArtefactDecl>,
    /// Producers declared directly on this node.
    #[serde(default)]
    pub producers: Vec<ProducerDecl>,
    /// Sub-blueprint references to expand against the module library.
    #[serde(default)]
    pub sub_blueprints: Vec<SubBlueprintRef>,
    /// Wire-level edges declared on this node.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Inline child nodes (as opposed to ones produced by sub-blueprint
    /// expansion).
    #[serde(default)]
    pub children: Vec<RawBlueprintNode>,
}

/// Named library of reusable sub-blueprints, each itself an unexpanded
/// [`RawBlueprintNode`] (its own `name` is ignored — the referencing
/// [`SubBlueprintRef::alias`] supplies the namespace segment, §4.2).
pub type ModuleLibrary = BTreeMap<String, RawBlueprintNode>;

/// Expand `root` against `library`, producing a fully qualified
/// [`BlueprintNode`] tree (§4.2 "Sub-blueprint expansion").
///
/// # Errors
///
/// Returns [`ParseError::UnknownModule`] if a `sub_blueprints` entry names a
/// module absent from `library`, [`ParseError::CyclicSubBlueprint`] if
/// expansion would recurse into a module already on the expansion stack
/// (§9 Design Notes: "Blueprint tree is strictly a DAG after sub-blueprint
/// expansion"), or [`ParseError::DuplicateIdentifier`] if two declarations
/// of the same kind share a name within one node (§3 invariant).
pub fn expand_blueprint(
    root: &RawBlueprintNode,
    library: &ModuleLibrary,
) -> Result<BlueprintNode, ParseError> {
    let mut stack = Vec::new();
    expand_node(root, &[], library, &mut stack)
}

fn expand_node(
    raw: &RawBlueprintNode,
    parent_ns: &[String],
    library: &ModuleLibrary,
    stack: &mut Vec<String>,
) -> Result<BlueprintNode, ParseError> {
    let namespace: Vec<String> = if raw.name.is_empty() {
        parent_ns.to_vec()
    } else {
        parent_ns
            .iter()
            .cloned()
            .chain(std::iter::once(raw.name.clone()))
            .collect()
    };

    validate_unique_names(raw, &namespace)?;

    let mut children = Vec::with_capacity(raw.children.len() + raw.sub_blueprints.len());
    for child in &raw.children {
        children.push(expand_node(child, &namespace, library, stack)?);
    }
    for sub_ref in &raw.sub_blueprints {
        if stack.iter().any(|m| m == &sub_ref.module) {
            return Err(ParseError::CyclicSubBlueprint {
                module: sub_ref.module.clone(),
            });
        }
        let module_root = library
            .get(&sub_ref.module)
            .ok_or_else(|| ParseError::UnknownModule {
                module: sub_ref.module.clone(),
            })?;
        let mut aliased = module_root.clone();
        aliased.name = sub_ref.alias.clone();

        stack.push(sub_ref.module.clone());
        let expanded = expand_node(&aliased, &namespace, library, stack);
        stack.pop();
        children.push(expanded?);
    }

    Ok(BlueprintNode {
        namespace,
        inputs: raw.inputs.clone(),
        artefacts: raw.artefacts.clone(),
        producers: raw.producers.clone(),
        sub_blueprints: Vec::new(),
        edges: raw.edges.clone(),
        children,
    })
}

fn validate_unique_names(raw: &RawBlueprintNode, namespace: &[String]) -> Result<(), ParseError> {
    let ns_label = namespace.join(".");
    let mut seen = HashSet::new();
    for name in raw.inputs.iter().map(|i| &i.name) {
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateIdentifier {
                namespace: ns_label,
                name: name.clone(),
            });
        }
    }
    let mut seen = HashSet::new();
    for name in raw.artefacts.iter().map(|a| &a.name) {
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateIdentifier {
                namespace: ns_label,
                name: name.clone(),
            });
        }
    }
    let mut seen = HashSet::new();
    for name in raw.producers.iter().map(|p| &p.name) {
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateIdentifier {
                namespace: ns_label,
                name: name.clone(),
            });
        }
    }
    let mut seen = HashSet::new();
    let child_names = raw
        .children
        .iter()
        .map(|c| c.name.clone())
        .chain(raw.sub_blueprints.iter().map(|s| s.alias.clone()));
    for name in child_names {
        if !name.is_empty() && !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateIdentifier {
                namespace: ns_label,
                name,
            });
        }
    }
    Ok(())
}
