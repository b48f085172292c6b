//! Parser error taxonomy (§4.2, §7 `ParseError`). Every variant here is
//! fatal and user-facing: parsing never partially succeeds.

use mf_error::{ErrorCode, MediaforgeError};

/// Errors raised while expanding a blueprint tree or resolving an inputs
/// document.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The blueprint or inputs document was not well-formed.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A sub-blueprint reference chain referenced a module already being
    /// expanded (§4.2, §9 Design Notes).
    #[error("sub-blueprint expansion formed a cycle at module '{module}'")]
    CyclicSubBlueprint {
        /// The module name that closed the cycle.
        module: String,
    },

    /// A sub-blueprint reference named a module absent from the module
    /// library.
    #[error("unknown sub-blueprint module '{module}'")]
    UnknownModule {
        /// The referenced module name.
        module: String,
    },

    /// Two declarations of the same kind share a name within one namespace
    /// (§3 `BlueprintNode` invariant: identifiers unique within a node).
    #[error("duplicate identifier '{name}' declared in namespace '{namespace}'")]
    DuplicateIdentifier {
        /// Dot-joined namespace path the collision occurred in.
        namespace: String,
        /// The colliding local identifier.
        name: String,
    },

    /// A user-supplied input key matched more than one namespace (§4.1).
    #[error("ambiguous input name '{key}': matches {candidates:?}")]
    AmbiguousInput {
        /// The key as written in the inputs document.
        key: String,
        /// Every candidate canonical id (wire format) it could mean.
        candidates: Vec<String>,
    },

    /// A user-supplied input key matched no declared input (§4.1).
    #[error("unknown input '{key}'")]
    UnknownInput {
        /// The key as written in the inputs document.
        key: String,
    },

    /// Two distinct raw keys in the inputs document resolved to the same
    /// canonical input id (§4.2: "duplicates collapse to an error").
    #[error("duplicate resolved input '{canonical_id}': two or more keys in the inputs document resolve to it")]
    DuplicateResolvedInput {
        /// The canonical id (wire format) both keys resolved to.
        canonical_id: String,
    },

    /// A required input (with no default) has no value after resolution
    /// (§4.2, §3 `BlueprintNode` invariant).
    #[error("missing required inputs: {ids:?}")]
    MissingRequiredInputs {
        /// Canonical ids (wire format) of the missing required inputs.
        ids: Vec<String>,
    },

    /// A `models[]` entry or `<producer>.provider`/`<producer>.model` key
    /// named a producer matching more than one namespace (§4.2, §6.2).
    #[error("ambiguous producer name '{key}': matches {candidates:?}")]
    AmbiguousProducer {
        /// The key as written in the inputs document.
        key: String,
        /// Every candidate qualified producer name it could mean.
        candidates: Vec<String>,
    },

    /// A `models[]` entry or `<producer>.provider`/`<producer>.model` key
    /// named a producer absent from the blueprint.
    #[error("unknown producer '{key}'")]
    UnknownProducer {
        /// The key as written in the inputs document.
        key: String,
    },
}

impl From<ParseError> for MediaforgeError {
    fn from(err: ParseError) -> Self {
        let code = match &err {
            ParseError::MalformedDocument(_)
            | ParseError::DuplicateIdentifier { .. }
            | ParseError::DuplicateResolvedInput { .. }
            | ParseError::MissingRequiredInputs { .. } => ErrorCode::ParseMalformedDocument,
            ParseError::CyclicSubBlueprint { .. } => ErrorCode::ParseCyclicSubBlueprint,
            ParseError::UnknownModule { .. } | ParseError::UnknownProducer { .. } => {
                ErrorCode::ParseUnknownProducerVariant
            }
            ParseError::AmbiguousInput { .. } | ParseError::AmbiguousProducer { .. } => {
                ErrorCode::ParseAmbiguousInput
            }
            ParseError::UnknownInput { .. } => ErrorCode::ParseUnknownInput,
        };
        let message = err.to_string();
        MediaforgeError::new(code, message).with_source(err)
    }
}
