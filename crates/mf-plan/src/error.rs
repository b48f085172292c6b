//! Planner error taxonomy (§4.3, §7 `PlanError`).

use mf_error::{ErrorCode, MediaforgeError};

/// Errors raised while compiling a blueprint tree into an [`crate::ExecutionPlan`].
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// An artefact's `count_input` did not resolve to a known, bound,
    /// non-negative integer input.
    #[error("artefact '{artefact}' count_input '{input}' did not resolve to an integer input value")]
    UnresolvedCountInput {
        /// Qualified name of the artefact declaring `count_input`.
        artefact: String,
        /// The `count_input` name as declared.
        input: String,
    },
    /// A producer's declared `consumes` or edge-bound input had no resolvable
    /// source (§4.3 step 3).
    #[error("producer '{producer}' input '{input}' has no resolvable source")]
    UnboundInput {
        /// Qualified producer name.
        producer: String,
        /// The input slot name that failed to resolve.
        input: String,
    },
    /// Layering detected a cycle among job dependencies (§3 `ExecutionPlan`
    /// invariant: producer strictly precedes consumer).
    #[error("execution plan contains a cycle and cannot be layered")]
    Cycle,
    /// Two distinct jobs computed the same canonical producer id (§3
    /// invariant: canonical ids are unique).
    #[error("duplicate canonical id '{id}' assigned to more than one job")]
    DuplicateCanonicalId {
        /// The colliding canonical id (wire format).
        id: String,
    },
    /// The execution plan could not be hashed.
    #[error("failed to compute plan hash: {0}")]
    HashFailure(String),
    /// A producer declaration has no `main`-priority variant to dispatch
    /// with.
    #[error("producer '{producer}' has no main variant")]
    NoMainVariant {
        /// Qualified producer name.
        producer: String,
    },
}

impl From<PlanError> for MediaforgeError {
    fn from(err: PlanError) -> Self {
        let code = match &err {
            PlanError::UnresolvedCountInput { .. } | PlanError::UnboundInput { .. } => {
                ErrorCode::PlanUnboundInput
            }
            PlanError::Cycle => ErrorCode::PlanCycle,
            PlanError::DuplicateCanonicalId { .. } => ErrorCode::PlanDuplicateCanonicalId,
            PlanError::HashFailure(_) => ErrorCode::PlanUnboundInput,
            PlanError::NoMainVariant { .. } => ErrorCode::PlanUnboundInput,
        };
        let message = err.to_string();
        MediaforgeError::new(code, message).with_source(err)
    }
}
