// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concurrent execution runner for mediaforge (§4.7, §5).
//!
//! Responsibilities:
//! - dispatch an [`mf_core::ExecutionPlan`] layer by layer, each layer a
//!   barrier over the jobs it contains
//! - resolve each job's bound inputs (including fan-in aggregation),
//!   cache-check against the event log, and dispatch to a registered
//!   [`handler::ProducerHandler`]
//! - retry and fall back across a producer's declared variants on handler
//!   failure, rate-limited per `rate_key`
//! - persist every attempt as an [`mf_core::ArtefactEvent`] and commit a
//!   [`mf_core::Manifest`] once the run reaches a terminal state

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cooperative cancellation primitives for runs (§5).
pub mod cancel;
/// The producer handler contract (§4.8).
pub mod handler;
/// Typed registry of provider handlers (§4.8).
pub mod registry;
/// The runner itself: layer-barrier scheduling and retry/fallback dispatch
/// (§4.7).
pub mod run;
/// `{{Variable}}` prompt-template substitution (§9 Design Notes).
pub mod template;

pub use cancel::{CancellableRun, CancellationReason, CancellationToken};
pub use handler::{
    HandlerError, HandlerOutput, ProduceResult, ProducerHandler, ProviderJobContext,
};
pub use registry::{provider_key, ProviderRegistry};
pub use run::{JobOutcome, RunReport, RunStatus, Runner, RunnerError};
