// SPDX-License-Identifier: MIT OR Apache-2.0
//! The producer handler contract (§4.8): `warm_start` / `invoke`, and the
//! error taxonomy a handler reports failures through.

use async_trait::async_trait;
use mf_core::{Blob, CanonicalId, JobDescriptor, ProducerVariant};
use mf_error::ErrorCode;
use mf_storage::{StorageContext, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A failure reported by a [`ProducerHandler`] invocation (§4.8, §7).
///
/// `code` is restricted in practice to the `Handler*` members of
/// [`ErrorCode`]; the runner's retry policy only recognises those.
#[derive(Debug, Clone)]
pub struct HandlerError {
    /// Stable error code driving retry/fallback decisions.
    pub code: ErrorCode,
    /// Human-readable failure description, persisted into
    /// [`mf_core::Diagnostics::message`] on terminal failure.
    pub message: String,
    /// Whether this failure requires user intervention (e.g. rewriting a
    /// prompt flagged for sensitive content) rather than an automatic
    /// retry or fallback.
    pub user_action_required: bool,
    /// Provider-supplied hint for how long to wait before retrying, used
    /// in place of computed backoff when present (§4.7 step 7).
    pub retry_after: Option<Duration>,
}

impl HandlerError {
    /// Whether the runner's retry policy should consider retrying or
    /// falling back from this error (delegates to [`ErrorCode::is_retryable`]).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The request would generate sensitive content. Never retried or
    /// fallen back from (§4.8).
    #[must_use]
    pub fn sensitive_content(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HandlerSensitiveContent,
            message: message.into(),
            user_action_required: true,
            retry_after: None,
        }
    }

    /// The provider is rate-limiting this caller. Retried after
    /// `retry_after` via the runner's own rate limiter (§4.8).
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            code: ErrorCode::HandlerRateLimited,
            message: message.into(),
            user_action_required: false,
            retry_after,
        }
    }

    /// A transient provider error, retried per policy (§4.8).
    #[must_use]
    pub fn transient_provider_error(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HandlerTransientProviderError,
            message: message.into(),
            user_action_required: false,
            retry_after: None,
        }
    }

    /// A non-transient provider failure, retried per policy then falls
    /// back (§4.8).
    #[must_use]
    pub fn provider_failure(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HandlerProviderFailure,
            message: message.into(),
            user_action_required: false,
            retry_after: None,
        }
    }

    /// An unrecognised handler error, treated as [`Self::provider_failure`]
    /// (§4.8).
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HandlerUnknown,
            message: message.into(),
            user_action_required: false,
            retry_after: None,
        }
    }

    /// A variant declared a `{{Variable}}` reference that did not resolve
    /// against the job's bound inputs (§9). Never retried; falls back to
    /// the next variant if one declares no such dependency.
    #[must_use]
    pub fn missing_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::HandlerMissingInput,
            message: message.into(),
            user_action_required: false,
            retry_after: None,
        }
    }
}

/// One handler-produced output, before persistence. A [`Blob`] output
/// carries raw bytes the runner will hash and write to the blob store; an
/// `Inline` output is stored verbatim (§9 Design Notes: tagged enum, never
/// `Box<dyn Any>`).
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    /// Bytes to be persisted as a content-addressed blob.
    Blob {
        /// Raw output bytes.
        bytes: Vec<u8>,
        /// MIME type, used to choose the blob's storage extension.
        mime_type: String,
    },
    /// A small structured value stored inline.
    Inline {
        /// The inline JSON value.
        value: serde_json::Value,
    },
}

/// The full result of one successful [`ProducerHandler::invoke`] call: one
/// output per artefact the dispatching job produces, keyed by that
/// artefact's canonical id (wire format).
#[derive(Debug, Clone, Default)]
pub struct ProduceResult {
    /// Artefact canonical id (wire format) → produced output.
    pub outputs: BTreeMap<String, HandlerOutput>,
}

impl ProduceResult {
    /// Build a result for a job producing exactly one artefact.
    #[must_use]
    pub fn single(artefact_id: &CanonicalId, output: HandlerOutput) -> Self {
        let mut outputs = BTreeMap::new();
        outputs.insert(artefact_id.as_wire(), output);
        Self { outputs }
    }
}

/// Everything a [`ProducerHandler`] needs for one dispatch attempt (§4.7
/// step 3, §4.8): the job being attempted, the variant chosen for this
/// attempt (may be a fallback variant, so it is not always
/// `job.variant`), the resolved inputs keyed by the producer's declared
/// alias, rendered prompts, and lazy blob access.
pub struct ProviderJobContext {
    /// The job descriptor being dispatched.
    pub job: JobDescriptor,
    /// The variant selected for this attempt.
    pub variant: ProducerVariant,
    /// Resolved input values, keyed by alias. `Blob` outputs appear as
    /// `{"blob": {hash, size, mime_type}}` metadata, never raw bytes —
    /// call [`ProviderJobContext::load_blob`] to fetch bytes on demand.
    pub inputs: BTreeMap<String, serde_json::Value>,
    /// `variant.system_prompt` with `{{Variable}}` placeholders substituted
    /// (§9), if the variant declared one.
    pub system_prompt: Option<String>,
    /// `variant.user_prompt` with `{{Variable}}` placeholders substituted
    /// (§9), if the variant declared one.
    pub user_prompt: Option<String>,
    /// 1-based attempt number within the current variant.
    pub attempt: u32,
    /// The movie this job belongs to, for blob storage keys.
    pub movie_id: String,
    storage: Arc<dyn StorageContext>,
}

impl ProviderJobContext {
    /// Construct a job context. Internal to `mf-runtime`; handlers only
    /// ever receive a `&ProviderJobContext`.
    #[must_use]
    pub(crate) fn new(
        job: JobDescriptor,
        variant: ProducerVariant,
        inputs: BTreeMap<String, serde_json::Value>,
        system_prompt: Option<String>,
        user_prompt: Option<String>,
        attempt: u32,
        movie_id: String,
        storage: Arc<dyn StorageContext>,
    ) -> Self {
        Self {
            job,
            variant,
            inputs,
            system_prompt,
            user_prompt,
            attempt,
            movie_id,
            storage,
        }
    }

    /// Fetch a previously stored blob's raw bytes. Handlers that only need
    /// metadata (hash/size/mime) never need to call this.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the blob cannot be read.
    pub async fn load_blob(&self, blob: &Blob) -> Result<Vec<u8>, StorageError> {
        mf_storage::read_blob(self.storage.as_ref(), &self.movie_id, blob).await
    }
}

/// The producer handler contract (§4.8): one implementation per provider,
/// registered in a [`crate::registry::ProviderRegistry`] under its
/// provider key.
#[async_trait]
pub trait ProducerHandler: Send + Sync {
    /// Optional warm-up hook (e.g. client construction, connectivity
    /// check) run once before a handler is first dispatched to. The
    /// default implementation is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if warm-up fails; the runner treats this
    /// the same as a first-attempt `invoke` failure.
    async fn warm_start(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Produce the outputs for one job attempt.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] on any provider or content failure; the
    /// runner consults `mf-retry` to decide whether to retry, fall back,
    /// or give up.
    async fn invoke(&self, ctx: &ProviderJobContext) -> Result<ProduceResult, HandlerError>;
}
