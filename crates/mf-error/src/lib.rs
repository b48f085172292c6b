//! Unified error taxonomy with stable error codes for mediaforge.
//!
//! Every mediaforge error carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, an optional cause chain,
//! and arbitrary key-value context. Use the builder returned by
//! [`MediaforgeError::new`] to construct errors fluently. The crate-specific
//! typed errors (`ParseError`, `PlanError`, `StorageError`, `HandlerError`,
//! `CancelledError`) each carry one of these codes so operators can alert on
//! a fixed vocabulary across crate boundaries.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Blueprint/inputs document parsing errors.
    Parse,
    /// Execution-plan construction errors.
    Plan,
    /// Blob/storage-context errors.
    Storage,
    /// Event-log append/read errors.
    EventLog,
    /// Manifest build/commit errors.
    Manifest,
    /// Producer handler invocation errors.
    Handler,
    /// Rate-limiter admission errors.
    RateLimit,
    /// Run or job cancellation.
    Cancel,
    /// Settings/configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Plan => "plan",
            Self::Storage => "storage",
            Self::EventLog => "event_log",
            Self::Manifest => "manifest",
            Self::Handler => "handler",
            Self::RateLimit => "rate_limit",
            Self::Cancel => "cancel",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Parse --
    /// Blueprint or inputs document failed to parse.
    ParseMalformedDocument,
    /// Sub-blueprint expansion formed a cycle.
    ParseCyclicSubBlueprint,
    /// Referenced producer variant does not exist.
    ParseUnknownProducerVariant,
    /// An input name resolves to more than one upstream node.
    ParseAmbiguousInput,
    /// An input name does not resolve to any upstream node.
    ParseUnknownInput,

    // -- Plan --
    /// The blueprint graph contains a cycle.
    PlanCycle,
    /// A producer's declared input is never bound.
    PlanUnboundInput,
    /// Two nodes resolved to the same canonical id.
    PlanDuplicateCanonicalId,

    // -- Storage --
    /// Underlying filesystem operation failed.
    StorageIoError,
    /// A composed path would escape the configured movie root.
    StoragePathEscape,
    /// A blob's content did not match its declared hash.
    StorageBlobHashMismatch,

    // -- EventLog --
    /// Failed to append a record to the event log.
    EventLogAppendFailed,
    /// The event log contains a malformed or truncated record.
    EventLogCorrupt,

    // -- Manifest --
    /// Failed to atomically commit a new manifest.
    ManifestCommitFailed,
    /// No manifest has been committed yet for this movie.
    ManifestNotFound,

    // -- Handler --
    /// The request would generate sensitive content; never retried.
    HandlerSensitiveContent,
    /// The provider is rate-limiting this caller.
    HandlerRateLimited,
    /// A transient provider error; retried per policy.
    HandlerTransientProviderError,
    /// A non-transient provider failure; retried then falls back.
    HandlerProviderFailure,
    /// An unrecognised handler error; treated as `HandlerProviderFailure`.
    HandlerUnknown,
    /// A variant declares a `{{Variable}}` reference that did not resolve
    /// against the job's bound inputs; never retried, falls back if
    /// possible.
    HandlerMissingInput,

    // -- RateLimit --
    /// Rate-key admission denied because no permit was available.
    RateLimitExhausted,

    // -- Cancel --
    /// The run or job was cancelled before completion.
    RunCancelled,

    // -- Config --
    /// Settings file or value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParseMalformedDocument
            | Self::ParseCyclicSubBlueprint
            | Self::ParseUnknownProducerVariant
            | Self::ParseAmbiguousInput
            | Self::ParseUnknownInput => ErrorCategory::Parse,

            Self::PlanCycle | Self::PlanUnboundInput | Self::PlanDuplicateCanonicalId => {
                ErrorCategory::Plan
            }

            Self::StorageIoError | Self::StoragePathEscape | Self::StorageBlobHashMismatch => {
                ErrorCategory::Storage
            }

            Self::EventLogAppendFailed | Self::EventLogCorrupt => ErrorCategory::EventLog,

            Self::ManifestCommitFailed | Self::ManifestNotFound => ErrorCategory::Manifest,

            Self::HandlerSensitiveContent
            | Self::HandlerRateLimited
            | Self::HandlerTransientProviderError
            | Self::HandlerProviderFailure
            | Self::HandlerUnknown
            | Self::HandlerMissingInput => ErrorCategory::Handler,

            Self::RateLimitExhausted => ErrorCategory::RateLimit,

            Self::RunCancelled => ErrorCategory::Cancel,

            Self::ConfigInvalid => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"PLAN_CYCLE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseMalformedDocument => "PARSE_MALFORMED_DOCUMENT",
            Self::ParseCyclicSubBlueprint => "PARSE_CYCLIC_SUB_BLUEPRINT",
            Self::ParseUnknownProducerVariant => "PARSE_UNKNOWN_PRODUCER_VARIANT",
            Self::ParseAmbiguousInput => "PARSE_AMBIGUOUS_INPUT",
            Self::ParseUnknownInput => "PARSE_UNKNOWN_INPUT",
            Self::PlanCycle => "PLAN_CYCLE",
            Self::PlanUnboundInput => "PLAN_UNBOUND_INPUT",
            Self::PlanDuplicateCanonicalId => "PLAN_DUPLICATE_CANONICAL_ID",
            Self::StorageIoError => "STORAGE_IO_ERROR",
            Self::StoragePathEscape => "STORAGE_PATH_ESCAPE",
            Self::StorageBlobHashMismatch => "STORAGE_BLOB_HASH_MISMATCH",
            Self::EventLogAppendFailed => "EVENT_LOG_APPEND_FAILED",
            Self::EventLogCorrupt => "EVENT_LOG_CORRUPT",
            Self::ManifestCommitFailed => "MANIFEST_COMMIT_FAILED",
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND",
            Self::HandlerSensitiveContent => "HANDLER_SENSITIVE_CONTENT",
            Self::HandlerRateLimited => "HANDLER_RATE_LIMITED",
            Self::HandlerTransientProviderError => "HANDLER_TRANSIENT_PROVIDER_ERROR",
            Self::HandlerProviderFailure => "HANDLER_PROVIDER_FAILURE",
            Self::HandlerUnknown => "HANDLER_UNKNOWN",
            Self::HandlerMissingInput => "HANDLER_MISSING_INPUT",
            Self::RateLimitExhausted => "RATE_LIMIT_EXHAUSTED",
            Self::RunCancelled => "RUN_CANCELLED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether a handler error of this code should be retried by the caller.
    ///
    /// Only meaningful for [`ErrorCategory::Handler`] codes; every other
    /// code returns `false`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HandlerRateLimited
                | Self::HandlerTransientProviderError
                | Self::HandlerProviderFailure
                | Self::HandlerUnknown
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// MediaforgeError
// ---------------------------------------------------------------------------

/// Unified mediaforge error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// underlying cause, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use mf_error::{MediaforgeError, ErrorCode};
///
/// let err = MediaforgeError::new(ErrorCode::HandlerRateLimited, "provider throttled us")
///     .with_context("provider", "openai")
///     .with_context("retry_after_ms", 2_000);
/// ```
pub struct MediaforgeError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl MediaforgeError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for MediaforgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MediaforgeError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for MediaforgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MediaforgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`MediaforgeError`] (without the opaque
/// source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaforgeErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&MediaforgeError> for MediaforgeErrorDto {
    fn from(err: &MediaforgeError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<MediaforgeErrorDto> for MediaforgeError {
    fn from(dto: MediaforgeErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
