// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry and fallback-variant policy for producer handler failures (§4.7
//! step 7, §4.8 error taxonomy).
//!
//! This crate decides, given a handler's reported error code and how many
//! attempts a job has already made within its current [`ProducerVariant`],
//! whether to retry the same variant, fall back to the next
//! [`VariantPriority::Fallback`] variant, or give up. It does not perform
//! the retry itself — the runner (`mf-runtime`) owns dispatch and awaits
//! [`RetryPolicy::backoff_delay`] between attempts.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mf_core::{ProducerDecl, ProducerVariant, VariantPriority};
use mf_error::ErrorCode;
use std::time::Duration;

/// What the runner should do after a job attempt fails (§4.7 step 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the same variant after waiting `delay`.
    RetrySameVariant {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Exhausted retries on the current variant; move to the next
    /// [`VariantPriority::Fallback`] variant.
    Fallback,
    /// No retry and no fallback remain; the job is terminally failed.
    GiveUp,
}

/// Governs per-variant retry attempts and backoff between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts against a single variant before falling back
    /// (§4.7 step 7: "Retries within a variant are bounded by ... a global
    /// max-attempts").
    pub max_attempts_per_variant: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Upper bound on computed backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_variant: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after attempt `attempt_in_variant` (1-based) of the
    /// current variant failed with `code`.
    ///
    /// - [`ErrorCode::HandlerSensitiveContent`] never retries or falls back
    ///   (§4.8: fatal, user-actionable).
    /// - Retryable codes (§4.8: `rate_limited`, `transient_provider_error`,
    ///   `provider_failure`, `unknown`) retry the same variant up to
    ///   `max_attempts_per_variant`, then fall back if `has_fallback`.
    /// - Any other code gives up immediately (§7 `HandlerError` codes
    ///   outside the retryable set are fatal, not user-actionable).
    #[must_use]
    pub fn decide(&self, attempt_in_variant: u32, code: ErrorCode, has_fallback: bool) -> RetryDecision {
        if code == ErrorCode::HandlerSensitiveContent {
            return RetryDecision::GiveUp;
        }
        if !code.is_retryable() {
            return if has_fallback {
                RetryDecision::Fallback
            } else {
                RetryDecision::GiveUp
            };
        }
        if attempt_in_variant < self.max_attempts_per_variant {
            RetryDecision::RetrySameVariant {
                delay: self.backoff_delay(attempt_in_variant),
            }
        } else if has_fallback {
            RetryDecision::Fallback
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Exponential backoff with no jitter: `base_delay * 2^(attempt - 1)`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt_in_variant: u32) -> Duration {
        let shift = attempt_in_variant.saturating_sub(1).min(20);
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }

    /// A `retry_after` hint reported by the handler (e.g. for
    /// `rate_limited`) always takes precedence over computed backoff,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt_in_variant: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(d) => d.min(self.max_delay),
            None => self.backoff_delay(attempt_in_variant),
        }
    }
}

/// Select the next untried fallback variant in declaration order (§4.7 step
/// 7). `tried` lists every variant already attempted for this job
/// (identified by `(provider, provider_model)`), including the main
/// variant.
#[must_use]
pub fn next_fallback<'a>(
    decl: &'a ProducerDecl,
    tried: &[(mf_core::Provider, String)],
) -> Option<&'a ProducerVariant> {
    decl.variants
        .iter()
        .filter(|v| v.priority == VariantPriority::Fallback)
        .find(|v| !tried.iter().any(|(p, m)| *p == v.provider && *m == v.provider_model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::{Provider};

    fn decl(variants: Vec<ProducerVariant>) -> ProducerDecl {
        ProducerDecl {
            name: "p".to_string(),
            default_provider: Provider::Openai,
            default_model: "gpt-4.1".to_string(),
            variants,
            produces: vec![],
            consumes: vec![],
        }
    }

    fn variant(provider: Provider, model: &str, priority: VariantPriority) -> ProducerVariant {
        ProducerVariant {
            provider,
            provider_model: model.to_string(),
            config: None,
            system_prompt: None,
            user_prompt: None,
            variables: vec![],
            response_schema: None,
            text_format: None,
            priority,
        }
    }

    #[test]
    fn sensitive_content_never_retries_or_falls_back() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, ErrorCode::HandlerSensitiveContent, true),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn transient_error_retries_within_variant() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, ErrorCode::HandlerTransientProviderError, true),
            RetryDecision::RetrySameVariant {
                delay: policy.backoff_delay(1)
            }
        );
    }

    #[test]
    fn exhausted_retries_fall_back_when_available() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(
                policy.max_attempts_per_variant,
                ErrorCode::HandlerProviderFailure,
                true
            ),
            RetryDecision::Fallback
        );
    }

    #[test]
    fn exhausted_retries_give_up_without_fallback() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(
                policy.max_attempts_per_variant,
                ErrorCode::HandlerProviderFailure,
                false
            ),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn non_retryable_unknown_future_code_falls_back_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, ErrorCode::ConfigInvalid, true),
            RetryDecision::Fallback
        );
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts_per_variant: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(1));
    }

    #[test]
    fn retry_after_hint_overrides_backoff() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(1, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn next_fallback_skips_already_tried_variants() {
        let d = decl(vec![
            variant(Provider::Openai, "gpt-4.1", VariantPriority::Main),
            variant(Provider::Anthropic, "claude-3.5", VariantPriority::Fallback),
            variant(Provider::Replicate, "sdxl", VariantPriority::Fallback),
        ]);
        let tried = vec![
            (Provider::Openai, "gpt-4.1".to_string()),
            (Provider::Anthropic, "claude-3.5".to_string()),
        ];
        let next = next_fallback(&d, &tried).unwrap();
        assert_eq!(next.provider, Provider::Replicate);
    }

    #[test]
    fn next_fallback_none_when_all_tried() {
        let d = decl(vec![
            variant(Provider::Openai, "gpt-4.1", VariantPriority::Main),
            variant(Provider::Anthropic, "claude-3.5", VariantPriority::Fallback),
        ]);
        let tried = vec![
            (Provider::Openai, "gpt-4.1".to_string()),
            (Provider::Anthropic, "claude-3.5".to_string()),
        ];
        assert!(next_fallback(&d, &tried).is_none());
    }
}
