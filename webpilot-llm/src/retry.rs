//! Bounded retry loop for structured completions.
//!
//! [`LlmEngine`] never retries. [`StructuredRetry`] owns that policy: when an
//! answer cannot be extracted or validated it is echoed back to the model
//! together with feedback (errors plus expected schema) and the call is
//! re-issued, up to [`RetryConfig::max_attempts`] times.

use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use webpilot_extract::feedback::feedback_for_error;
use webpilot_extract::schema_for_type;

use crate::engine::LlmEngine;
use crate::errors::{EngineError, LlmProviderError};
use crate::types::ChatMessage;

/// Retry policy for [`StructuredRetry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up (default: 3).
    pub max_attempts: usize,
    /// Whether retryable provider errors are retried too (default: false).
    pub retry_provider_errors: bool,
    /// Pause before retrying a provider error (default: 1s).
    pub provider_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_provider_errors: false,
            provider_retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Retry provider errors whose `should_retry_later()` is true.
    #[must_use]
    pub const fn with_provider_retries(mut self, enabled: bool) -> Self {
        self.retry_provider_errors = enabled;
        self
    }

    /// Set the pause before a provider retry.
    #[must_use]
    pub const fn with_provider_retry_delay(mut self, delay: Duration) -> Self {
        self.provider_retry_delay = delay;
        self
    }
}

/// Metrics collected across the attempts of one run.
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    /// Total number of attempts made.
    pub total_attempts: usize,
    /// Wall-clock time of the whole run.
    pub wall_time: Duration,
    /// Estimated tokens sent, summed over attempts.
    pub estimated_input_tokens: usize,
    /// Estimated tokens of the rejected answers.
    pub estimated_output_tokens: usize,
}

/// Estimate token count from text with the 4-chars-per-token heuristic,
/// rounding up.
///
/// # Examples
///
/// ```
/// use webpilot_llm::retry::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);
/// assert_eq!(estimate_tokens("hello world"), 3);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// One failed attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The attempt number (1-indexed).
    pub attempt_number: usize,
    /// Developer message of the failure.
    pub error: String,
    /// Answer that was rejected; empty for provider failures.
    pub raw_output: String,
    /// Schema violations, if any.
    pub validation_errors: Vec<String>,
    /// Elapsed time at this attempt.
    pub elapsed: Duration,
}

/// Errors returned by [`StructuredRetry::run`].
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every attempt failed.
    #[error("Structured completion failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of attempts made.
        attempts: usize,
        /// Every failed attempt, oldest first.
        history: Vec<AttemptRecord>,
        /// Failure of the last attempt.
        last_error: EngineError,
        /// Metrics across all attempts.
        metrics: RetryMetrics,
    },

    /// A provider failure that is not retried under the current policy.
    #[error(transparent)]
    Provider(#[from] LlmProviderError),
}

/// Re-issues [`LlmEngine::structured_completion`] with validation feedback.
#[derive(Clone)]
pub struct StructuredRetry {
    engine: LlmEngine,
    config: RetryConfig,
}

impl StructuredRetry {
    /// Creates a retry loop with the default policy.
    #[must_use]
    pub fn new(engine: LlmEngine) -> Self {
        Self::with_config(engine, RetryConfig::default())
    }

    /// Creates a retry loop with `config`.
    #[must_use]
    pub const fn with_config(engine: LlmEngine, config: RetryConfig) -> Self {
        Self { engine, config }
    }

    /// Sets the maximum number of attempts (fluent builder pattern).
    #[must_use]
    pub const fn max_attempts(mut self, max: usize) -> Self {
        self.config.max_attempts = max;
        self
    }

    /// The policy in use.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs the loop until `T` validates or attempts run out.
    ///
    /// Each rejected answer is appended to the conversation as an assistant
    /// message, followed by a user message explaining what was wrong.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] when every attempt failed and
    /// [`RetryError::Provider`] for provider errors outside the retry policy.
    pub async fn run<T>(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<(T, RetryMetrics), RetryError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let schema = schema_for_type::<T>();
        let start = Instant::now();
        let mut conversation = messages;
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut metrics = RetryMetrics::default();

        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics.total_attempts = attempt;
            metrics.estimated_input_tokens += conversation
                .iter()
                .map(|m| estimate_tokens(&m.content))
                .sum::<usize>();

            let error = match self
                .engine
                .structured_completion::<T>(conversation.clone(), model)
                .await
            {
                Ok(value) => {
                    metrics.wall_time = start.elapsed();
                    return Ok((value, metrics));
                }
                Err(EngineError::Provider(provider)) if !self.retries(&provider) => {
                    return Err(RetryError::Provider(provider));
                }
                Err(error) => error,
            };

            match &error {
                EngineError::Parsing(parsing) => {
                    metrics.estimated_output_tokens += estimate_tokens(parsing.content());
                    history.push(AttemptRecord {
                        attempt_number: attempt,
                        error: parsing.dev_message().to_string(),
                        raw_output: parsing.content().to_string(),
                        validation_errors: parsing.validation_errors().to_vec(),
                        elapsed: start.elapsed(),
                    });
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        kind = ?parsing.kind(),
                        "Structured completion rejected"
                    );
                    if attempt < max_attempts {
                        let feedback = feedback_for_error(parsing, &schema, attempt, max_attempts);
                        conversation.push(ChatMessage::assistant(parsing.content()));
                        conversation.push(ChatMessage::user(feedback));
                    }
                }
                EngineError::Provider(provider) => {
                    history.push(AttemptRecord {
                        attempt_number: attempt,
                        error: provider.dev_message(),
                        raw_output: String::new(),
                        validation_errors: Vec::new(),
                        elapsed: start.elapsed(),
                    });
                    tracing::warn!(attempt, max_attempts, "Retrying after provider error: {provider}");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.provider_retry_delay).await;
                    }
                }
            }

            if attempt >= max_attempts {
                metrics.wall_time = start.elapsed();
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    history,
                    last_error: error,
                    metrics,
                });
            }
        }
    }

    const fn retries(&self, error: &LlmProviderError) -> bool {
        self.config.retry_provider_errors && error.should_retry_later()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("你好"), 1);
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(!config.retry_provider_errors);

        let config = config
            .with_max_attempts(5)
            .with_provider_retries(true)
            .with_provider_retry_delay(Duration::ZERO);
        assert_eq!(config.max_attempts, 5);
        assert!(config.retry_provider_errors);
        assert_eq!(config.provider_retry_delay, Duration::ZERO);
    }
}
