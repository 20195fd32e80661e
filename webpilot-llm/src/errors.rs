use thiserror::Error;
use webpilot_extract::ParsingError;

const UNEXPECTED_USER_MESSAGE: &str =
    "An unexpected error occurred while processing your request.";

/// Classified LLM provider failures.
///
/// Every provider-client error is mapped to exactly one variant, so callers
/// branch on this closed set instead of provider-specific error types and
/// decide retries from [`LlmProviderError::should_retry_later`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmProviderError {
    /// The provider rejected the call because of rate limiting.
    #[error("Rate limit exceeded for provider {provider}. Please try again later.")]
    RateLimit {
        /// Model or provider identifier the call was made with.
        provider: String,
    },

    /// Authentication failed.
    #[error("Invalid API key for provider {provider}. Check your credentials.")]
    InvalidApiKey {
        /// Model or provider identifier the call was made with.
        provider: String,
    },

    /// The prompt does not fit in the model context window.
    #[error("{}", context_window_message(.provider, .current_size, .max_size))]
    ContextWindowExceeded {
        /// Model or provider identifier the call was made with.
        provider: String,
        /// Prompt size reported by the provider, if any.
        current_size: Option<u64>,
        /// Context limit reported by the provider, if any.
        max_size: Option<u64>,
    },

    /// The model received image content it cannot handle.
    #[error("Model {model} does not support images. Use a vision-capable model.")]
    ModelDoesNotSupportImage {
        /// Model that rejected the input.
        model: String,
    },

    /// The provider account has no credits left.
    #[error("Insufficient credits on the LLM provider account.")]
    InsufficientCredits,

    /// Any other provider failure.
    #[error("{dev_message}")]
    Generic {
        /// Diagnostic message for developers.
        dev_message: String,
        /// Message safe to show to end users.
        user_message: String,
        /// Optional hint for an agent.
        agent_message: Option<String>,
        /// Whether the same call may succeed later.
        should_retry_later: bool,
    },
}

fn context_window_message(provider: &str, current: &Option<u64>, max: &Option<u64>) -> String {
    match (current, max) {
        (Some(current), Some(max)) => format!(
            "Context window exceeded for provider {provider}: current size {current} exceeds limit {max}."
        ),
        _ => format!("Context window exceeded for provider {provider}."),
    }
}

impl LlmProviderError {
    /// Builds a [`LlmProviderError::Generic`] with the default user message.
    #[must_use]
    pub fn generic(dev_message: impl Into<String>, should_retry_later: bool) -> Self {
        Self::Generic {
            dev_message: dev_message.into(),
            user_message: UNEXPECTED_USER_MESSAGE.to_string(),
            agent_message: None,
            should_retry_later,
        }
    }

    /// Diagnostic message for developers.
    #[must_use]
    pub fn dev_message(&self) -> String {
        self.to_string()
    }

    /// Message safe to show to end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimit { .. } => {
                "The AI service is receiving too many requests. Please try again in a moment."
                    .to_string()
            }
            Self::InvalidApiKey { .. } => {
                "The AI service rejected the configured API key.".to_string()
            }
            Self::ContextWindowExceeded { .. } => {
                "The page is too large for the selected model. Try a model with a larger context window."
                    .to_string()
            }
            Self::ModelDoesNotSupportImage { model } => {
                format!("The model {model} cannot process images.")
            }
            Self::InsufficientCredits => {
                "The AI service account has run out of credits.".to_string()
            }
            Self::Generic { user_message, .. } => user_message.clone(),
        }
    }

    /// Hint for an agent deciding what to do next.
    #[must_use]
    pub fn agent_message(&self) -> Option<String> {
        match self {
            Self::RateLimit { .. } => Some("Wait before sending the next request.".to_string()),
            Self::ContextWindowExceeded { .. } => {
                Some("Shorten the conversation or the page content and retry.".to_string())
            }
            Self::Generic { agent_message, .. } => agent_message.clone(),
            Self::InvalidApiKey { .. }
            | Self::ModelDoesNotSupportImage { .. }
            | Self::InsufficientCredits => None,
        }
    }

    /// Whether a later retry of the same call may succeed.
    #[must_use]
    pub const fn should_retry_later(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::Generic {
                should_retry_later, ..
            } => *should_retry_later,
            Self::InvalidApiKey { .. }
            | Self::ContextWindowExceeded { .. }
            | Self::ModelDoesNotSupportImage { .. }
            | Self::InsufficientCredits => false,
        }
    }
}

/// Errors returned by structured completions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The model answered but its output could not be extracted or validated.
    #[error(transparent)]
    Parsing(#[from] ParsingError),

    /// The provider call itself failed.
    #[error(transparent)]
    Provider(#[from] LlmProviderError),
}

impl EngineError {
    /// Message safe to show to end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Parsing(e) => e.user_message().to_string(),
            Self::Provider(e) => e.user_message(),
        }
    }
}
