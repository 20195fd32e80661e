//! Public error types for webpilot.

use thiserror::Error;
use webpilot_extract::ParsingError;
use webpilot_llm::{EngineError, LlmProviderError, RetryError};

use crate::actions::ActionError;

/// Errors surfaced by the webpilot facade.
///
/// Lower-level errors are wrapped unchanged so callers can still match on
/// the provider taxonomy or the parsing failure kind.
#[derive(Debug, Error)]
pub enum Error {
    /// The model answer could not be extracted or validated.
    #[error(transparent)]
    Parsing(#[from] ParsingError),

    /// A classified provider failure.
    #[error(transparent)]
    Provider(#[from] LlmProviderError),

    /// A structured completion failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The structured-output retry loop gave up.
    #[error(transparent)]
    Retry(#[from] RetryError),

    /// An action id or its parameters were rejected.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The browser controller failed.
    #[error("Browser error: {0}")]
    Browser(Box<dyn std::error::Error + Send + Sync>),

    /// The session used up its step budget.
    #[error(
        "Max number steps reached: {max_steps} in the current trajectory. Start a new session or increase max_steps."
    )]
    MaxStepsReached {
        /// The exhausted budget.
        max_steps: usize,
    },

    /// Configuration error (invalid settings or options).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error, e.g. while opening the usage log.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Message safe to show to end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Parsing(e) => e.user_message().to_string(),
            Self::Provider(e) => e.user_message(),
            Self::Engine(e) => e.user_message(),
            Self::Retry(RetryError::Provider(e)) => e.user_message(),
            Self::Retry(RetryError::Exhausted { last_error, .. }) => last_error.user_message(),
            Self::MaxStepsReached { max_steps } => format!(
                "Too many actions executed in the current session (i.e. {max_steps} actions). Please start a new session to continue."
            ),
            Self::Action(e) => e.to_string(),
            Self::Browser(_) | Self::Config(_) | Self::Io(_) => {
                "An unexpected error occurred while processing your request.".to_string()
            }
        }
    }

    /// Whether the failed operation may succeed when retried later.
    #[must_use]
    pub fn should_retry_later(&self) -> bool {
        match self {
            Self::Provider(e)
            | Self::Engine(EngineError::Provider(e))
            | Self::Retry(RetryError::Provider(e)) => e.should_retry_later(),
            _ => false,
        }
    }
}
