//! Translation of provider-client failures into [`LlmProviderError`].
//!
//! A backend adapter turns its native error into a [`ProviderSignal`] (a kind
//! plus the error text). An [`ErrorMapper`] then maps the signal to exactly one
//! taxonomy member. Supporting another provider client means supplying another
//! signal producer or mapper; engine call sites do not change.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::LlmProviderError;

static CONTEXT_SIZES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Current length is (\d+) while limit is (\d+)").ok());

/// Provider-neutral failure families raised by a completion client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSignalKind {
    /// Too many requests.
    RateLimit,
    /// Credentials rejected.
    Authentication,
    /// Prompt larger than the model context window.
    ContextWindowExceeded,
    /// Request rejected as malformed.
    BadRequest,
    /// Provider-side API failure.
    Api,
    /// Anything else (transport, decoding, unknown).
    Other,
}

impl ProviderSignalKind {
    const ALL: [Self; 6] = [
        Self::RateLimit,
        Self::Authentication,
        Self::ContextWindowExceeded,
        Self::BadRequest,
        Self::Api,
        Self::Other,
    ];

    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::ContextWindowExceeded => "context_window_exceeded",
            Self::BadRequest => "bad_request",
            Self::Api => "api",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ProviderSignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderSignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown provider signal kind: {s}"))
    }
}

/// A provider failure as seen by the engine: its family and its text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProviderSignal {
    /// Failure family.
    pub kind: ProviderSignalKind,
    /// Raw error text from the provider client.
    pub message: String,
}

impl ProviderSignal {
    /// Creates a signal.
    #[must_use]
    pub fn new(kind: ProviderSignalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Maps provider signals to the domain taxonomy.
pub trait ErrorMapper: Send + Sync {
    /// Classifies `signal`, raised while calling `model`.
    fn classify(&self, signal: &ProviderSignal, model: &str) -> LlmProviderError;
}

/// The default mapping table, see [`classify_signal`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn classify(&self, signal: &ProviderSignal, model: &str) -> LlmProviderError {
        classify_signal(signal, model)
    }
}

/// Maps a signal to exactly one [`LlmProviderError`].
///
/// | signal | error |
/// |---|---|
/// | `RateLimit` | `RateLimit` |
/// | `Authentication` | `InvalidApiKey` |
/// | `ContextWindowExceeded` | `ContextWindowExceeded` with parsed sizes |
/// | `BadRequest` mentioning `Input should be a valid string` | `ModelDoesNotSupportImage` |
/// | other `BadRequest` | `Generic`, not retryable |
/// | `Api` | `Generic`, retryable |
/// | `Other` mentioning `credit balance is too low` | `InsufficientCredits` |
/// | other `Other` | `Generic`, retryable |
#[must_use]
pub fn classify_signal(signal: &ProviderSignal, model: &str) -> LlmProviderError {
    let message = signal.message.as_str();
    match signal.kind {
        ProviderSignalKind::RateLimit => LlmProviderError::RateLimit {
            provider: model.to_string(),
        },
        ProviderSignalKind::Authentication => LlmProviderError::InvalidApiKey {
            provider: model.to_string(),
        },
        ProviderSignalKind::ContextWindowExceeded => {
            let (current_size, max_size) = parse_context_sizes(message);
            LlmProviderError::ContextWindowExceeded {
                provider: model.to_string(),
                current_size,
                max_size,
            }
        }
        ProviderSignalKind::BadRequest if message.contains("Input should be a valid string") => {
            LlmProviderError::ModelDoesNotSupportImage {
                model: model.to_string(),
            }
        }
        ProviderSignalKind::BadRequest => LlmProviderError::Generic {
            dev_message: format!("Bad request to provider {model}. {message}"),
            user_message: "Invalid request parameters to LLM provider.".to_string(),
            agent_message: None,
            should_retry_later: false,
        },
        ProviderSignalKind::Api => LlmProviderError::generic(
            format!("API error from provider {model}. {message}"),
            true,
        ),
        ProviderSignalKind::Other if message.contains("credit balance is too low") => {
            LlmProviderError::InsufficientCredits
        }
        ProviderSignalKind::Other => LlmProviderError::generic(
            format!("Unexpected error from LLM provider: {message}"),
            true,
        ),
    }
}

/// Parses `Current length is N while limit is M`; both `None` when absent.
#[must_use]
pub fn parse_context_sizes(message: &str) -> (Option<u64>, Option<u64>) {
    let Some(captures) = CONTEXT_SIZES.as_ref().and_then(|re| re.captures(message)) else {
        return (None, None);
    };
    let size = |i: usize| -> Option<u64> { captures.get(i)?.as_str().parse().ok() };
    (size(1), size(2))
}
