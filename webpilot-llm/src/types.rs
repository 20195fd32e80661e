//! Provider-neutral request and response types for the completion engine.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// End-user or agent input.
    User,
    /// Previous model output.
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response format hint forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text.
    Text,
    /// A single JSON object.
    JsonObject,
}

/// A completion request. Transient, scoped to one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Ordered conversation.
    pub messages: Vec<ChatMessage>,
    /// Target model; the engine default is used when `None`.
    pub model: Option<String>,
    /// Sampling temperature (default: 0.0).
    pub temperature: f64,
    /// Optional response format hint.
    pub response_format: Option<ResponseFormat>,
    /// Number of choices to request (default: 1).
    pub n: usize,
}

impl CompletionRequest {
    /// Creates a request with default sampling settings.
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: 0.0,
            response_format: None,
            n: 1,
        }
    }

    /// Sets the target model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the response format hint.
    #[must_use]
    pub const fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Sets the number of choices.
    #[must_use]
    pub const fn with_n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }
}

/// Message part of a [`Choice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Always [`Role::Assistant`] for provider output.
    pub role: Role,
    /// Generated text.
    pub content: String,
}

/// One generated alternative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Position in the response.
    pub index: usize,
    /// Generated message.
    pub message: ChoiceMessage,
}

impl Choice {
    /// Creates an assistant choice at `index`.
    #[must_use]
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            message: ChoiceMessage {
                role: Role::Assistant,
                content: content.into(),
            },
        }
    }
}

/// Token usage reported by the provider, zero when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

/// A provider response. Only the first choice is consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Model that produced the response.
    pub model: String,
    /// Generated alternatives.
    pub choices: Vec<Choice>,
    /// Token usage.
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Content of the first choice, if any.
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}
