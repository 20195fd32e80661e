//! # webpilot-llm
//!
//! Completion engine for the webpilot browser agent.
//!
//! [`LlmEngine`] sits between the agent and an LLM provider client. It makes
//! exactly one provider call per request, classifies failures into the closed
//! [`LlmProviderError`] taxonomy and turns JSON-mode answers into typed values
//! through [`webpilot_extract`].
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use webpilot_llm::prelude::*;
//! # use schemars::JsonSchema;
//! # use serde::Deserialize;
//! # async fn example(backend: Arc<dyn CompletionBackend>) -> Result<(), EngineError> {
//! #[derive(Deserialize, JsonSchema)]
//! struct Plan {
//!     url: String,
//! }
//!
//! let engine = LlmEngine::new(backend).with_model(LlmModel::OpenAi.id());
//! let plan: Plan = engine
//!     .structured_completion(vec![ChatMessage::user("Where should I go?")], None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Provider client adapters.
pub mod adapters;

/// The provider-call seam and model routing.
pub mod backend;

/// Provider signal classification.
pub mod classify;

/// The completion engine.
pub mod engine;

/// Public error types.
pub mod errors;

/// Model identifiers and presets.
pub mod models;

/// Bounded structured-output retries.
pub mod retry;

/// Usage recording.
pub mod tracer;

/// Request and response types.
pub mod types;

/// Commonly used types and traits.
pub mod prelude;

pub use backend::{CompletionBackend, ModelRouter};
pub use classify::{DefaultErrorMapper, ErrorMapper, ProviderSignal, ProviderSignalKind};
pub use engine::LlmEngine;
pub use errors::{EngineError, LlmProviderError};
pub use models::{LlmModel, DEFAULT_MODEL};
pub use retry::{RetryConfig, RetryError, RetryMetrics, StructuredRetry};
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, ResponseFormat, Role};
