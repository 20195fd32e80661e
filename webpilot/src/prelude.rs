//! Common imports for webpilot usage.
//!
//! ```
//! use webpilot::prelude::*;
//! ```

pub use crate::actions::{
    is_special, BrowserActionId, BrowserController, SpecialAction, StepBudget,
};
pub use crate::config::WebpilotConfig;
pub use crate::errors::Error;
pub use crate::scrape::DataScraper;

// Rig client trait, needed to build a RigBackend
pub use rig::client::CompletionClient;

pub use webpilot_extract::{ParsingError, StructuredContent};
pub use webpilot_llm::adapters::RigBackend;
pub use webpilot_llm::{
    ChatMessage, CompletionBackend, EngineError, LlmEngine, LlmModel, LlmProviderError,
    ModelRouter, StructuredRetry,
};
