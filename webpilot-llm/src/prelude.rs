pub use crate::adapters::RigBackend;
pub use crate::backend::{CompletionBackend, ModelRouter};
pub use crate::classify::{ErrorMapper, ProviderSignal, ProviderSignalKind};
pub use crate::engine::LlmEngine;
pub use crate::errors::{EngineError, LlmProviderError};
pub use crate::models::{LlmModel, DEFAULT_MODEL};
pub use crate::retry::{RetryConfig, RetryError, StructuredRetry};
pub use crate::tracer::{FileUsageTracer, MemoryUsageTracer, UsageTracer};
pub use crate::types::{ChatMessage, CompletionRequest, ResponseFormat};
pub use webpilot_extract::{ParsingError, StructuredContent};
