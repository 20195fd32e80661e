//! The network-facing seam of the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::classify::{ProviderSignal, ProviderSignalKind};
use crate::types::{CompletionRequest, CompletionResponse};

/// Issues one completion call against a concrete provider client.
///
/// Implementations must not retry. Failures are reported as a
/// [`ProviderSignal`] so the engine can classify them.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Completes `request` with `model`, already resolved by the caller.
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderSignal>;
}

/// Dispatches `provider/model` identifiers to registered backends.
///
/// The provider prefix is stripped before the call, so a backend registered
/// for `groq` receives `llama-3.3-70b-versatile` for
/// `groq/llama-3.3-70b-versatile`.
#[derive(Clone, Default)]
pub struct ModelRouter {
    backends: HashMap<String, Arc<dyn CompletionBackend>>,
    fallback: Option<Arc<dyn CompletionBackend>>,
}

impl ModelRouter {
    /// Returns an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `backend` for the `provider/` prefix.
    #[must_use]
    pub fn route(mut self, provider: impl Into<String>, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backends.insert(provider.into(), backend);
        self
    }

    /// Backend used for ids without a registered prefix. It receives the full id.
    #[must_use]
    pub fn fallback(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    /// Registered provider prefixes.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    fn resolve<'a>(&self, model: &'a str) -> Option<(&Arc<dyn CompletionBackend>, &'a str)> {
        if let Some((provider, name)) = model.split_once('/') {
            if let Some(backend) = self.backends.get(provider) {
                return Some((backend, name));
            }
        }
        self.fallback.as_ref().map(|backend| (backend, model))
    }
}

#[async_trait]
impl CompletionBackend for ModelRouter {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderSignal> {
        let Some((backend, name)) = self.resolve(model) else {
            return Err(ProviderSignal::new(
                ProviderSignalKind::BadRequest,
                format!("No completion backend registered for model '{model}'"),
            ));
        };
        tracing::debug!(model, routed_as = name, "Routing completion request");
        let mut response = backend.complete(name, request).await?;
        response.model = model.to_string();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, Choice, TokenUsage};

    struct Echo(&'static str);

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(
            &self,
            model: &str,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderSignal> {
            Ok(CompletionResponse {
                model: model.to_string(),
                choices: vec![Choice::new(0, format!("{}:{model}", self.0))],
                usage: TokenUsage::default(),
            })
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_router_strips_provider_prefix() {
        let router = ModelRouter::new().route("groq", Arc::new(Echo("groq")));
        let response = router.complete("groq/llama-3.3-70b", &request()).await.unwrap();
        assert_eq!(response.first_content(), Some("groq:llama-3.3-70b"));
        assert_eq!(response.model, "groq/llama-3.3-70b");
    }

    #[tokio::test]
    async fn test_router_fallback_receives_full_id() {
        let router = ModelRouter::new()
            .route("groq", Arc::new(Echo("groq")))
            .fallback(Arc::new(Echo("fallback")));
        let response = router.complete("gpt-4o", &request()).await.unwrap();
        assert_eq!(response.first_content(), Some("fallback:gpt-4o"));
    }

    #[tokio::test]
    async fn test_router_unknown_provider_is_bad_request() {
        let router = ModelRouter::new().route("groq", Arc::new(Echo("groq")));
        let signal = router.complete("mistral/large", &request()).await.unwrap_err();
        assert_eq!(signal.kind, ProviderSignalKind::BadRequest);
    }
}
