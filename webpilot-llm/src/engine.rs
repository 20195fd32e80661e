//! The completion engine.
//!
//! [`LlmEngine`] issues exactly one provider call per request, classifies
//! failures into [`LlmProviderError`] and records every call to a
//! [`UsageTracer`]. Retry policy lives with the caller (see
//! [`crate::retry::StructuredRetry`]).

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use webpilot_extract::{validate_json, ParsingError, StructuredContent};

use crate::backend::CompletionBackend;
use crate::classify::{DefaultErrorMapper, ErrorMapper};
use crate::errors::{EngineError, LlmProviderError};
use crate::models::DEFAULT_MODEL;
use crate::tracer::{NoopUsageTracer, UsageRecord, UsageTracer};
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, ResponseFormat};

/// Completion engine over a [`CompletionBackend`].
///
/// All fields are fixed at construction, so an engine can be shared across
/// tasks behind an `Arc` or cloned cheaply.
#[derive(Clone)]
pub struct LlmEngine {
    backend: Arc<dyn CompletionBackend>,
    mapper: Arc<dyn ErrorMapper>,
    tracer: Arc<dyn UsageTracer>,
    model: String,
    sc: StructuredContent,
}

impl LlmEngine {
    /// Creates an engine on [`DEFAULT_MODEL`] with the default error mapping
    /// and no usage tracing.
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            mapper: Arc::new(DefaultErrorMapper),
            tracer: Arc::new(NoopUsageTracer),
            model: DEFAULT_MODEL.to_string(),
            sc: StructuredContent::new()
                .with_inner_tag("json")
                .fail_if_inner_tag(false),
        }
    }

    /// Sets the model used when a request names none.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the usage tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<dyn UsageTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replaces the provider error mapping.
    #[must_use]
    pub fn with_error_mapper(mut self, mapper: Arc<dyn ErrorMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Default model of this engine.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Performs one completion call.
    ///
    /// # Errors
    ///
    /// Returns the classified [`LlmProviderError`] when the backend fails.
    pub async fn completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmProviderError> {
        let model = request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model);

        let start = Instant::now();
        let result = self.backend.complete(model, &request).await;
        self.tracer
            .trace(UsageRecord::new(
                model,
                &request.messages,
                &result,
                start.elapsed(),
            ))
            .await;

        result.map_err(|signal| {
            let error = self.mapper.classify(&signal, model);
            tracing::error!(model, kind = %signal.kind, "LLM completion failed: {}", error.dev_message());
            error
        })
    }

    /// Completes `messages` and returns the first choice verbatim.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error, or a retryable
    /// [`LlmProviderError::Generic`] when the provider returned no choice.
    pub async fn single_completion(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
        temperature: f64,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, LlmProviderError> {
        let mut request = CompletionRequest::new(messages)
            .with_temperature(temperature)
            .with_n(1);
        if let Some(model) = model {
            request = request.with_model(model);
        }
        if let Some(format) = response_format {
            request = request.with_response_format(format);
        }

        let response = self.completion(request).await?;
        let model = response.model.clone();
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                LlmProviderError::generic(format!("Provider {model} returned no choices"), true)
            })
    }

    /// Completes `messages` in JSON mode and validates the answer as `T`.
    ///
    /// The answer may be wrapped in a fenced json block.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Provider`] when the call fails and
    /// [`EngineError::Parsing`] when the answer is not a JSON object matching
    /// `T`'s schema.
    pub async fn structured_completion<T>(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<T, EngineError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let raw = self
            .single_completion(messages, model, 0.0, Some(ResponseFormat::JsonObject))
            .await?;
        let content = self.json_payload(raw.trim())?;
        Ok(validate_json::<T>(&content)?)
    }

    fn json_payload(&self, text: &str) -> Result<String, ParsingError> {
        let content = self.sc.extract(text)?.trim().to_string();
        tracing::info!("LLM response: \n{content}");

        if content.contains("```json") {
            return Ok(self.sc.extract(&content)?.trim().to_string());
        }
        if !content.starts_with('{') || !content.ends_with('}') {
            return Err(ParsingError::not_json_object(&content));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ProviderSignal, ProviderSignalKind};
    use crate::tracer::{MemoryUsageTracer, UsageOutcome};
    use crate::types::{Choice, TokenUsage};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::Mutex;
    use webpilot_extract::ParsingErrorKind;

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<Vec<Result<Vec<&'static str>, ProviderSignal>>>,
        seen: Mutex<Vec<(String, CompletionRequest)>>,
    }

    impl Scripted {
        fn reply(text: &'static str) -> Arc<Self> {
            Self::with(vec![Ok(vec![text])])
        }

        fn with(mut replies: Vec<Result<Vec<&'static str>, ProviderSignal>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(
            &self,
            model: &str,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderSignal> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), request.clone()));
            let reply = self.replies.lock().unwrap().pop().expect("script exhausted")?;
            Ok(CompletionResponse {
                model: model.to_string(),
                choices: reply
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| Choice::new(i, text))
                    .collect(),
                usage: TokenUsage {
                    input_tokens: 12,
                    output_tokens: 3,
                },
            })
        }
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Step {
        url: String,
        done: bool,
    }

    fn ask() -> Vec<ChatMessage> {
        vec![ChatMessage::user("next step?")]
    }

    #[tokio::test]
    async fn test_completion_defaults_model() {
        let backend = Scripted::reply("hi");
        let engine = LlmEngine::new(backend.clone());

        engine.completion(CompletionRequest::new(ask())).await.unwrap();

        assert_eq!(backend.seen.lock().unwrap()[0].0, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_empty_model_falls_back_to_engine_model() {
        let backend = Scripted::with(vec![Ok(vec!["a"]), Ok(vec!["b"])]);
        let engine = LlmEngine::new(backend.clone()).with_model("openai/gpt-4o");

        engine
            .single_completion(ask(), Some(""), 0.0, None)
            .await
            .unwrap();
        engine
            .single_completion(ask(), Some("cerebras/llama-3.3-70b"), 0.0, None)
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, "openai/gpt-4o");
        assert_eq!(seen[1].0, "cerebras/llama-3.3-70b");
    }

    #[tokio::test]
    async fn test_single_completion_returns_first_choice_verbatim() {
        let backend = Scripted::with(vec![Ok(vec!["  first \n", "second"])]);
        let engine = LlmEngine::new(backend.clone()).with_model("openai/gpt-4o");

        let text = engine
            .single_completion(ask(), None, 0.0, None)
            .await
            .unwrap();

        assert_eq!(text, "  first \n");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, "openai/gpt-4o");
        assert_eq!(seen[0].1.n, 1);
    }

    #[tokio::test]
    async fn test_single_completion_without_choices_is_retryable() {
        let engine = LlmEngine::new(Scripted::with(vec![Ok(vec![])]));

        let err = engine
            .single_completion(ask(), None, 0.0, None)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmProviderError::Generic { .. }));
        assert!(err.should_retry_later());
    }

    #[tokio::test]
    async fn test_structured_completion_fenced_json() {
        let backend = Scripted::reply("```json\n{\"url\": \"https://a.b\", \"done\": true}\n```");
        let engine = LlmEngine::new(backend.clone());

        let step: Step = engine.structured_completion(ask(), None).await.unwrap();

        assert_eq!(
            step,
            Step {
                url: "https://a.b".to_string(),
                done: true
            }
        );
        assert_eq!(
            backend.seen.lock().unwrap()[0].1.response_format,
            Some(ResponseFormat::JsonObject)
        );
    }

    #[tokio::test]
    async fn test_structured_completion_unclosed_fence_is_invalid_json() {
        let engine = LlmEngine::new(Scripted::reply("```json\n{\"url\": \"u\", \"done\": false}"));

        let err = engine
            .structured_completion::<Step>(ask(), None)
            .await
            .unwrap_err();

        let EngineError::Parsing(err) = err else {
            panic!("expected a parsing error, got {err:?}");
        };
        assert_eq!(err.kind(), ParsingErrorKind::InvalidJson);
    }

    #[tokio::test]
    async fn test_structured_completion_fence_after_prose() {
        let engine = LlmEngine::new(Scripted::reply(
            "Here is the step:\n```json\n{\"url\": \"u\", \"done\": false}\n```\nDone.",
        ));

        let step: Step = engine.structured_completion(ask(), None).await.unwrap();

        assert_eq!(step.url, "u");
        assert!(!step.done);
    }

    #[tokio::test]
    async fn test_structured_completion_rejects_non_object() {
        let engine = LlmEngine::new(Scripted::reply("Sure! Here you go."));

        let err = engine
            .structured_completion::<Step>(ask(), None)
            .await
            .unwrap_err();

        let EngineError::Parsing(err) = err else {
            panic!("expected a parsing error, got {err:?}");
        };
        assert_eq!(err.kind(), ParsingErrorKind::NotJsonObject);
        assert_eq!(err.content(), "Sure! Here you go.");
    }

    #[tokio::test]
    async fn test_structured_completion_schema_violation_keeps_content() {
        let engine = LlmEngine::new(Scripted::reply("{\"url\": 3}"));

        let err = engine
            .structured_completion::<Step>(ask(), None)
            .await
            .unwrap_err();

        let EngineError::Parsing(err) = err else {
            panic!("expected a parsing error, got {err:?}");
        };
        assert_eq!(err.kind(), ParsingErrorKind::Validation);
        assert_eq!(err.content(), "{\"url\": 3}");
        assert!(!err.validation_errors().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_classified_and_traced() {
        let tracer = Arc::new(MemoryUsageTracer::new());
        let engine = LlmEngine::new(Scripted::with(vec![Err(ProviderSignal::new(
            ProviderSignalKind::RateLimit,
            "429",
        ))]))
        .with_tracer(tracer.clone());

        let err = engine
            .single_completion(ask(), Some("cerebras/llama-3.3-70b"), 0.0, None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LlmProviderError::RateLimit {
                provider: "cerebras/llama-3.3-70b".to_string()
            }
        );
        let records = tracer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "cerebras/llama-3.3-70b");
        assert!(matches!(records[0].outcome, UsageOutcome::Failure { .. }));
    }

    #[tokio::test]
    async fn test_custom_error_mapper() {
        struct AlwaysCredits;
        impl ErrorMapper for AlwaysCredits {
            fn classify(&self, _signal: &ProviderSignal, _model: &str) -> LlmProviderError {
                LlmProviderError::InsufficientCredits
            }
        }

        let engine = LlmEngine::new(Scripted::with(vec![Err(ProviderSignal::new(
            ProviderSignalKind::Api,
            "boom",
        ))]))
        .with_error_mapper(Arc::new(AlwaysCredits));

        let err = engine
            .completion(CompletionRequest::new(ask()))
            .await
            .unwrap_err();

        assert_eq!(err, LlmProviderError::InsufficientCredits);
    }
}
