use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rig::client::CompletionClient;
use rig::completion::message::{AssistantContent, Message};
use rig::completion::{CompletionError, CompletionModel};
use serde_json::{Map, Value};

use crate::backend::CompletionBackend;
use crate::classify::{ProviderSignal, ProviderSignalKind};
use crate::types::{ChatMessage, Choice, CompletionRequest, CompletionResponse, Role, TokenUsage};

static STATUS_CODE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(4\d\d)\b").ok());

/// A [`CompletionBackend`] over any Rig provider client.
///
/// System messages become the preamble, the last message the prompt and the
/// rest the chat history. `n` and the response format are forwarded through
/// `additional_params`; Rig surfaces a single choice.
#[derive(Clone)]
pub struct RigBackend<C> {
    client: C,
}

impl<C> RigBackend<C>
where
    C: CompletionClient,
{
    /// Wraps a Rig client, e.g. an OpenAI-compatible provider client.
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> CompletionBackend for RigBackend<C>
where
    C: CompletionClient + Send + Sync,
    C::CompletionModel: Send + Sync,
{
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderSignal> {
        let (preamble, history, prompt) = split_messages(&request.messages)?;

        let provider_model = self.client.completion_model(model);
        let mut builder = provider_model
            .completion_request(prompt)
            .messages(history)
            .temperature(request.temperature);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(params) = additional_params(request) {
            builder = builder.additional_params(params);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| signal_from_rig_error(&e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            model: model.to_string(),
            choices: vec![Choice::new(0, content)],
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

/// Splits a conversation into (preamble, history, prompt).
fn split_messages(
    messages: &[ChatMessage],
) -> Result<(Option<String>, Vec<Message>, Message), ProviderSignal> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));

    let mut turns: Vec<Message> = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(Message::user(m.content.clone())),
            Role::Assistant => Some(Message::assistant(m.content.clone())),
        })
        .collect();

    let prompt = turns.pop().ok_or_else(|| {
        ProviderSignal::new(
            ProviderSignalKind::BadRequest,
            "Completion request has no user or assistant message",
        )
    })?;
    Ok((preamble, turns, prompt))
}

fn additional_params(request: &CompletionRequest) -> Option<Value> {
    let mut params = Map::new();
    if request.n != 1 {
        params.insert("n".to_string(), Value::from(request.n));
    }
    if let Some(format) = request.response_format {
        params.insert(
            "response_format".to_string(),
            serde_json::to_value(format).unwrap_or(Value::Null),
        );
    }
    (!params.is_empty()).then_some(Value::Object(params))
}

/// Converts a Rig error into a provider-neutral signal.
#[must_use]
pub fn signal_from_rig_error(error: &CompletionError) -> ProviderSignal {
    let message = error.to_string();
    let fallback = if matches!(
        error,
        CompletionError::ProviderError(_) | CompletionError::ResponseError(_)
    ) {
        ProviderSignalKind::Api
    } else {
        ProviderSignalKind::Other
    };
    ProviderSignal::new(classify_error_text(&message).unwrap_or(fallback), message)
}

/// Recognises the failure family from provider error text.
///
/// Providers report the same failures with different wording, so this checks
/// well-known phrases first and HTTP status codes last.
#[must_use]
pub fn classify_error_text(text: &str) -> Option<ProviderSignalKind> {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["credit balance is too low"]) {
        return Some(ProviderSignalKind::Other);
    }
    if has(&[
        "context_length_exceeded",
        "context window",
        "context length",
        "current length is",
        "prompt is too long",
        "maximum context",
        "exceeds the maximum number of tokens",
    ]) {
        return Some(ProviderSignalKind::ContextWindowExceeded);
    }
    if has(&["rate limit", "rate_limit", "too many requests"]) {
        return Some(ProviderSignalKind::RateLimit);
    }
    if has(&[
        "invalid api key",
        "invalid_api_key",
        "incorrect api key",
        "api key not valid",
        "permission_denied",
        "authentication",
        "unauthorized",
    ]) {
        return Some(ProviderSignalKind::Authentication);
    }
    if has(&["bad request", "invalid_request_error", "input should be a valid string"]) {
        return Some(ProviderSignalKind::BadRequest);
    }

    let code = STATUS_CODE.as_ref()?.captures(text)?.get(1)?.as_str();
    match code {
        "429" => Some(ProviderSignalKind::RateLimit),
        "401" | "403" => Some(ProviderSignalKind::Authentication),
        "400" | "404" | "422" => Some(ProviderSignalKind::BadRequest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig::completion::{CompletionRequest as RigRequest, CompletionResponse as RigResponse, Usage};
    use rig::streaming::StreamingCompletionResponse;
    use rig::OneOrMany;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Option<String>, usize, String)>>>;

    #[derive(Clone)]
    struct FakeClient {
        reply: Result<String, String>,
        seen: Seen,
    }

    #[derive(Clone)]
    struct FakeModel {
        reply: Result<String, String>,
        seen: Seen,
        model_name: String,
    }

    impl CompletionClient for FakeClient {
        type CompletionModel = FakeModel;

        fn completion_model(&self, model: impl Into<String>) -> FakeModel {
            FakeModel::make(self, model)
        }
    }

    impl CompletionModel for FakeModel {
        type Response = ();
        type StreamingResponse = ();
        type Client = FakeClient;

        fn make(client: &Self::Client, model: impl Into<String>) -> Self {
            Self {
                reply: client.reply.clone(),
                seen: client.seen.clone(),
                model_name: model.into(),
            }
        }

        async fn completion(
            &self,
            request: RigRequest,
        ) -> Result<RigResponse<Self::Response>, CompletionError> {
            self.seen.lock().unwrap().push((
                request.preamble.clone(),
                request.chat_history.len(),
                self.model_name.clone(),
            ));
            match &self.reply {
                Ok(text) => Ok(RigResponse {
                    choice: OneOrMany::one(AssistantContent::text(text.clone())),
                    usage: Usage::default(),
                    raw_response: (),
                }),
                Err(message) => Err(CompletionError::ProviderError(message.clone())),
            }
        }

        async fn stream(
            &self,
            _request: RigRequest,
        ) -> Result<StreamingCompletionResponse<Self::StreamingResponse>, CompletionError> {
            Err(CompletionError::ProviderError("streaming is not used".to_string()))
        }
    }

    fn backend(reply: Result<&str, &str>) -> (RigBackend<FakeClient>, Seen) {
        let seen = Seen::default();
        let client = FakeClient {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: seen.clone(),
        };
        (RigBackend::new(client), seen)
    }

    #[tokio::test]
    async fn test_rig_backend_maps_conversation_and_reply() {
        let (backend, seen) = backend(Ok("<r>done</r>"));
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("first"),
            ChatMessage::assistant("ok"),
            ChatMessage::user("second"),
        ]);

        let response = backend.complete("llama-3.3-70b", &request).await.unwrap();

        assert_eq!(response.first_content(), Some("<r>done</r>"));
        assert_eq!(response.model, "llama-3.3-70b");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("be brief"));
        assert_eq!(seen[0].1, 3);
        assert_eq!(seen[0].2, "llama-3.3-70b");
    }

    #[tokio::test]
    async fn test_rig_backend_converts_provider_errors() {
        let (backend, _) = backend(Err("429 Too Many Requests"));
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);

        let signal = backend.complete("m", &request).await.unwrap_err();

        assert_eq!(signal.kind, ProviderSignalKind::RateLimit);
    }

    #[tokio::test]
    async fn test_rig_backend_rejects_system_only_conversation() {
        let (backend, seen) = backend(Ok("unused"));
        let request = CompletionRequest::new(vec![ChatMessage::system("rules")]);

        let signal = backend.complete("m", &request).await.unwrap_err();

        assert_eq!(signal.kind, ProviderSignalKind::BadRequest);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_classify_error_text() {
        let cases = [
            ("This model's maximum context length is 8192 tokens (context_length_exceeded)", Some(ProviderSignalKind::ContextWindowExceeded)),
            ("Current length is 5000 while limit is 4096", Some(ProviderSignalKind::ContextWindowExceeded)),
            ("Rate limit reached for requests", Some(ProviderSignalKind::RateLimit)),
            ("HTTP status 429", Some(ProviderSignalKind::RateLimit)),
            ("Incorrect API key provided", Some(ProviderSignalKind::Authentication)),
            ("status 403 forbidden", Some(ProviderSignalKind::Authentication)),
            ("Input should be a valid string", Some(ProviderSignalKind::BadRequest)),
            ("status 400", Some(ProviderSignalKind::BadRequest)),
            ("Your credit balance is too low", Some(ProviderSignalKind::Other)),
            (r#"ProviderError: {"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#, Some(ProviderSignalKind::Authentication)),
            (r#"{"error":{"code":403,"status":"PERMISSION_DENIED"}}"#, Some(ProviderSignalKind::Authentication)),
            ("400: The input token count (1200000) exceeds the maximum number of tokens allowed (1048576).", Some(ProviderSignalKind::ContextWindowExceeded)),
            ("400 Request exceeds the maximum context size of the model", Some(ProviderSignalKind::ContextWindowExceeded)),
            ("connection reset by peer", None),
            ("processed 4290 tokens", None),
        ];
        for (text, expected) in cases {
            assert_eq!(classify_error_text(text), expected, "{text}");
        }
    }

    #[test]
    fn test_additional_params() {
        let plain = CompletionRequest::new(vec![]);
        assert!(additional_params(&plain).is_none());

        let json = CompletionRequest::new(vec![])
            .with_n(2)
            .with_response_format(crate::types::ResponseFormat::JsonObject);
        assert_eq!(
            additional_params(&json),
            Some(serde_json::json!({"n": 2, "response_format": {"type": "json_object"}}))
        );
    }
}
