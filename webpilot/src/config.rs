//! Runtime configuration.

use std::path::PathBuf;
use std::sync::Arc;

use webpilot_llm::tracer::{default_usage_log_path, FileUsageTracer, NoopUsageTracer, UsageTracer};
use webpilot_llm::{CompletionBackend, LlmEngine, LlmModel, RetryConfig, StructuredRetry, DEFAULT_MODEL};

use crate::actions::StepBudget;
use crate::errors::Error;

/// Environment variable overriding [`WebpilotConfig::default_model`].
pub const MODEL_ENV: &str = "WEBPILOT_MODEL";
/// Environment variable overriding [`WebpilotConfig::usage_log_path`].
/// `off` (or an empty value) disables usage logging.
pub const USAGE_LOG_ENV: &str = "WEBPILOT_USAGE_LOG";
/// Environment variable overriding [`WebpilotConfig::structured_output_retries`].
pub const STRUCTURED_RETRIES_ENV: &str = "WEBPILOT_STRUCTURED_RETRIES";

/// Configuration shared by the engine, the retry loop and the scraper.
#[derive(Debug, Clone)]
pub struct WebpilotConfig {
    /// Model used when a call names none.
    ///
    /// Default: [`DEFAULT_MODEL`]
    pub default_model: String,

    /// JSON-lines usage log (None = no logging).
    ///
    /// Default: `~/.webpilot/llm_usage.jsonl`
    pub usage_log_path: Option<PathBuf>,

    /// Attempts allowed for a structured completion.
    ///
    /// Default: 3
    pub structured_output_retries: usize,

    /// Step budget of one agent session.
    ///
    /// Default: 20
    pub max_steps: usize,
}

impl Default for WebpilotConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            usage_log_path: default_usage_log_path(),
            structured_output_retries: 3,
            max_steps: 20,
        }
    }
}

impl WebpilotConfig {
    /// Create a new `WebpilotConfig` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `WEBPILOT_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`WebpilotConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            config.default_model = match model.parse::<LlmModel>() {
                Ok(preset) => preset.id().to_string(),
                Err(_) => model.trim().to_string(),
            };
        }

        if let Some(path) = lookup(USAGE_LOG_ENV) {
            let path = path.trim();
            config.usage_log_path =
                (!path.is_empty() && !path.eq_ignore_ascii_case("off")).then(|| PathBuf::from(path));
        }

        if let Some(retries) = lookup(STRUCTURED_RETRIES_ENV) {
            config.structured_output_retries = retries.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{STRUCTURED_RETRIES_ENV} must be a positive integer, got '{retries}'"
                ))
            })?;
            if config.structured_output_retries == 0 {
                return Err(Error::Config(format!(
                    "{STRUCTURED_RETRIES_ENV} must be at least 1"
                )));
            }
        }

        Ok(config)
    }

    /// Sets the default model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sets the default model from a preset.
    #[must_use]
    pub fn with_preset(self, preset: LlmModel) -> Self {
        self.with_model(preset.id())
    }

    /// Sets (or clears) the usage log.
    #[must_use]
    pub fn with_usage_log(mut self, path: Option<PathBuf>) -> Self {
        self.usage_log_path = path;
        self
    }

    /// Sets the structured-output attempt budget.
    #[must_use]
    pub const fn with_structured_output_retries(mut self, retries: usize) -> Self {
        self.structured_output_retries = retries;
        self
    }

    /// Sets the session step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Opens the configured usage tracer.
    pub fn usage_tracer(&self) -> Result<Arc<dyn UsageTracer>, Error> {
        match &self.usage_log_path {
            Some(path) => Ok(Arc::new(FileUsageTracer::open(path)?)),
            None => Ok(Arc::new(NoopUsageTracer)),
        }
    }

    /// Builds an engine over `backend` with this configuration.
    pub fn engine(&self, backend: Arc<dyn CompletionBackend>) -> Result<LlmEngine, Error> {
        Ok(LlmEngine::new(backend)
            .with_model(self.default_model.clone())
            .with_tracer(self.usage_tracer()?))
    }

    /// Step budget for a new session.
    #[must_use]
    pub const fn step_budget(&self) -> StepBudget {
        StepBudget::new(self.max_steps)
    }

    /// Retry policy matching this configuration.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.structured_output_retries)
    }

    /// Wraps `engine` in a structured-output retry loop.
    #[must_use]
    pub fn structured_retry(&self, engine: LlmEngine) -> StructuredRetry {
        StructuredRetry::with_config(engine, self.retry_config())
    }
}
