//! LLM-backed page scraping.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use webpilot_extract::StructuredContent;
use webpilot_llm::{ChatMessage, LlmEngine, RetryConfig, RetryMetrics, StructuredRetry};

use crate::actions::{ActionError, BrowserController, SpecialAction};
use crate::errors::Error;

const DATA_TAG: &str = "data-extraction";

const MARKDOWN_PROMPT: &str = "You are a web scraping assistant. Convert the page content \
below into clean, well-structured markdown. Keep headings, lists, tables and links; drop \
navigation chrome, ads and cookie banners. Write the markdown between \
<data-extraction> and </data-extraction> tags and nothing else.";

const STRUCTURED_PROMPT: &str = "You are a web scraping assistant. Extract the requested \
data from the page content below. Answer with a single JSON object in a ```json code block \
that matches this JSON schema:";

/// Turns page text into markdown or typed data through an [`LlmEngine`].
#[derive(Clone)]
pub struct DataScraper {
    engine: LlmEngine,
    retry: RetryConfig,
    sc: StructuredContent,
}

impl DataScraper {
    /// Creates a scraper with the default retry policy.
    #[must_use]
    pub fn new(engine: LlmEngine) -> Self {
        Self {
            engine,
            retry: RetryConfig::default(),
            sc: StructuredContent::new()
                .with_outer_tag(DATA_TAG)
                .fail_if_final_tag(false),
        }
    }

    /// Sets the retry policy of [`DataScraper::scrape_structured`].
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Converts `page_text` into markdown.
    pub async fn scrape(
        &self,
        page_text: &str,
        instructions: Option<&str>,
    ) -> Result<String, Error> {
        let messages = vec![
            ChatMessage::system(MARKDOWN_PROMPT),
            ChatMessage::user(user_prompt(page_text, instructions)),
        ];
        let answer = self
            .engine
            .single_completion(messages, None, 0.0, None)
            .await?;
        let markdown = self.sc.extract(&answer)?;
        tracing::debug!(chars = markdown.len(), "Scraped page to markdown");
        Ok(markdown.trim().to_string())
    }

    /// Extracts a `T` from `page_text`, retrying on invalid answers.
    pub async fn scrape_structured<T>(
        &self,
        page_text: &str,
        instructions: Option<&str>,
    ) -> Result<(T, RetryMetrics), Error>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = webpilot_extract::schema_for_type::<T>();
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
        let messages = vec![
            ChatMessage::system(format!("{STRUCTURED_PROMPT}\n{schema}")),
            ChatMessage::user(user_prompt(page_text, instructions)),
        ];
        let retry = StructuredRetry::with_config(self.engine.clone(), self.retry.clone());
        Ok(retry.run::<T>(messages, None).await?)
    }

    /// Reads the current page from `browser` and scrapes it.
    pub async fn scrape_page<B>(&self, browser: &B, action: &SpecialAction) -> Result<String, Error>
    where
        B: BrowserController,
    {
        let SpecialAction::Scrape { instructions } = action else {
            return Err(ActionError::Invalid {
                id: action.id(),
                reason: "expected a scrape action".to_string(),
            }
            .into());
        };
        let page_text = browser
            .page_text()
            .await
            .map_err(|e| Error::Browser(Box::new(e)))?;
        self.scrape(&page_text, instructions.as_deref()).await
    }
}

fn user_prompt(page_text: &str, instructions: Option<&str>) -> String {
    match instructions {
        Some(instructions) => {
            format!("Instructions: {instructions}\n\nPage content:\n{page_text}")
        }
        None => format!("Page content:\n{page_text}"),
    }
}
