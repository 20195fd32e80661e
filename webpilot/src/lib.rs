//! # webpilot
//!
//! The LLM core of a browser automation agent.
//!
//! Raw provider answers are tolerant-parsed into validated values, provider
//! failures are classified into a closed taxonomy, and the special browser
//! actions (`S1` to `S8`) are described and validated for the agent.
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use webpilot::prelude::*;
//! # async fn example(backend: Arc<dyn CompletionBackend>) -> Result<(), Error> {
//! let config = WebpilotConfig::from_env()?;
//! let engine = config.engine(backend)?;
//!
//! let scraper = DataScraper::new(engine);
//! let markdown = scraper.scrape("<h1>Hello World</h1>", None).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Special browser actions.
pub mod actions;

/// Runtime configuration.
pub mod config;

/// Public error types.
pub mod errors;

/// Commonly used types and traits.
pub mod prelude;

/// LLM-backed page scraping.
pub mod scrape;

pub use errors::Error;
pub use webpilot_extract as extract;
pub use webpilot_llm as llm;
