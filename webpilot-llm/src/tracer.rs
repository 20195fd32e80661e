//! Append-only recording of LLM usage.
//!
//! Tracing is a side channel: a failing tracer is logged and ignored, it never
//! changes the outcome of a completion.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::classify::ProviderSignal;
use crate::types::{ChatMessage, CompletionResponse, TokenUsage};

/// Outcome of a traced completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageOutcome {
    /// The provider answered.
    Success {
        /// Content of the first choice.
        content: Option<String>,
        /// Reported token usage.
        usage: TokenUsage,
    },
    /// The provider call failed.
    Failure {
        /// Provider error text.
        error: String,
    },
}

/// One traced completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// When the call finished.
    pub timestamp: DateTime<Utc>,
    /// Model the call was made with.
    pub model: String,
    /// Messages sent.
    pub messages: Vec<ChatMessage>,
    /// What came back.
    pub outcome: UsageOutcome,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
}

impl UsageRecord {
    /// Builds a record from a completion result.
    #[must_use]
    pub fn new(
        model: &str,
        messages: &[ChatMessage],
        result: &Result<CompletionResponse, ProviderSignal>,
        latency: Duration,
    ) -> Self {
        let outcome = match result {
            Ok(response) => UsageOutcome::Success {
                content: response.first_content().map(str::to_string),
                usage: response.usage,
            },
            Err(signal) => UsageOutcome::Failure {
                error: signal.to_string(),
            },
        };
        Self {
            timestamp: Utc::now(),
            model: model.to_string(),
            messages: messages.to_vec(),
            outcome,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Sink for usage records. Must tolerate concurrent calls.
#[async_trait]
pub trait UsageTracer: Send + Sync {
    /// Records one call.
    async fn trace(&self, record: UsageRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageTracer;

#[async_trait]
impl UsageTracer for NoopUsageTracer {
    async fn trace(&self, _record: UsageRecord) {}
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryUsageTracer {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageTracer {
    /// Returns an empty tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records so far.
    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl UsageTracer for MemoryUsageTracer {
    async fn trace(&self, record: UsageRecord) {
        lock(&self.records).push(record);
    }
}

/// Appends records as JSON lines to a file.
///
/// Writes go through tokio so tracing never blocks a runtime worker.
#[derive(Debug)]
pub struct FileUsageTracer {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl FileUsageTracer {
    /// Opens (or creates) the log file, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(File::from_std(file)),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &UsageRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl UsageTracer for FileUsageTracer {
    async fn trace(&self, record: UsageRecord) {
        if let Err(e) = self.append(&record).await {
            tracing::warn!(path = %self.path.display(), "Failed to record LLM usage: {e}");
        }
    }
}

/// Default usage log location: `~/.webpilot/llm_usage.jsonl`.
#[must_use]
pub fn default_usage_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".webpilot").join("llm_usage.jsonl"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
