//! Configuration types for Recall.
//!
//! `MemoryConfig` represents the `config.toml` that controls the short-term
//! cap, storage location, embedding model, and retrieval budget.

use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::context::BudgetUnit;
use crate::error::MemoryError;

/// Top-level configuration for the memory subsystem.
///
/// Loaded from `~/.recall/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term cap per session (must be at least 1).
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Durable store path or SQLite URL. `None` means `<data_dir>/memory.db`.
    #[serde(default)]
    pub storage_location: Option<String>,

    /// Embedding model; fixes the vector dimension for the process lifetime.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Base URL of an OpenAI-compatible embeddings API, if any.
    #[serde(default)]
    pub embedding_endpoint: Option<String>,

    /// Name of the environment variable holding the embeddings API key.
    #[serde(default = "default_embedding_api_key_env")]
    pub embedding_api_key_env: String,

    /// Vector size for HTTP models whose dimension is not built in.
    #[serde(default)]
    pub embedding_dimension: Option<usize>,

    /// Number of long-term matches requested per turn.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Number of recent messages considered per turn.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Default size budget for a retrieval context.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,

    #[serde(default)]
    pub budget_unit: BudgetUnit,

    /// Inactivity after which a session is reported idle (advisory).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,

    /// Backoff policy for transient storage failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Optional chat-completions model used to promote evicted messages.
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,
}

fn default_max_messages() -> usize {
    1000
}

fn default_embedding_model() -> String {
    "hashing-256".to_string()
}

fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_retrieval_top_k() -> usize {
    5
}

fn default_recent_limit() -> usize {
    50
}

fn default_context_budget() -> usize {
    4000
}

/// Upper bound for `idle_timeout_secs` (100 years).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_embedding_timeout_ms() -> u64 {
    5000
}

fn default_storage_timeout_ms() -> u64 {
    5000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            storage_location: None,
            embedding_model: default_embedding_model(),
            embedding_endpoint: None,
            embedding_api_key_env: default_embedding_api_key_env(),
            embedding_dimension: None,
            retrieval_top_k: default_retrieval_top_k(),
            recent_limit: default_recent_limit(),
            context_budget: default_context_budget(),
            budget_unit: BudgetUnit::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            storage_timeout_ms: default_storage_timeout_ms(),
            retry: RetryConfig::default(),
            summarizer: None,
        }
    }
}

impl MemoryConfig {
    /// Reject values the subsystem cannot operate with.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.max_messages == 0 {
            return Err(MemoryError::InvalidInput(
                "max_messages must be at least 1".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "embedding_model must not be empty".to_string(),
            ));
        }
        if self.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
            return Err(MemoryError::InvalidInput(format!(
                "idle_timeout_secs must be at most {MAX_IDLE_TIMEOUT_SECS}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(MemoryError::InvalidInput(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    /// Idle threshold, clamped to [`MAX_IDLE_TIMEOUT_SECS`].
    pub fn idle_timeout(&self) -> chrono::Duration {
        let secs = self.idle_timeout_secs.min(MAX_IDLE_TIMEOUT_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

/// OpenAI-compatible chat endpoint used for promotion on eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
}

/// Bounded exponential backoff for transient storage errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (hard limit).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based: the delay after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
