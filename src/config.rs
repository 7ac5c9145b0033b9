//! Pipeline configuration

use crate::{
    chunk::DEFAULT_CHUNK_SIZE, embed::DEFAULT_DIMENSION, job::RetryPolicy, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chunking settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: 0,
        }
    }
}

/// Retrieval and answer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks handed to the generator
    pub top_k: usize,
    /// Characters of each chunk echoed back as evidence
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            preview_chars: 100,
        }
    }
}

/// Answer cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the cache at all
    pub enabled: bool,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
    /// Maximum entries held by the in-memory backend
    pub capacity: usize,
}

impl CacheConfig {
    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            capacity: 1024,
        }
    }
}

/// Background processing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Start background workers; when false every document is processed inline
    pub enabled: bool,
    /// Number of worker tasks
    pub workers: usize,
    /// Retry policy for failed jobs
    pub retry: RetryPolicy,
    /// Keep succeeded jobs in the job table
    pub retain_completed: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 2,
            retry: RetryPolicy::default(),
            retain_completed: false,
        }
    }
}

/// Embedding and generation provider settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; placeholders are used when absent
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: String,
    /// Embedding model name
    pub embedding_model: String,
    /// Generation model name
    pub generation_model: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Per-call deadline in seconds
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Per-call deadline
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether live credentials are present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            generation_model: "gemini-2.0-flash-exp".to_string(),
            dimension: DEFAULT_DIMENSION,
            timeout_secs: 30,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chunking
    pub chunking: ChunkingConfig,
    /// Retrieval
    pub retrieval: RetrievalConfig,
    /// Answer cache
    pub cache: CacheConfig,
    /// Background processing
    pub queue: QueueConfig,
    /// Providers
    pub provider: ProviderConfig,
}

impl PipelineConfig {
    /// Defaults overridden by `GEMINI_API_KEY` and `DOCQA_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.provider.api_key = Some(key);
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_CHUNK_SIZE")? {
            config.chunking.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_TOP_K")? {
            config.retrieval.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_CACHE_TTL_SECS")? {
            config.cache.ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_CACHE_CAPACITY")? {
            config.cache.capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_QUEUE_ENABLED")? {
            config.queue.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_QUEUE_WORKERS")? {
            config.queue.workers = v;
        }
        if let Some(v) = parse_var(&lookup, "DOCQA_PROVIDER_TIMEOUT_SECS")? {
            config.provider.timeout_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if self.chunking.chunk_size == 0 {
            return invalid("chunk_size must be positive");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return invalid("overlap must be smaller than chunk_size");
        }
        if self.retrieval.top_k == 0 {
            return invalid("top_k must be positive");
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return invalid("cache capacity must be positive");
        }
        if self.queue.workers == 0 {
            return invalid("queue needs at least one worker");
        }
        if self.queue.retry.max_attempts == 0 {
            return invalid("max_attempts must be positive");
        }
        if self.provider.dimension == 0 {
            return invalid("embedding dimension must be positive");
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}
