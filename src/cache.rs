//! Best-effort answer cache
//!
//! The cache only ever saves work. Every backend failure is logged and
//! treated as a miss, so answers are identical with or without it.

use crate::{rag::QueryResult, Availability, DocumentId, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache key for a question about a document
///
/// The question is used verbatim; differently worded questions are
/// different entries.
#[must_use]
pub fn cache_key(document_id: DocumentId, question: &str) -> String {
    format!("query:{document_id}:{question}")
}

/// Key-value store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store an entry for `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Whether entries are actually kept
    fn availability(&self) -> Availability {
        Availability::Available
    }
}

/// Default number of entries kept by [`InMemoryCache`]
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// In-process cache backend
///
/// Bounded by entry count; the least recently used entry is evicted when
/// full. Expired entries are dropped when read.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, (String, Instant)>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InMemoryCache {
    /// Create an empty cache holding at most [`DEFAULT_CAPACITY`] entries
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache holding at most `capacity` entries
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Maximum number of entries
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Number of entries, expired ones included until read or evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        let live = entries
            .get(key)
            .map(|(value, expires)| (*expires > Instant::now()).then(|| value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .put(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

/// Backend that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheBackend for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn availability(&self) -> Availability {
        Availability::Fallback
    }
}

/// Query results keyed by document and question
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("availability", &self.backend.availability())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the entry lifetime
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Backend availability
    #[must_use]
    pub fn availability(&self) -> Availability {
        self.backend.availability()
    }

    /// Cached result, or `None` on miss or any backend failure
    pub async fn get(&self, document_id: DocumentId, question: &str) -> Option<QueryResult> {
        let key = cache_key(document_id, question);
        let raw = match self.backend.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%document_id, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(result) => {
                tracing::debug!(%document_id, "cache hit");
                Some(result)
            }
            Err(e) => {
                tracing::warn!(%document_id, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store a result; failures are logged and dropped
    pub async fn put(&self, document_id: DocumentId, question: &str, result: &QueryResult) {
        let raw = match serde_json::to_string(result) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%document_id, error = %e, "could not serialize result for cache");
                return;
            }
        };

        let key = cache_key(document_id, question);
        if let Err(e) = self.backend.set(&key, raw, self.ttl).await {
            tracing::warn!(%document_id, error = %e, "cache write failed");
        }
    }
}
