//! Embedding generation

use crate::{Availability, Error, ProviderErrorKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Embedding dimension used by the default provider and its stand-in
pub const DEFAULT_DIMENSION: usize = 768;

/// What the text is being embedded for
///
/// Asymmetric models produce different vectors for a passage and for a
/// question about it, so every call site states which one it wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// Text being stored for retrieval
    Document,
    /// Question being matched against stored text
    Query,
}

impl EmbeddingMode {
    /// Task type label understood by retrieval embedding APIs
    #[must_use]
    pub const fn task_type(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>>;

    /// Batch embed multiple texts, one vector per input in order
    async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text, mode).await?);
        }
        Ok(vectors)
    }

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Get model identifier
    fn model_id(&self) -> &str;

    /// Whether this is a real provider or a stand-in
    fn availability(&self) -> Availability {
        Availability::Available
    }
}

/// Run a provider call under a deadline, mapping expiry to a timeout error
pub(crate) async fn with_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::provider(
            ProviderErrorKind::Timeout,
            format!("{what} did not finish within {}ms", limit.as_millis()),
        )),
    }
}

/// Scale a vector to unit length in place; zero vectors are left alone
pub fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn hash_to_vector(text: &str, dimension: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut vector = Vec::with_capacity(dimension);
    let mut hasher = DefaultHasher::new();

    for i in 0..dimension {
        text.hash(&mut hasher);
        i.hash(&mut hasher);
        let hash = hasher.finish();
        // map to [-1, 1]
        let value = (hash as f32 / u64::MAX as f32) * 2.0 - 1.0;
        vector.push(value);
    }

    normalize_vector(&mut vector);
    vector
}

/// Deterministic hash-based embedder for tests and offline runs
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
    model_id: String,
    query_prefix: Option<String>,
    document_prefix: Option<String>,
}

impl MockEmbedder {
    /// Create a new mock embedder
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: "mock-embedder".to_string(),
            query_prefix: None,
            document_prefix: None,
        }
    }

    /// Set the model ID
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Prefix query texts, making query and document vectors differ
    #[must_use]
    pub fn with_query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.query_prefix = Some(prefix.into());
        self
    }

    /// Prefix document texts
    #[must_use]
    pub fn with_document_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.document_prefix = Some(prefix.into());
        self
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::EmptyDocument("empty text for embedding".to_string()));
        }

        let prefix = match mode {
            EmbeddingMode::Document => self.document_prefix.as_deref(),
            EmbeddingMode::Query => self.query_prefix.as_deref(),
        };
        let prefixed = match prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };

        Ok(hash_to_vector(&prefixed, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Stand-in used when no embedding provider is configured
///
/// Returns well-formed vectors of the configured dimension so ranking keeps
/// working, and reports itself as [`Availability::Fallback`].
#[derive(Debug, Clone)]
pub struct PlaceholderEmbedder {
    dimension: usize,
}

impl PlaceholderEmbedder {
    /// Create a placeholder embedder of the given dimension
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        tracing::warn!(
            dimension,
            "no embedding provider configured, using placeholder embeddings"
        );
        Self { dimension }
    }
}

impl Default for PlaceholderEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for PlaceholderEmbedder {
    async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>> {
        tracing::debug!(mode = mode.task_type(), "placeholder embedding");
        Ok(hash_to_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "placeholder"
    }

    fn availability(&self) -> Availability {
        Availability::Fallback
    }
}
