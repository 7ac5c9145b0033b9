//! Question answering over a document's chunks

use crate::{
    cache::ResultCache,
    embed::{with_timeout, Embedder, EmbeddingMode},
    generate::AnswerGenerator,
    processor::DEFAULT_PROVIDER_TIMEOUT,
    rank::SimilarityRanker,
    store::DocumentStore,
    Chunk, DocumentId, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Characters of each chunk echoed back as evidence
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Separator between chunks in the context window
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A chunk that contributed to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEvidence {
    /// Truncated chunk text
    pub text: String,
    /// Cosine similarity to the question
    pub score: f32,
}

/// Answer with the evidence that justified it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Generated answer
    pub answer: String,
    /// Contributing chunks, best first
    pub relevant_chunks: Vec<ChunkEvidence>,
}

/// A [`QueryResult`] and whether it came from the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The result
    #[serde(flatten)]
    pub result: QueryResult,
    /// Served from the cache
    pub cached: bool,
}

/// A retrieved chunk with its score
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// The chunk
    pub chunk: Chunk,
    /// Cosine similarity to the question
    pub score: f32,
}

/// Join chunk texts in ranked order into one context string
#[must_use]
pub fn assemble_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Embeds the question, ranks chunks, and asks the generator
///
/// Generator failures are returned as typed provider errors and never
/// retried here.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn AnswerGenerator>,
    store: Arc<dyn DocumentStore>,
    ranker: SimilarityRanker,
    cache: Option<ResultCache>,
    preview_chars: usize,
    timeout: Duration,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("embedder", &self.embedder.model_id())
            .field("generator", &self.generator.model_id())
            .field("ranker", &self.ranker)
            .field("cache", &self.cache)
            .field("preview_chars", &self.preview_chars)
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Create an engine without a cache
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn AnswerGenerator>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            ranker: SimilarityRanker::default(),
            cache: None,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Number of chunks handed to the generator
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.ranker = SimilarityRanker::new(top_k);
        self
    }

    /// Length of evidence previews
    #[must_use]
    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Per-call provider deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Put a result cache in front of [`RagEngine::answer`]
    #[must_use]
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The generator
    #[must_use]
    pub fn generator(&self) -> &Arc<dyn AnswerGenerator> {
        &self.generator
    }

    /// The cache, if any
    #[must_use]
    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Rank the document's chunks against `question` without generating
    pub async fn retrieve(
        &self,
        document_id: DocumentId,
        question: &str,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_question(question)?;

        let query = with_timeout(
            self.timeout,
            "query embedding",
            self.embedder.embed(question, EmbeddingMode::Query),
        )
        .await?;

        let document = self.store.get(document_id).await?;
        if document.chunks.is_empty() {
            return Err(Error::NotFound(format!(
                "document {document_id} has no chunks"
            )));
        }

        Ok(self
            .ranker
            .rank(&query, &document.chunks)
            .into_iter()
            .map(|r| RetrievedChunk {
                chunk: r.chunk.clone(),
                score: r.score,
            })
            .collect())
    }

    /// Answer a question, consulting the cache first
    pub async fn ask(&self, document_id: DocumentId, question: &str) -> Result<Answer> {
        validate_question(question)?;

        if let Some(cache) = &self.cache {
            if let Some(result) = cache.get(document_id, question).await {
                return Ok(Answer {
                    result,
                    cached: true,
                });
            }
        }

        let result = self.compute(document_id, question).await?;

        if let Some(cache) = &self.cache {
            cache.put(document_id, question, &result).await;
        }

        Ok(Answer {
            result,
            cached: false,
        })
    }

    /// Answer a question
    pub async fn answer(&self, document_id: DocumentId, question: &str) -> Result<QueryResult> {
        self.ask(document_id, question).await.map(|a| a.result)
    }

    async fn compute(&self, document_id: DocumentId, question: &str) -> Result<QueryResult> {
        let retrieved = self.retrieve(document_id, question).await?;
        let context = assemble_context(&retrieved);

        let answer = with_timeout(
            self.timeout,
            "answer generation",
            self.generator.generate(&context, question),
        )
        .await?;

        tracing::info!(
            %document_id,
            chunks = retrieved.len(),
            top_score = retrieved.first().map_or(0.0, |r| r.score),
            "answered question"
        );

        Ok(QueryResult {
            answer,
            relevant_chunks: retrieved
                .iter()
                .map(|r| ChunkEvidence {
                    text: r.chunk.preview(self.preview_chars),
                    score: r.score,
                })
                .collect(),
        })
    }
}

fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::EmptyDocument("question is empty".to_string()));
    }
    Ok(())
}
