//! docqa: document question answering over embedded chunks
//!
//! Documents are split into fixed-size chunks, each chunk is embedded, and
//! questions are answered by ranking chunks against the embedded question and
//! handing the best ones to an answer generator.
//!
//! # Quick Start
//!
//! ```rust
//! use docqa::{
//!     embed::MockEmbedder,
//!     generate::PlaceholderGenerator,
//!     pipeline::PipelineBuilder,
//!     ProcessingMode,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let pipeline = PipelineBuilder::new()
//!     .embedder(MockEmbedder::new(64))
//!     .generator(PlaceholderGenerator::new())
//!     .without_queue()
//!     .build()
//!     .unwrap();
//!
//! let ingestion = pipeline
//!     .ingest("sky.txt", "The sky is blue. Grass is green.")
//!     .await
//!     .unwrap();
//! assert_eq!(ingestion.mode, ProcessingMode::Completed);
//!
//! let answer = pipeline
//!     .ask(ingestion.document_id, "What color is the sky?")
//!     .await
//!     .unwrap();
//! assert_eq!(answer.result.relevant_chunks.len(), 1);
//! # });
//! ```
//!
//! # Components
//!
//! - [`chunk`] - fixed-size character chunking
//! - [`embed`] / [`generate`] - provider traits and offline stand-ins
//! - [`rank`] - cosine similarity ranking
//! - [`processor`] - chunk + embed + atomic commit per document
//! - [`rag`] - question answering over a document's chunks
//! - [`cache`] - best-effort answer cache
//! - [`queue`] / [`scheduler`] - background processing with retries and a
//!   synchronous fallback

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod gemini;
pub mod generate;
pub mod job;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod rag;
pub mod rank;
pub mod scheduler;
pub mod store;

pub use cache::{CacheBackend, ResultCache};
pub use chunk::{Chunk, ChunkId, Chunker, FixedSizeChunker};
pub use config::PipelineConfig;
pub use embed::{Embedder, EmbeddingMode};
pub use error::{Error, ErrorKind, ProviderErrorKind, Result};
pub use generate::AnswerGenerator;
pub use job::{JobId, JobState, RetryPolicy};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use processor::DocumentProcessor;
pub use queue::{JobHandle, JobQueue};
pub use rag::{Answer, QueryResult, RagEngine};
pub use rank::{cosine_similarity, SimilarityRanker};
pub use scheduler::{ProcessingMode, ProcessingScheduler};
pub use store::DocumentStore;

use chrono::{DateTime, Utc};

/// Document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DocumentId(pub uuid::Uuid);

impl DocumentId {
    /// Create a new random document ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::NotFound(format!("invalid document id {s:?}: {e}")))
    }
}

/// Whether a collaborator is the real thing or a stand-in
///
/// Stand-ins (no credentials, no broker, no cache server) keep the pipeline
/// runnable, but callers must be able to tell degraded behavior from success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Backed by a working implementation
    Available,
    /// Disabled or placeholder implementation
    Fallback,
}

impl Availability {
    /// True for [`Availability::Available`]
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// An ingested document and its retrievable chunks
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Document {
    /// Unique document identifier
    pub id: DocumentId,
    /// Original file name, display only
    pub filename: String,
    /// Full extracted text
    pub content: String,
    /// Embedded chunks, replaced as a whole on reprocessing
    pub chunks: Vec<Chunk>,
    /// Set once every chunk carries an embedding
    pub processed: bool,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create an unprocessed document
    #[must_use]
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            filename: filename.into(),
            content: content.into(),
            chunks: Vec::new(),
            processed: false,
            created_at: Utc::now(),
        }
    }

    /// Replace the chunk set and mark the document processed
    ///
    /// Rejects an empty chunk set so `processed` never holds without chunks.
    pub fn replace_chunks(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Err(Error::EmptyDocument(self.filename.clone()));
        }
        self.chunks = chunks;
        self.processed = true;
        Ok(())
    }

    /// Check the processed invariant against a provider dimension
    #[must_use]
    pub fn is_consistent(&self, dimension: usize) -> bool {
        !self.processed
            || (!self.chunks.is_empty()
                && self.chunks.iter().all(|c| c.embedding.len() == dimension))
    }
}
