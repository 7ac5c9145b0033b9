//! Pipeline assembly and the public entry points

use crate::{
    cache::{CacheBackend, InMemoryCache, ResultCache},
    chunk::FixedSizeChunker,
    config::PipelineConfig,
    embed::{Embedder, PlaceholderEmbedder},
    gemini::GeminiClient,
    generate::{AnswerGenerator, PlaceholderGenerator},
    job::JobRecord,
    processor::DocumentProcessor,
    queue::{DisabledQueue, JobQueue, WorkerQueue},
    rag::{Answer, QueryResult, RagEngine, RetrievedChunk},
    scheduler::{Ingestion, ProcessingScheduler},
    store::{DocumentStatus, DocumentStore, DocumentSummary, InMemoryDocumentStore},
    Availability, DocumentId, Error, JobId, Result,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Which collaborators are real and which are stand-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAvailability {
    /// Embedding provider
    pub embedder: Availability,
    /// Answer generator
    pub generator: Availability,
    /// Background queue
    pub queue: Availability,
    /// Answer cache
    pub cache: Availability,
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    store: Option<Arc<dyn DocumentStore>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
}

impl PipelineBuilder {
    /// Create a builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with providers chosen from `config`
    ///
    /// Uses Gemini when an API key is present, placeholders otherwise.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let builder = Self::new();

        let builder = if config.provider.is_configured() {
            let client = Arc::new(GeminiClient::new(&config.provider)?);
            tracing::info!(
                embedding_model = %config.provider.embedding_model,
                generation_model = %config.provider.generation_model,
                "using Gemini providers"
            );
            builder
                .shared_embedder(client.clone())
                .shared_generator(client)
        } else {
            builder
                .embedder(PlaceholderEmbedder::new(config.provider.dimension))
                .generator(PlaceholderGenerator::new())
        };

        Ok(builder.config(config))
    }

    /// Replace the configuration
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the embedding provider
    #[must_use]
    pub fn embedder(self, embedder: impl Embedder + 'static) -> Self {
        self.shared_embedder(Arc::new(embedder))
    }

    /// Set an embedding provider shared with other components
    #[must_use]
    pub fn shared_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the answer generator
    #[must_use]
    pub fn generator(self, generator: impl AnswerGenerator + 'static) -> Self {
        self.shared_generator(Arc::new(generator))
    }

    /// Set an answer generator shared with other components
    #[must_use]
    pub fn shared_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the document store
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the cache backend
    #[must_use]
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Process every document inline
    #[must_use]
    pub fn without_queue(mut self) -> Self {
        self.config.queue.enabled = false;
        self
    }

    /// Never cache answers
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// Build the pipeline
    ///
    /// Background workers need a tokio runtime; without one the pipeline
    /// processes inline.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        let embedder = self
            .embedder
            .ok_or_else(|| Error::InvalidConfig("embedder required".to_string()))?;
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(PlaceholderGenerator::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new()));

        let chunker = FixedSizeChunker::new(config.chunking.chunk_size)
            .with_overlap(config.chunking.overlap);
        let processor = Arc::new(
            DocumentProcessor::new(embedder.clone(), store.clone())
                .with_chunker(chunker)
                .with_timeout(config.provider.timeout()),
        );

        let workers = if config.queue.enabled {
            match WorkerQueue::start(processor.clone(), config.queue.clone()) {
                Ok(queue) => Some(Arc::new(queue)),
                Err(e) => {
                    tracing::warn!(error = %e, "background queue unavailable, processing inline");
                    None
                }
            }
        } else {
            None
        };
        let queue: Arc<dyn JobQueue> = match &workers {
            Some(workers) => Arc::clone(workers) as Arc<dyn JobQueue>,
            None => Arc::new(DisabledQueue),
        };

        let mut engine = RagEngine::new(embedder.clone(), generator, store.clone())
            .with_top_k(config.retrieval.top_k)
            .with_preview_chars(config.retrieval.preview_chars)
            .with_timeout(config.provider.timeout());
        if config.cache.enabled {
            let backend = match self.cache_backend {
                Some(backend) => backend,
                None => {
                    let capacity = NonZeroUsize::new(config.cache.capacity).ok_or_else(|| {
                        Error::InvalidConfig("cache capacity must be positive".to_string())
                    })?;
                    Arc::new(InMemoryCache::with_capacity(capacity))
                }
            };
            engine = engine.with_cache(ResultCache::new(backend).with_ttl(config.cache.ttl()));
        }

        Ok(Pipeline {
            scheduler: ProcessingScheduler::new(queue, processor),
            workers,
            engine,
            embedder,
            store,
            config,
        })
    }
}

/// Document question answering pipeline
pub struct Pipeline {
    scheduler: ProcessingScheduler,
    workers: Option<Arc<WorkerQueue>>,
    engine: RagEngine,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("availability", &self.availability())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Store a document and schedule its processing
    ///
    /// Surrounding whitespace is trimmed before storage.
    pub async fn ingest(&self, filename: &str, text: &str) -> Result<Ingestion> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyDocument(format!("{filename} has no text")));
        }

        let document = self.store.create(filename, text).await?;
        tracing::info!(
            document_id = %document.id,
            filename,
            chars = text.chars().count(),
            "document stored"
        );
        self.scheduler.schedule(document.id, text).await
    }

    /// Schedule processing again for a stored document
    pub async fn reprocess(&self, document_id: DocumentId) -> Result<Ingestion> {
        let document = self.store.get(document_id).await?;
        self.scheduler.schedule(document_id, &document.content).await
    }

    /// Answer a question, reporting whether the cache served it
    pub async fn ask(&self, document_id: DocumentId, question: &str) -> Result<Answer> {
        self.engine.ask(document_id, question).await
    }

    /// Answer a question
    pub async fn answer(&self, document_id: DocumentId, question: &str) -> Result<QueryResult> {
        self.engine.answer(document_id, question).await
    }

    /// Best chunks for a question, without generation
    pub async fn retrieve(
        &self,
        document_id: DocumentId,
        question: &str,
    ) -> Result<Vec<RetrievedChunk>> {
        self.engine.retrieve(document_id, question).await
    }

    /// Processing status of a document
    pub async fn status(&self, document_id: DocumentId) -> Result<DocumentStatus> {
        let document = self.store.get(document_id).await?;
        Ok(DocumentStatus::from(&document))
    }

    /// All documents, newest first
    pub async fn list(&self) -> Result<Vec<DocumentSummary>> {
        self.store.list().await
    }

    /// Record for a background job
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.scheduler.queue().job(id)
    }

    /// Background jobs that failed for good
    #[must_use]
    pub fn failed_jobs(&self) -> Vec<JobRecord> {
        self.scheduler.queue().failed_jobs()
    }

    /// Which collaborators are stand-ins
    #[must_use]
    pub fn availability(&self) -> ComponentAvailability {
        ComponentAvailability {
            embedder: self.embedder.availability(),
            generator: self.engine.generator().availability(),
            queue: self.scheduler.queue().availability(),
            cache: self
                .engine
                .cache()
                .map_or(Availability::Fallback, ResultCache::availability),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop background workers, letting running jobs finish
    pub async fn shutdown(&self) {
        if let Some(workers) = &self.workers {
            workers.shutdown().await;
        }
    }
}
