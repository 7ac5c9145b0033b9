//! Document processing: chunk, embed, commit

use crate::{
    chunk::{Chunk, Chunker, FixedSizeChunker},
    embed::{with_timeout, Embedder, EmbeddingMode},
    store::DocumentStore,
    Document, DocumentId, Error, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for one provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// One async mutex per document currently being processed
#[derive(Debug, Default)]
struct DocumentLocks {
    locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    fn handle(&self, id: DocumentId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(id).or_default().clone()
    }

    fn release(&self, id: DocumentId) {
        let mut locks = self.locks.lock();
        // only the map still holds it
        if locks.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }
}

/// Turns a document's text into an embedded chunk set
///
/// Reprocessing replaces the chunk set; nothing is stored until every chunk
/// has its embedding. Runs for the same document are serialized. Failures
/// are not retried here.
pub struct DocumentProcessor {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    locks: DocumentLocks,
}

impl std::fmt::Debug for DocumentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentProcessor")
            .field("embedder", &self.embedder.model_id())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DocumentProcessor {
    /// Create a processor with the default 500-character chunker
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            chunker: Box::new(FixedSizeChunker::default()),
            embedder,
            store,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            locks: DocumentLocks::default(),
        }
    }

    /// Replace the chunker
    #[must_use]
    pub fn with_chunker(mut self, chunker: impl Chunker + 'static) -> Self {
        self.chunker = Box::new(chunker);
        self
    }

    /// Set the per-call embedding deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The document store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The embedding provider
    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Chunk and embed `text` without touching the store
    pub async fn embed_chunks(&self, id: DocumentId, text: &str) -> Result<Vec<Chunk>> {
        self.build_chunks(id, text)
            .await
            .map_err(|e| Error::processing(id, e))
    }

    async fn build_chunks(&self, id: DocumentId, text: &str) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyDocument(format!("document {id} has no content")));
        }

        let segments = self.chunker.split(text)?;
        let expected = self.embedder.dimension();
        let mut chunks = Vec::with_capacity(segments.len());

        for segment in segments {
            let embedding = with_timeout(
                self.timeout,
                "embedding call",
                self.embedder.embed(segment.text, EmbeddingMode::Document),
            )
            .await?;

            if embedding.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }

            chunks.push(Chunk::new(
                id,
                segment.text.to_string(),
                segment.start_offset,
                embedding,
            ));
        }

        tracing::debug!(document_id = %id, chunks = chunks.len(), "embedded chunks");
        Ok(chunks)
    }

    /// Replace the stored chunk set and mark the document processed, in one save
    pub async fn commit(&self, id: DocumentId, chunks: Vec<Chunk>) -> Result<Document> {
        let result = async {
            let mut document = self.store.get(id).await?;
            document.replace_chunks(chunks)?;
            self.store.save(document.clone()).await?;
            Ok(document)
        }
        .await;

        result.map_err(|e| Error::processing(id, e))
    }

    /// Chunk, embed, and commit `text` as the document's chunk set
    pub async fn process(&self, id: DocumentId, text: &str) -> Result<Document> {
        self.process_with_progress(id, text, |_| {}).await
    }

    /// [`DocumentProcessor::process`] reporting 75 after embedding and 100 after commit
    pub async fn process_with_progress<F>(
        &self,
        id: DocumentId,
        text: &str,
        progress: F,
    ) -> Result<Document>
    where
        F: Fn(u8) + Send + Sync,
    {
        let lock = self.locks.handle(id);
        let result = {
            let _guard = lock.lock().await;
            match self.embed_chunks(id, text).await {
                Ok(chunks) => {
                    progress(75);
                    let committed = self.commit(id, chunks).await;
                    if committed.is_ok() {
                        progress(100);
                    }
                    committed
                }
                Err(e) => Err(e),
            }
        };
        drop(lock);
        self.locks.release(id);

        if let Ok(document) = &result {
            tracing::info!(
                document_id = %id,
                chunks = document.chunks.len(),
                "document processed"
            );
        }
        result
    }

    /// Process a document using the text already in the store
    pub async fn process_stored(&self, id: DocumentId) -> Result<Document> {
        let document = self
            .store
            .get(id)
            .await
            .map_err(|e| Error::processing(id, e))?;
        self.process(id, &document.content).await
    }
}
