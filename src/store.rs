//! Document storage

use crate::{Document, DocumentId, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Processing status of a stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
    /// Document identifier
    pub document_id: DocumentId,
    /// Original file name
    pub filename: String,
    /// Whether chunks and embeddings are in place
    pub processed: bool,
    /// Number of stored chunks
    pub chunk_count: usize,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentStatus {
    fn from(doc: &Document) -> Self {
        Self {
            document_id: doc.id,
            filename: doc.filename.clone(),
            processed: doc.processed,
            chunk_count: doc.chunks.len(),
            created_at: doc.created_at,
        }
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document identifier
    pub document_id: DocumentId,
    /// Original file name
    pub filename: String,
    /// Whether chunks and embeddings are in place
    pub processed: bool,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
}

/// Persistence for documents
///
/// `save` replaces the whole document in one write, so readers see either
/// the previous version or the new one.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document, `NotFound` if it does not exist
    async fn get(&self, id: DocumentId) -> Result<Document>;

    /// Store a document, replacing any previous version
    async fn save(&self, document: Document) -> Result<()>;

    /// Create and store a new unprocessed document
    async fn create(&self, filename: &str, content: &str) -> Result<Document>;

    /// All documents, newest first
    async fn list(&self) -> Result<Vec<DocumentSummary>>;
}

/// In-process document store
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: DocumentId) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("document {id}")))
    }

    async fn save(&self, document: Document) -> Result<()> {
        self.documents.write().await.insert(document.id, document);
        Ok(())
    }

    async fn create(&self, filename: &str, content: &str) -> Result<Document> {
        let document = Document::new(filename, content);
        self.save(document.clone()).await?;
        Ok(document)
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let documents = self.documents.read().await;
        let mut summaries: Vec<DocumentSummary> = documents
            .values()
            .map(|doc| DocumentSummary {
                document_id: doc.id,
                filename: doc.filename.clone(),
                processed: doc.processed,
                created_at: doc.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, ErrorKind};

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryDocumentStore::new();
        let doc = store.create("a.txt", "alpha").await.unwrap();
        let loaded = store.get(doc.id).await.unwrap();
        assert_eq!(loaded.content, "alpha");
        assert!(!loaded.processed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.get(DocumentId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = InMemoryDocumentStore::new();
        let mut doc = store.create("a.txt", "alpha").await.unwrap();
        doc.replace_chunks(vec![Chunk::new(doc.id, "alpha".into(), 0, vec![1.0])])
            .unwrap();
        store.save(doc.clone()).await.unwrap();

        let loaded = store.get(doc.id).await.unwrap();
        assert!(loaded.processed);
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = InMemoryDocumentStore::new();
        let mut older = Document::new("old.txt", "x");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        store.save(older).await.unwrap();
        store.create("new.txt", "y").await.unwrap();

        let listed = store.list().await.unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["new.txt", "old.txt"]);
    }

    #[test]
    fn test_status_from_document() {
        let doc = Document::new("s.txt", "content");
        let status = DocumentStatus::from(&doc);
        assert_eq!(status.document_id, doc.id);
        assert_eq!(status.chunk_count, 0);
        assert!(!status.processed);
    }
}
