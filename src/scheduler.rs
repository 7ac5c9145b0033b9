//! Queued-or-inline processing

use crate::{
    job::ProcessingJob,
    processor::DocumentProcessor,
    queue::{JobHandle, JobQueue},
    DocumentId, Error, JobId, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a document was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Handed to the background queue; not yet processed
    Queued,
    /// Processed before returning
    Completed,
}

/// Outcome of ingesting a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingestion {
    /// The new document
    pub document_id: DocumentId,
    /// Queued or already processed
    pub mode: ProcessingMode,
    /// Background job, when queued
    pub job_id: Option<JobId>,
}

/// Sends documents to the queue, or processes them inline when it is unavailable
///
/// A caller never gets `Queued` unless a job was really accepted, and never
/// gets `Completed` unless the chunks are committed.
pub struct ProcessingScheduler {
    queue: Arc<dyn JobQueue>,
    processor: Arc<DocumentProcessor>,
}

impl std::fmt::Debug for ProcessingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingScheduler")
            .field("queue", &self.queue.availability())
            .field("processor", &self.processor)
            .finish()
    }
}

impl ProcessingScheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, processor: Arc<DocumentProcessor>) -> Self {
        Self { queue, processor }
    }

    /// The queue in use
    #[must_use]
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Process `text` for `document_id`, in the background when possible
    pub async fn schedule(&self, document_id: DocumentId, text: &str) -> Result<Ingestion> {
        if text.trim().is_empty() {
            return Err(Error::processing(
                document_id,
                Error::EmptyDocument(format!("document {document_id} has no content")),
            ));
        }

        if self.queue.availability().is_available() {
            match self
                .queue
                .enqueue(ProcessingJob::process_document(document_id))
                .await
            {
                Ok(JobHandle::Queued(job_id)) => {
                    tracing::info!(%document_id, %job_id, "document queued for processing");
                    return Ok(Ingestion {
                        document_id,
                        mode: ProcessingMode::Queued,
                        job_id: Some(job_id),
                    });
                }
                Ok(JobHandle::Disabled) => {
                    tracing::warn!(%document_id, "queue declined job, processing inline");
                }
                Err(e) => {
                    tracing::warn!(%document_id, error = %e, "enqueue failed, processing inline");
                }
            }
        } else {
            tracing::debug!(%document_id, "queue unavailable, processing inline");
        }

        self.processor.process(document_id, text).await?;
        Ok(Ingestion {
            document_id,
            mode: ProcessingMode::Completed,
            job_id: None,
        })
    }
}
