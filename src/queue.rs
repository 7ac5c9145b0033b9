//! Background processing queue

use crate::{
    config::QueueConfig,
    job::{FailureOutcome, JobId, JobRecord, JobState, ProcessingJob},
    processor::DocumentProcessor,
    Availability, Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Recorded on jobs whose retry was pending when the queue stopped
pub const SHUTDOWN_BEFORE_RETRY: &str = "queue shut down before retry";

/// Result of handing a job to a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "job_id")]
pub enum JobHandle {
    /// Accepted; a worker will pick it up
    Queued(JobId),
    /// No queue is running; the caller must do the work itself
    Disabled,
}

impl JobHandle {
    /// Job ID, if the job was actually queued
    #[must_use]
    pub fn job_id(self) -> Option<JobId> {
        match self {
            Self::Queued(id) => Some(id),
            Self::Disabled => None,
        }
    }
}

/// Durable-enough job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accept a job
    async fn enqueue(&self, job: ProcessingJob) -> Result<JobHandle>;

    /// Whether jobs are actually run in the background
    fn availability(&self) -> Availability;

    /// Current record for a job, if still tracked
    fn job(&self, id: JobId) -> Option<JobRecord>;

    /// Jobs that failed for good
    fn failed_jobs(&self) -> Vec<JobRecord>;
}

/// Queue used when background processing is turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledQueue;

#[async_trait]
impl JobQueue for DisabledQueue {
    async fn enqueue(&self, _job: ProcessingJob) -> Result<JobHandle> {
        Ok(JobHandle::Disabled)
    }

    fn availability(&self) -> Availability {
        Availability::Fallback
    }

    fn job(&self, _id: JobId) -> Option<JobRecord> {
        None
    }

    fn failed_jobs(&self) -> Vec<JobRecord> {
        Vec::new()
    }
}

struct Shared {
    processor: Arc<DocumentProcessor>,
    config: QueueConfig,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    sender: mpsc::UnboundedSender<JobId>,
    closed: AtomicBool,
}

impl Shared {
    fn progress(&self, id: JobId, progress: u8) {
        if let Some(record) = self.jobs.lock().get_mut(&id) {
            record.report_progress(progress);
        }
    }

    fn begin(&self, id: JobId) -> Option<(ProcessingJob, u32)> {
        let mut jobs = self.jobs.lock();
        let record = jobs.get_mut(&id)?;
        match record.start() {
            Ok(()) => Some((record.job, record.attempts)),
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "skipping job");
                None
            }
        }
    }

    async fn run(self: &Arc<Self>, id: JobId) {
        let Some((job, attempt)) = self.begin(id) else {
            return;
        };
        let document_id = job.document_id;
        tracing::info!(job_id = %id, %document_id, attempt, kind = job.kind.name(), "job started");

        let result = async {
            let document = self
                .processor
                .store()
                .get(document_id)
                .await
                .map_err(|e| Error::processing(document_id, e))?;
            self.progress(id, 25);
            self.processor
                .process_with_progress(document_id, &document.content, |p| self.progress(id, p))
                .await
        }
        .await;

        match result {
            Ok(document) => self.finish(id, document.chunks.len()),
            Err(e) => self.fail(id, &e),
        }
    }

    fn finish(&self, id: JobId, chunks: usize) {
        let mut jobs = self.jobs.lock();
        let Some(record) = jobs.get_mut(&id) else {
            return;
        };
        if let Err(e) = record.succeed() {
            tracing::warn!(job_id = %id, error = %e, "could not mark job succeeded");
            return;
        }
        tracing::info!(job_id = %id, document_id = %record.job.document_id, chunks, "job succeeded");
        if !self.config.retain_completed {
            jobs.remove(&id);
        }
    }

    fn fail(self: &Arc<Self>, id: JobId, error: &Error) {
        let outcome = {
            let mut jobs = self.jobs.lock();
            let Some(record) = jobs.get_mut(&id) else {
                return;
            };
            match record.fail(error, &self.config.retry) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "could not record failure");
                    return;
                }
            }
        };

        match outcome {
            FailureOutcome::Retry(delay) => {
                tracing::warn!(
                    job_id = %id,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "job failed, retrying"
                );
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.requeue(id);
                });
            }
            FailureOutcome::Terminal => {
                tracing::error!(job_id = %id, error = %error, "job failed permanently");
            }
        }
    }

    fn requeue(&self, id: JobId) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let requeued = self
            .jobs
            .lock()
            .get_mut(&id)
            .map(JobRecord::requeue);
        match requeued {
            Some(Ok(())) => {
                if self.sender.send(id).is_err() {
                    tracing::warn!(job_id = %id, "queue closed before retry");
                }
            }
            Some(Err(e)) => tracing::warn!(job_id = %id, error = %e, "could not requeue job"),
            None => {}
        }
    }
}

/// In-process queue served by a pool of tokio tasks
///
/// Failed jobs are retried with exponential backoff when the error is
/// transient; permanently failed jobs stay in the job table for inspection.
pub struct WorkerQueue {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerQueue")
            .field("workers", &self.workers.lock().len())
            .field("jobs", &self.shared.jobs.lock().len())
            .field("closed", &self.shared.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl WorkerQueue {
    /// Spawn `config.workers` workers on the current tokio runtime
    pub fn start(processor: Arc<DocumentProcessor>, config: QueueConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Queue(format!("no async runtime for workers: {e}")))?;
        if config.workers == 0 {
            return Err(Error::InvalidConfig("queue needs at least one worker".into()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            processor,
            config,
            jobs: Mutex::new(HashMap::new()),
            sender,
            closed: AtomicBool::new(false),
        });

        let workers = (0..shared.config.workers)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                let receiver = Arc::clone(&receiver);
                let mut stop = shutdown.subscribe();
                runtime.spawn(async move {
                    tracing::debug!(worker, "worker started");
                    loop {
                        let next = {
                            let mut receiver = receiver.lock().await;
                            if *stop.borrow() {
                                None
                            } else {
                                tokio::select! {
                                    id = receiver.recv() => id,
                                    _ = stop.changed() => None,
                                }
                            }
                        };
                        let Some(id) = next else { break };
                        shared.run(id).await;
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();

        tracing::info!(workers = shared.config.workers, "processing queue started");
        Ok(Self {
            shared,
            shutdown,
            workers: Mutex::new(workers),
        })
    }

    /// Jobs currently tracked, in no particular order
    #[must_use]
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.shared.jobs.lock().values().cloned().collect()
    }

    /// Stop accepting jobs and wait for running ones to finish
    ///
    /// Jobs still waiting in the queue are left in the `Queued` state.
    /// Jobs waiting out a retry delay become `FailedTerminal` and show up
    /// in [`JobQueue::failed_jobs`].
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "worker ended abnormally");
            }
        }

        let mut abandoned = 0usize;
        for record in self.shared.jobs.lock().values_mut() {
            if record.state == JobState::FailedRetryable
                && record.abandon(SHUTDOWN_BEFORE_RETRY).is_ok()
            {
                tracing::warn!(job_id = %record.id, "retry abandoned at shutdown");
                abandoned += 1;
            }
        }
        tracing::info!(abandoned, "processing queue stopped");
    }
}

#[async_trait]
impl JobQueue for WorkerQueue {
    async fn enqueue(&self, job: ProcessingJob) -> Result<JobHandle> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::Queue("queue is shut down".into()));
        }

        let record = JobRecord::new(job);
        let id = record.id;
        self.shared.jobs.lock().insert(id, record);

        if self.shared.sender.send(id).is_err() {
            self.shared.jobs.lock().remove(&id);
            return Err(Error::Queue("workers are gone".into()));
        }

        tracing::debug!(job_id = %id, document_id = %job.document_id, "job queued");
        Ok(JobHandle::Queued(id))
    }

    fn availability(&self) -> Availability {
        if self.shared.closed.load(Ordering::SeqCst) {
            Availability::Fallback
        } else {
            Availability::Available
        }
    }

    fn job(&self, id: JobId) -> Option<JobRecord> {
        self.shared.jobs.lock().get(&id).cloned()
    }

    fn failed_jobs(&self) -> Vec<JobRecord> {
        self.shared
            .jobs
            .lock()
            .values()
            .filter(|r| r.state == JobState::FailedTerminal)
            .cloned()
            .collect()
    }
}
