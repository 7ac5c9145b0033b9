//! Processing jobs and their retry state machine
//!
//! ```text
//! Queued -> Running -> Succeeded
//!              |
//!              +-> FailedRetryable -> Queued     (attempts < max, transient error)
//!              |         |
//!              |         +-> FailedTerminal      (queue shut down before the retry)
//!              +-> FailedTerminal                (attempts exhausted or permanent error)
//! ```

use crate::{DocumentId, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    /// Create a new random job ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of background work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Chunk and embed a stored document
    #[serde(rename = "process-document")]
    ProcessDocument,
}

impl JobKind {
    /// Stable job type name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ProcessDocument => "process-document",
        }
    }
}

/// Job payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// What to do
    pub kind: JobKind,
    /// Document to do it to
    pub document_id: DocumentId,
}

impl ProcessingJob {
    /// A job that processes one document
    #[must_use]
    pub fn process_document(document_id: DocumentId) -> Self {
        Self {
            kind: JobKind::ProcessDocument,
            document_id,
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker
    Queued,
    /// Being processed
    Running,
    /// Finished successfully
    Succeeded,
    /// Failed, another attempt is scheduled
    FailedRetryable,
    /// Failed for good; kept for inspection
    FailedTerminal,
}

impl JobState {
    /// No further transitions are possible
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal)
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each further failure
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1.0).powi(exponent as i32);
        Duration::from_millis((self.initial_delay_ms as f64 * factor) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            multiplier: 2.0,
        }
    }
}

/// What happens after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Requeue after the delay
    Retry(Duration),
    /// Give up
    Terminal,
}

/// Bookkeeping for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier
    pub id: JobId,
    /// Payload
    pub job: ProcessingJob,
    /// Current state
    pub state: JobState,
    /// Attempts started so far
    pub attempts: u32,
    /// Informational progress, 0-100
    pub progress: u8,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the job was first queued
    pub enqueued_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly queued job
    #[must_use]
    pub fn new(job: ProcessingJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job,
            state: JobState::Queued,
            attempts: 0,
            progress: 0,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<()> {
        if self.state != from {
            return Err(Error::Queue(format!(
                "job {} cannot move from {:?} to {:?}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Queued -> Running
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Queued, JobState::Running)?;
        self.attempts += 1;
        self.progress = 0;
        Ok(())
    }

    /// Record a progress milestone while running
    pub fn report_progress(&mut self, progress: u8) {
        if self.state == JobState::Running {
            self.progress = progress.min(100);
        }
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self) -> Result<()> {
        self.transition(JobState::Running, JobState::Succeeded)?;
        self.progress = 100;
        Ok(())
    }

    /// Running -> FailedRetryable or FailedTerminal
    pub fn fail(&mut self, error: &Error, policy: &RetryPolicy) -> Result<FailureOutcome> {
        let retry = error.is_retryable() && self.attempts < policy.max_attempts;
        let next = if retry {
            JobState::FailedRetryable
        } else {
            JobState::FailedTerminal
        };
        self.transition(JobState::Running, next)?;
        self.last_error = Some(error.to_string());

        Ok(if retry {
            FailureOutcome::Retry(policy.delay_after(self.attempts))
        } else {
            FailureOutcome::Terminal
        })
    }

    /// FailedRetryable -> Queued
    pub fn requeue(&mut self) -> Result<()> {
        self.transition(JobState::FailedRetryable, JobState::Queued)
    }

    /// FailedRetryable -> FailedTerminal, when the retry will never run
    pub fn abandon(&mut self, reason: &str) -> Result<()> {
        self.transition(JobState::FailedRetryable, JobState::FailedTerminal)?;
        self.last_error = Some(match self.last_error.take() {
            Some(previous) => format!("{reason}: {previous}"),
            None => reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderErrorKind;

    fn transient() -> Error {
        Error::provider(ProviderErrorKind::Network, "connection reset")
    }

    #[test]
    fn test_job_kind_name() {
        assert_eq!(JobKind::ProcessDocument.name(), "process-document");
        let json = serde_json::to_string(&JobKind::ProcessDocument).unwrap();
        assert_eq!(json, "\"process-document\"");
    }

    #[test]
    fn test_retry_policy_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_happy_path() {
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));
        assert_eq!(record.state, JobState::Queued);
        record.start().unwrap();
        record.report_progress(25);
        assert_eq!(record.progress, 25);
        record.succeed().unwrap();
        assert_eq!(record.state, JobState::Succeeded);
        assert_eq!(record.progress, 100);
        assert_eq!(record.attempts, 1);
        assert!(record.state.is_final());
    }

    #[test]
    fn test_transient_failures_exhaust_retries() {
        let policy = RetryPolicy::default();
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));

        record.start().unwrap();
        let outcome = record.fail(&transient(), &policy).unwrap();
        assert_eq!(outcome, FailureOutcome::Retry(Duration::from_secs(2)));
        assert_eq!(record.state, JobState::FailedRetryable);
        record.requeue().unwrap();

        record.start().unwrap();
        let outcome = record.fail(&transient(), &policy).unwrap();
        assert_eq!(outcome, FailureOutcome::Retry(Duration::from_secs(4)));
        record.requeue().unwrap();

        record.start().unwrap();
        let outcome = record.fail(&transient(), &policy).unwrap();
        assert_eq!(outcome, FailureOutcome::Terminal);
        assert_eq!(record.state, JobState::FailedTerminal);
        assert_eq!(record.attempts, 3);
        assert!(record.last_error.as_deref().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_configuration_failure_is_terminal_immediately() {
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));
        record.start().unwrap();
        let err = Error::provider(ProviderErrorKind::Configuration, "invalid API key");
        let outcome = record.fail(&err, &RetryPolicy::default()).unwrap();
        assert_eq!(outcome, FailureOutcome::Terminal);
        assert_eq!(record.attempts, 1);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));
        assert!(record.succeed().is_err());
        assert!(record.requeue().is_err());
        record.start().unwrap();
        assert!(record.start().is_err());
    }

    #[test]
    fn test_abandoned_retry_becomes_terminal() {
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));
        assert!(record.abandon("queue shut down").is_err());

        record.start().unwrap();
        record.fail(&transient(), &RetryPolicy::default()).unwrap();
        record.abandon("queue shut down").unwrap();

        assert_eq!(record.state, JobState::FailedTerminal);
        let last_error = record.last_error.as_deref().unwrap();
        assert!(last_error.starts_with("queue shut down"));
        assert!(last_error.contains("connection reset"));
        assert!(record.requeue().is_err());
    }

    #[test]
    fn test_progress_ignored_when_not_running() {
        let mut record = JobRecord::new(ProcessingJob::process_document(DocumentId::new()));
        record.report_progress(50);
        assert_eq!(record.progress, 0);
    }
}
