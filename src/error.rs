//! Error types for docqa

use crate::DocumentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes reported by embedding and generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Connection refused, reset, or 5xx from the provider
    Network,
    /// The call exceeded its deadline
    Timeout,
    /// Rate limit or usage quota exhausted
    Quota,
    /// Bad or missing credentials, unknown model
    Configuration,
    /// Anything the provider did not explain
    Other,
}

impl ProviderErrorKind {
    /// Whether a later attempt can reasonably succeed
    #[must_use]
    pub const fn is_transient(self) -> bool {
        !matches!(self, Self::Configuration)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::Configuration => "invalid configuration",
            Self::Other => "generic",
        };
        f.write_str(name)
    }
}

/// Coarse classification used by callers to pick retry, abort, or report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected before any work was done
    Validation,
    /// Provider failure that may clear up on retry
    ProviderTransient,
    /// Provider failure that retrying cannot fix
    ProviderConfiguration,
    /// Referenced document does not exist or has nothing to search
    NotFound,
    /// Local failure (queue, cache, serialization, IO)
    Internal,
}

/// Error types for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Document or question is empty
    #[error("empty document: {0}")]
    EmptyDocument(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Document missing from the store, or missing chunks
    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding dimension mismatch
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Embedding or generation provider failure
    #[error("{kind} provider error: {message}")]
    Provider {
        /// Failure class
        kind: ProviderErrorKind,
        /// Provider supplied detail
        message: String,
    },

    /// Processing of a specific document failed
    #[error("processing document {document_id} failed: {source}")]
    Processing {
        /// Document being processed
        document_id: DocumentId,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Job queue backend error
    #[error("queue error: {0}")]
    Queue(String),

    /// Cache backend error
    #[error("cache error: {0}")]
    Cache(String),

    /// Serialization error (serde_json)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a provider error
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Attach the document being processed to an error
    #[must_use]
    pub fn processing(document_id: DocumentId, source: Error) -> Self {
        Self::Processing {
            document_id,
            source: Box::new(source),
        }
    }

    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyDocument(_) | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Provider { kind, .. } if kind.is_transient() => ErrorKind::ProviderTransient,
            Self::Provider { .. } | Self::DimensionMismatch { .. } => {
                ErrorKind::ProviderConfiguration
            }
            Self::Processing { source, .. } => source.kind(),
            Self::Queue(_) | Self::Cache(_) | Self::Serialization(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the job layer should schedule another attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ProviderTransient
    }

    /// Provider failure class, looking through `Processing` wrappers
    #[must_use]
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            Self::Processing { source, .. } => source.provider_kind(),
            _ => None,
        }
    }
}
