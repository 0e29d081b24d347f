//! Error types for the contact indexer pipeline.

use contact_indexer_repository::ArchiveError;
use contact_indexer_shared::ErrorClass;
use thiserror::Error;

/// Errors raised while reading the record source.
#[derive(Error, Debug)]
pub enum SourceReadError {
    /// The underlying reader failed.
    #[error("I/O error reading source at byte {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be decoded as a contact record.
    #[error("Malformed record on line {line} (byte {offset}): {message}")]
    Malformed {
        line: u64,
        offset: u64,
        message: String,
    },
}

/// Errors that can occur in the contact indexer pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The record source failed; no further batches are cut.
    #[error("Source read failed: {0}")]
    SourceRead(#[from] SourceReadError),

    /// A batch could not be archived; fatal to that batch only.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Transient indexing failure, subject to the retry policy.
    #[error("Retriable index error: {0}")]
    RetriableIndex(String),

    /// The destination rejected a document; dead-lettered without retry.
    #[error("Non-retriable index error: {0}")]
    NonRetriableIndex(String),

    /// The destination is unusable for the whole run.
    #[error("Run-fatal error: {0}")]
    RunFatal(String),

    /// The run was cancelled.
    #[error("Run cancelled")]
    Cancelled,
}

impl IngestError {
    /// Create a retriable index error.
    pub fn retriable(msg: impl Into<String>) -> Self {
        Self::RetriableIndex(msg.into())
    }

    /// Create a non-retriable index error.
    pub fn non_retriable(msg: impl Into<String>) -> Self {
        Self::NonRetriableIndex(msg.into())
    }

    /// Create a run-fatal error.
    pub fn run_fatal(msg: impl Into<String>) -> Self {
        Self::RunFatal(msg.into())
    }

    /// Dead-letter class a document failing with this error is recorded under.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RetriableIndex(_) => ErrorClass::Retriable,
            Self::NonRetriableIndex(_) => ErrorClass::NonRetriable,
            Self::RunFatal(_) | Self::SourceRead(_) => ErrorClass::RunFatal,
            Self::Archive(_) => ErrorClass::Archive,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// The error message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::RetriableIndex(msg) | Self::NonRetriableIndex(msg) | Self::RunFatal(msg) => {
                msg.clone()
            }
            Self::SourceRead(e) => e.to_string(),
            Self::Archive(e) => e.to_string(),
            Self::Cancelled => "run cancelled".to_string(),
        }
    }
}
