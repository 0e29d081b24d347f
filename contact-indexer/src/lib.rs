//! # Contact Indexer
//!
//! Main library for the contact record indexer.
//!
//! This crate provides the configuration surface and dependency wiring for
//! running an ingestion from a JSON-lines file into the search index.

pub mod config;

pub use config::{Dependencies, Settings};

use contact_indexer_shared::RunStatus;
use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest pipeline error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] contact_indexer_pipeline::IngestError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] contact_indexer_repository::SearchError),

    /// Archive error.
    #[error("Archive error: {0}")]
    ArchiveError(#[from] contact_indexer_repository::ArchiveError),

    /// Report serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

impl From<contact_indexer_pipeline::SourceReadError> for IndexingError {
    fn from(e: contact_indexer_pipeline::SourceReadError) -> Self {
        Self::IngestError(e.into())
    }
}

/// Process exit code for a finished run.
pub fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Succeeded => 0,
        RunStatus::PartiallySucceeded => 2,
        RunStatus::Aborted | RunStatus::Cancelled => 1,
    }
}
