//! Batches and their per-batch outcome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{ByteSpan, ContactRecord};

/// A fixed-size group of records cut from the source.
///
/// Immutable once created: the worker handling it only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    /// Run this batch belongs to.
    pub run_id: Uuid,
    /// Monotonically increasing sequence number within the run, starting at 0.
    pub sequence: u64,
    /// Byte range of the source the records were cut from.
    pub span: ByteSpan,
    /// Records in source order.
    pub records: Vec<ContactRecord>,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Key used in the dead-letter set for a record that has no identifier.
    pub fn positional_key(&self, position: usize) -> String {
        format!("batch-{}-record-{}", self.sequence, position)
    }

    /// Key of the record at `position` in the dead-letter set.
    ///
    /// Matches the index key when the record has one, so a record is
    /// reported under the same key whichever stage it failed in.
    pub fn dead_letter_key(&self, position: usize) -> String {
        self.records
            .get(position)
            .and_then(ContactRecord::document_id)
            .unwrap_or_else(|| self.positional_key(position))
    }
}

/// Terminal status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    /// Every document was indexed.
    Succeeded,
    /// Some documents were indexed, the rest were dead-lettered.
    PartiallyFailed,
    /// No document was indexed.
    Failed,
}

/// Why a document ended up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Transient failure; eligible for retry.
    Retriable,
    /// Rejected by the destination; retrying cannot help.
    NonRetriable,
    /// The destination is unusable for the whole run.
    RunFatal,
    /// The batch could not be archived, so it was never indexed.
    Archive,
    /// The run was cancelled before the document reached a terminal state.
    Cancelled,
    /// Batch handling crashed.
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::Retriable => "retriable",
            ErrorClass::NonRetriable => "nonRetriable",
            ErrorClass::RunFatal => "runFatal",
            ErrorClass::Archive => "archive",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A document that did not make it into the index, with its last error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub id: String,
    pub class: ErrorClass,
    pub error: String,
}

impl FailedDocument {
    pub fn new(id: impl Into<String>, class: ErrorClass, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class,
            error: error.into(),
        }
    }
}

/// Outcome of driving one batch to a terminal status.
///
/// Owned and mutated only by the worker handling the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub sequence: u64,
    pub status: BatchStatus,
    /// Bulk-index attempts made so far.
    pub attempts: u32,
    /// Where the raw batch was archived, if archival succeeded.
    pub archive_location: Option<String>,
    pub span: ByteSpan,
    /// Number of records in the batch.
    pub total: usize,
    /// Number of documents indexed.
    pub indexed: usize,
    /// Number of document resubmissions across retries.
    pub retried: usize,
    /// Documents dead-lettered, with their last error class.
    pub failed: Vec<FailedDocument>,
}

impl BatchResult {
    /// Start a result for `batch` with nothing attempted yet.
    pub fn pending(batch: &RawBatch) -> Self {
        Self {
            sequence: batch.sequence,
            status: BatchStatus::Failed,
            attempts: 0,
            archive_location: None,
            span: batch.span,
            total: batch.len(),
            indexed: 0,
            retried: 0,
            failed: Vec::new(),
        }
    }

    /// Result for a batch none of whose documents reached the index.
    pub fn all_failed(batch: &RawBatch, class: ErrorClass, error: impl Into<String>) -> Self {
        let error = error.into();
        let failed = (0..batch.len())
            .map(|position| {
                FailedDocument::new(batch.dead_letter_key(position), class, error.clone())
            })
            .collect();

        Self {
            failed,
            ..Self::pending(batch)
        }
    }

    /// Derive the terminal status from the indexed and failed counts.
    pub fn settle(&mut self) {
        self.status = if self.failed.is_empty() {
            BatchStatus::Succeeded
        } else if self.indexed > 0 {
            BatchStatus::PartiallyFailed
        } else {
            BatchStatus::Failed
        };
    }

    /// True if any document failed because the destination is unusable.
    pub fn hit_run_fatal(&self) -> bool {
        self.failed.iter().any(|f| f.class == ErrorClass::RunFatal)
    }
}
