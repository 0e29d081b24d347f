//! Run report types consumed by operational tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchResult, ErrorClass};
use crate::record::ByteSpan;

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Every batch succeeded.
    Succeeded,
    /// The source was fully processed but some documents were dead-lettered.
    PartiallySucceeded,
    /// A run-fatal error stopped dispatch.
    Aborted,
    /// The run was cancelled.
    Cancelled,
}

/// Resolved configuration snapshot a run was executed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSettings {
    pub batch_size: usize,
    pub worker_multiplier: usize,
    pub base_parallelism: usize,
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter: f64,
    pub archive_attempts: u32,
    pub archive_timeout_ms: u64,
    pub index_timeout_ms: u64,
}

/// Point-in-time view of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub records_seen: u64,
    pub records_archived: u64,
    pub documents_indexed: u64,
    pub documents_retried: u64,
    pub documents_dead_lettered: u64,
    pub batches_dispatched: u64,
    pub batches_settled: u64,
}

/// A document retained for manual or automated replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub document_id: String,
    pub batch_sequence: u64,
    /// Archive location of the batch the document came from. `None` only
    /// when archival itself failed; the source span still locates it.
    pub archive_location: Option<String>,
    pub source_span: ByteSpan,
    pub class: ErrorClass,
    pub error: String,
}

impl DeadLetter {
    /// Expand a batch result into one dead letter per failed document.
    pub fn from_batch(result: &BatchResult) -> Vec<DeadLetter> {
        result
            .failed
            .iter()
            .map(|failed| DeadLetter {
                document_id: failed.id.clone(),
                batch_sequence: result.sequence,
                archive_location: result.archive_location.clone(),
                source_span: result.span,
                class: failed.class,
                error: failed.error.clone(),
            })
            .collect()
    }
}

/// Final report of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub settings: RunSettings,
    pub counters: RunProgress,
    /// Terminal results ordered by batch sequence.
    pub batches: Vec<BatchResult>,
    pub dead_letters: Vec<DeadLetter>,
    /// Set when the run was aborted or the source failed.
    pub fatal_error: Option<String>,
}

impl RunReport {
    /// Dead letters of a single batch.
    pub fn dead_letters_for(&self, sequence: u64) -> impl Iterator<Item = &DeadLetter> {
        self.dead_letters
            .iter()
            .filter(move |d| d.batch_sequence == sequence)
    }

    /// Result of a single batch, if it settled.
    pub fn batch(&self, sequence: u64) -> Option<&BatchResult> {
        self.batches.iter().find(|b| b.sequence == sequence)
    }
}
