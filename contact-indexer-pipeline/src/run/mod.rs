//! Per-run state shared between the coordinator and the workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contact_indexer_shared::{BatchResult, DeadLetter, RunProgress, RunReport, RunSettings, RunStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::errors::IngestError;

/// Live counters of a run, updated by the dispatcher and the workers.
#[derive(Debug, Default)]
pub struct RunCounters {
    records_seen: AtomicU64,
    records_archived: AtomicU64,
    documents_indexed: AtomicU64,
    documents_retried: AtomicU64,
    documents_dead_lettered: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_settled: AtomicU64,
}

/// Read-only view of a run's counters, handed out to callers.
#[derive(Debug, Clone)]
pub struct ProgressHandle(Arc<RunCounters>);

impl ProgressHandle {
    pub fn new(counters: Arc<RunCounters>) -> Self {
        Self(counters)
    }

    pub fn snapshot(&self) -> RunProgress {
        self.0.snapshot()
    }
}

impl RunCounters {
    pub fn add_seen(&self, records: usize) {
        self.records_seen.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn add_archived(&self, records: usize) {
        self.records_archived.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn add_retried(&self, documents: usize) {
        self.documents_retried.fetch_add(documents as u64, Ordering::Relaxed);
    }

    pub fn batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a terminal batch result into the counters.
    pub fn batch_settled(&self, result: &BatchResult) {
        self.documents_indexed
            .fetch_add(result.indexed as u64, Ordering::Relaxed);
        self.documents_dead_lettered
            .fetch_add(result.failed.len() as u64, Ordering::Relaxed);
        self.batches_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunProgress {
        RunProgress {
            records_seen: self.records_seen.load(Ordering::Relaxed),
            records_archived: self.records_archived.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            documents_retried: self.documents_retried.load(Ordering::Relaxed),
            documents_dead_lettered: self.documents_dead_lettered.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_settled: self.batches_settled.load(Ordering::Relaxed),
        }
    }
}

/// Stop signalling for a run.
///
/// `cancel` is the caller's token. `stop` is a child of it that additionally
/// fires when a run-fatal error aborts the run. Workers and the dispatcher
/// only watch `stop`; the reason is recovered through [`RunControl::stop_reason`].
#[derive(Debug)]
pub struct RunControl {
    cancel: CancellationToken,
    stop: CancellationToken,
    fatal: OnceLock<String>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken) -> Self {
        let stop = cancel.child_token();
        Self {
            cancel,
            stop,
            fatal: OnceLock::new(),
        }
    }

    /// Abort the run. The first reason recorded wins.
    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.fatal.set(reason.into());
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once the run is cancelled or aborted.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }

    /// Error recorded against documents left undetermined by a stop.
    pub fn stop_reason(&self) -> IngestError {
        match self.fatal_error() {
            Some(reason) => IngestError::run_fatal(format!("run aborted: {reason}")),
            None => IngestError::Cancelled,
        }
    }
}

/// Identity and timing of a run, finalized into a [`RunReport`].
#[derive(Debug)]
pub struct IngestRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub settings: RunSettings,
}

impl IngestRun {
    pub fn start(settings: RunSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            settings,
        }
    }

    /// Build the final report.
    ///
    /// Batches are ordered by sequence. A run with a fatal error is aborted;
    /// otherwise a cancelled run is cancelled; otherwise the run succeeded,
    /// partially if anything was dead-lettered.
    pub fn finish(
        self,
        mut batches: Vec<BatchResult>,
        counters: RunProgress,
        cancelled: bool,
        fatal_error: Option<String>,
    ) -> RunReport {
        batches.sort_by_key(|b| b.sequence);
        let dead_letters: Vec<DeadLetter> = batches.iter().flat_map(DeadLetter::from_batch).collect();

        let status = if fatal_error.is_some() {
            RunStatus::Aborted
        } else if cancelled {
            RunStatus::Cancelled
        } else if dead_letters.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::PartiallySucceeded
        };

        RunReport {
            run_id: self.run_id,
            status,
            started_at: self.started_at,
            ended_at: Utc::now(),
            settings: self.settings,
            counters,
            batches,
            dead_letters,
            fatal_error,
        }
    }
}

/// Log the counters every `interval` until `done` fires.
pub fn spawn_progress_reporter(
    run_id: Uuid,
    counters: ProgressHandle,
    interval: Duration,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    let progress = counters.snapshot();
                    info!(
                        run_id = %run_id,
                        elapsed_secs = started.elapsed().as_secs(),
                        records_seen = progress.records_seen,
                        records_archived = progress.records_archived,
                        documents_indexed = progress.documents_indexed,
                        documents_retried = progress.documents_retried,
                        documents_dead_lettered = progress.documents_dead_lettered,
                        batches = format!("{}/{}", progress.batches_settled, progress.batches_dispatched),
                        "Ingest progress"
                    );
                }
            }
        }
    })
}
