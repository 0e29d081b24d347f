//! Orchestrator module for the contact indexer pipeline.
//!
//! Coordinates the batcher, the worker pool and result collection for one
//! ingestion run, and assembles the final report.

use std::sync::Arc;

use contact_indexer_repository::{ArchiveStore, BulkIndexClient};
use contact_indexer_shared::{BatchResult, RawBatch, RunReport};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::archiver::Archiver;
use crate::batcher::Batcher;
use crate::config::PipelineConfig;
use crate::errors::IngestError;
use crate::indexer::{classify_request_error, BulkIndexer};
use crate::retry::RetryPolicy;
use crate::run::{spawn_progress_reporter, IngestRun, ProgressHandle, RunControl, RunCounters};
use crate::source::RecordSource;
use crate::worker::{BatchProcessor, WorkerPool};

/// Runs one ingestion from a record source into the search index.
///
/// The coordinator:
/// - Verifies the destination index before reading anything
/// - Cuts batches and dispatches them to a bounded queue
/// - Stops dispatching on cancellation or on a run-fatal error
/// - Waits for dispatched batches to settle and builds the [`RunReport`]
pub struct Coordinator {
    config: PipelineConfig,
    client: Arc<dyn BulkIndexClient>,
    archive: Arc<dyn ArchiveStore>,
    cancel: CancellationToken,
    counters: Arc<RunCounters>,
}

impl Coordinator {
    /// Create a coordinator. The configuration is clamped into range.
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn BulkIndexClient>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            config: config.clamped(),
            client,
            archive,
            cancel: CancellationToken::new(),
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Cancelling this token stops the run gracefully.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live counters of the run, usable while [`Coordinator::run`] is pending.
    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle::new(self.counters.clone())
    }

    /// Execute the run to completion and return its report.
    ///
    /// Every dispatched batch ends up in the report with a terminal status.
    /// Source errors, a run-fatal destination error and cancellation stop
    /// dispatching; batches already handed to the pool still settle.
    #[instrument(skip_all)]
    pub async fn run<S: RecordSource>(self, source: S) -> RunReport {
        let run = IngestRun::start(self.config.settings());
        let run_id = run.run_id;
        let control = Arc::new(RunControl::new(self.cancel.clone()));

        info!(
            run_id = %run_id,
            batch_size = self.config.batch_size,
            pool_size = self.config.pool_size(),
            queue_capacity = self.config.queue_capacity(),
            max_attempts = self.config.max_attempts,
            "Starting ingest run"
        );

        if let Err(reason) = self.ensure_index().await {
            error!(run_id = %run_id, reason = %reason, "Destination not usable, aborting run");
            return run.finish(Vec::new(), self.counters.snapshot(), false, Some(reason));
        }

        let (queue_tx, queue_rx) = mpsc::channel::<RawBatch>(self.config.queue_capacity());
        let queue = Arc::new(Mutex::new(queue_rx));
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let processor = Arc::new(BatchProcessor::new(
            Archiver::new(
                self.archive.clone(),
                self.config.archive_prefix.clone(),
                self.config.archive_attempts,
                self.config.archive_timeout,
            ),
            BulkIndexer::new(self.client.clone(), self.config.index_timeout),
            RetryPolicy::from_config(&self.config),
            control.clone(),
            self.counters.clone(),
        ));

        let pool = WorkerPool::spawn(
            self.config.pool_size(),
            processor,
            queue.clone(),
            result_tx,
            control.clone(),
        );
        let collector = tokio::spawn(collect_results(result_rx, self.counters.clone()));

        let progress_done = CancellationToken::new();
        let progress = spawn_progress_reporter(
            run_id,
            self.progress(),
            self.config.progress_interval,
            progress_done.clone(),
        );

        let mut batcher = Batcher::new(source, self.config.batch_size, run_id);
        let mut undispatched: Vec<RawBatch> = Vec::new();
        let mut source_error: Option<IngestError> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = control.stopped() => break,
                next = batcher.next_batch() => next,
            };

            let batch = match next {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Record source failed, no further batches");
                    source_error = Some(e.into());
                    break;
                }
            };
            self.counters.add_seen(batch.len());

            let permit = tokio::select! {
                biased;
                _ = control.stopped() => None,
                permit = queue_tx.reserve() => permit.ok(),
            };

            match permit {
                Some(permit) => {
                    permit.send(batch);
                    self.counters.batch_dispatched();
                }
                None => {
                    undispatched.push(batch);
                    break;
                }
            }
        }
        drop(queue_tx);

        info!(
            run_id = %run_id,
            batches = batcher.emitted(),
            stopped = control.is_stopped(),
            "Dispatch finished, waiting for in-flight batches"
        );

        pool.join().await;

        {
            let mut rx = queue.lock().await;
            while let Ok(batch) = rx.try_recv() {
                undispatched.push(batch);
            }
        }

        let mut batches = match collector.await {
            Ok(batches) => batches,
            Err(e) => {
                error!(error = %e, "Result collector failed");
                Vec::new()
            }
        };

        if !undispatched.is_empty() {
            let reason = control.stop_reason();
            warn!(
                run_id = %run_id,
                batches = undispatched.len(),
                class = %reason.class(),
                "Dead-lettering batches that never reached a worker"
            );
            for batch in &undispatched {
                let result = BatchResult::all_failed(batch, reason.class(), reason.detail());
                self.counters.batch_settled(&result);
                batches.push(result);
            }
        }

        progress_done.cancel();
        let _ = progress.await;

        let fatal_error = control
            .fatal_error()
            .map(str::to_string)
            .or_else(|| source_error.map(|e| format!("source read failed: {}", e.detail())));
        let report = run.finish(
            batches,
            self.counters.snapshot(),
            control.is_cancelled(),
            fatal_error,
        );

        info!(
            run_id = %run_id,
            status = ?report.status,
            batches = report.batches.len(),
            indexed = report.counters.documents_indexed,
            dead_lettered = report.dead_letters.len(),
            "Ingest run finished"
        );
        report
    }

    async fn ensure_index(&self) -> Result<(), String> {
        match timeout(self.config.index_timeout, self.client.ensure_index_exists()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!(
                "ensuring index failed: {}",
                classify_request_error(&e).detail()
            )),
            Err(_) => Err(format!(
                "ensuring index timed out after {}ms",
                self.config.index_timeout.as_millis()
            )),
        }
    }
}

async fn collect_results(
    mut results: mpsc::UnboundedReceiver<BatchResult>,
    counters: Arc<RunCounters>,
) -> Vec<BatchResult> {
    let mut batches = Vec::new();
    while let Some(result) = results.recv().await {
        counters.batch_settled(&result);
        batches.push(result);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use contact_indexer_repository::{DocumentOutcome, ObjectStoreArchive, SearchError};
    use contact_indexer_shared::{BatchStatus, ContactRecord, ErrorClass, RunStatus};

    use crate::source::IterSource;
    use crate::testing::{numbered_records, FailingSource, MockBulkClient};

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig::default()
            .with_batch_size(1_000)
            .with_workers(1, workers)
            .with_retry(5, Duration::from_secs(2))
    }

    fn coordinator(client: Arc<MockBulkClient>, workers: usize) -> Coordinator {
        Coordinator::new(config(workers), client, Arc::new(ObjectStoreArchive::in_memory()))
    }

    #[tokio::test]
    async fn test_clean_run_indexes_everything() {
        let client = Arc::new(MockBulkClient::accepting());
        let coordinator = coordinator(client.clone(), 2);
        let progress = coordinator.progress();

        let report = coordinator.run(IterSource::new(numbered_records(2_500))).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        let sizes: Vec<usize> = report.batches.iter().map(|b| b.total).collect();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
        assert!(report.batches.iter().all(|b| b.status == BatchStatus::Succeeded));
        assert!(report.batches.iter().all(|b| b.archive_location.is_some()));
        assert!(report.dead_letters.is_empty());
        assert_eq!(client.indexed_ids().len(), 2_500);

        let counters = progress.snapshot();
        assert_eq!(counters.records_seen, 2_500);
        assert_eq!(counters.records_archived, 2_500);
        assert_eq!(counters.documents_indexed, 2_500);
        assert_eq!(counters.batches_dispatched, 3);
        assert_eq!(counters.batches_settled, 3);
        assert_eq!(report.counters, counters);
    }

    #[tokio::test]
    async fn test_empty_source_succeeds_with_no_batches() {
        let client = Arc::new(MockBulkClient::accepting());

        let report = coordinator(client.clone(), 2).run(IterSource::new(Vec::new())).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(report.batches.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_documents_are_isolated() {
        // Every fifth document is rejected by the mapping.
        let client = Arc::new(MockBulkClient::new(|docs| {
            Ok(docs
                .iter()
                .map(|doc| {
                    let n: usize = doc.id.parse().unwrap();
                    if n % 5 == 0 {
                        DocumentOutcome::failed(&doc.id, 400, "mapper_parsing_exception", "bad field")
                    } else {
                        DocumentOutcome::indexed(&doc.id)
                    }
                })
                .collect())
        }));

        let report = coordinator(client.clone(), 2)
            .run(IterSource::new(numbered_records(1_000)))
            .await;

        assert_eq!(report.status, RunStatus::PartiallySucceeded);
        let batch = report.batch(0).unwrap();
        assert_eq!(batch.status, BatchStatus::PartiallyFailed);
        assert_eq!(batch.indexed, 800);
        assert_eq!(batch.failed.len(), 200);
        assert_eq!(batch.attempts, 1);
        assert_eq!(client.calls(), 1);

        assert_eq!(report.dead_letters.len(), 200);
        assert!(report
            .dead_letters
            .iter()
            .all(|d| d.class == ErrorClass::NonRetriable
                && d.batch_sequence == 0
                && d.archive_location.is_some()));
        assert_eq!(client.indexed_ids().len(), 800);
    }

    #[tokio::test]
    async fn test_records_without_id_are_dead_lettered() {
        let mut records = numbered_records(1_000);
        records[10] = ContactRecord::default();
        let client = Arc::new(MockBulkClient::accepting());

        let report = coordinator(client.clone(), 1).run(IterSource::new(records)).await;

        assert_eq!(report.status, RunStatus::PartiallySucceeded);
        assert_eq!(report.dead_letters.len(), 1);
        assert_eq!(report.dead_letters[0].document_id, "batch-0-record-10");
        assert_eq!(client.indexed_ids().len(), 999);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recover() {
        let failures = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = failures.clone();
        let client = Arc::new(MockBulkClient::new(move |docs| {
            if seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                return Err(SearchError::status(503, "unavailable"));
            }
            Ok(docs.iter().map(|d| DocumentOutcome::indexed(&d.id)).collect())
        }));

        let report = coordinator(client.clone(), 1)
            .run(IterSource::new(numbered_records(1_000)))
            .await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.batches[0].attempts, 3);
        assert_eq!(report.batches[0].retried, 2_000);
        assert_eq!(client.indexed_ids().len(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retriable_subset_is_indexed_exactly_once() {
        // 20% of the first submission is throttled; retries succeed.
        let client = Arc::new(MockBulkClient::new(|docs| {
            Ok(docs
                .iter()
                .map(|doc| {
                    let n: usize = doc.id.parse().unwrap();
                    if docs.len() == 1_000 && n % 5 == 0 {
                        DocumentOutcome::failed(&doc.id, 429, "es_rejected_execution_exception", "busy")
                    } else {
                        DocumentOutcome::indexed(&doc.id)
                    }
                })
                .collect())
        }));

        let report = coordinator(client.clone(), 1)
            .run(IterSource::new(numbered_records(1_000)))
            .await;

        assert_eq!(report.status, RunStatus::Succeeded);
        let submitted = client.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1].len(), 200);
        assert!(submitted[1].iter().all(|id| id.parse::<usize>().unwrap() % 5 == 0));
        assert!((0..1_000).all(|n| client.writes(&n.to_string()) == 1));
        assert_eq!(report.counters.documents_retried, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_batch_dead_letters_with_archive_location() {
        let client = Arc::new(MockBulkClient::new(|_| Err(SearchError::connection("refused"))));

        let report = coordinator(client.clone(), 1)
            .run(IterSource::new(numbered_records(1_000)))
            .await;

        assert_eq!(report.status, RunStatus::PartiallySucceeded);
        let batch = report.batch(0).unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.attempts, 5);
        assert_eq!(client.calls(), 5);

        let location = batch.archive_location.clone().unwrap();
        assert_eq!(report.dead_letters.len(), 1_000);
        assert!(report.dead_letters.iter().all(|d| d.class == ErrorClass::Retriable
            && d.archive_location.as_deref() == Some(location.as_str())));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let client = Arc::new(MockBulkClient::accepting());

        let first = coordinator(client.clone(), 2)
            .run(IterSource::new(numbered_records(1_500)))
            .await;
        let snapshot = client.document("42").unwrap();
        let second = coordinator(client.clone(), 2)
            .run(IterSource::new(numbered_records(1_500)))
            .await;

        assert_eq!(first.status, RunStatus::Succeeded);
        assert_eq!(second.status, RunStatus::Succeeded);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(client.indexed_ids().len(), 1_500);
        assert_eq!(client.writes("42"), 2);
        assert_eq!(client.document("42").unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_missing_index_aborts_before_reading() {
        let client = Arc::new(
            MockBulkClient::accepting().failing_ensure(SearchError::status(403, "forbidden")),
        );

        let report = coordinator(client.clone(), 2)
            .run(IterSource::new(numbered_records(1_000)))
            .await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.fatal_error.unwrap().contains("ensuring index failed"));
        assert!(report.batches.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_fatal_bulk_error_stops_dispatch() {
        let client = Arc::new(MockBulkClient::new(|_| Err(SearchError::status(401, "unauthorized"))));

        let report = coordinator(client.clone(), 1)
            .run(IterSource::new(numbered_records(5_000)))
            .await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.fatal_error.is_some());
        // The failing batch is the only one attempted; the rest never reach the client.
        assert_eq!(client.calls(), 1);
        assert!(report.batches.len() < 5);
        assert!(report
            .dead_letters
            .iter()
            .all(|d| d.class == ErrorClass::RunFatal));
        let sequences: Vec<u64> = report.batches.iter().map(|b| b.sequence).collect();
        let mut sorted = sequences.clone();
        sorted.sort();
        assert_eq!(sequences, sorted);
    }

    #[tokio::test]
    async fn test_source_error_aborts_after_dispatched_batches() {
        let client = Arc::new(MockBulkClient::accepting());

        let report = coordinator(client.clone(), 2)
            .run(FailingSource::new(numbered_records(3_000), 2_400))
            .await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.fatal_error.unwrap().contains("source read failed"));
        assert_eq!(report.batches.len(), 2);
        assert!(report.batches.iter().all(|b| b.status == BatchStatus::Succeeded));
        assert_eq!(client.indexed_ids().len(), 2_000);
    }

    #[tokio::test]
    async fn test_cancellation_settles_in_flight_and_skips_rest() {
        // Batches 2 and 3 block inside the bulk call until released.
        let (client, gate) = MockBulkClient::accepting().with_gate(|docs| {
            let first: usize = docs[0].id.parse().unwrap();
            (2_000..4_000).contains(&first)
        });
        let client = Arc::new(client);
        let coordinator = Coordinator::new(
            config(2).with_batch_size(1_000),
            client.clone(),
            Arc::new(ObjectStoreArchive::in_memory()),
        );
        let cancel = coordinator.cancellation_token();

        let run = tokio::spawn(coordinator.run(IterSource::new(numbered_records(6_000))));

        // Wait until both gated batches are in flight.
        tokio::time::timeout(Duration::from_secs(10), async {
            while client.submitted().iter().filter(|ids| ids[0] == "2000" || ids[0] == "3000").count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        gate.add_permits(2);

        let report = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);

        for sequence in 0..4 {
            let batch = report.batch(sequence).unwrap();
            assert_eq!(batch.status, BatchStatus::Succeeded, "batch {sequence}");
        }

        let attempted: HashSet<String> = client.submitted().into_iter().map(|ids| ids[0].clone()).collect();
        assert!(!attempted.contains("4000"));
        assert!(!attempted.contains("5000"));

        for batch in report.batches.iter().filter(|b| b.sequence >= 4) {
            assert_eq!(batch.status, BatchStatus::Failed);
            assert!(batch.failed.iter().all(|f| f.class == ErrorClass::Cancelled));
        }
        assert!(report
            .dead_letters
            .iter()
            .all(|d| d.class == ErrorClass::Cancelled && d.batch_sequence >= 4));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(MockBulkClient::accepting());
        let coordinator = coordinator(client.clone(), 2);
        coordinator.cancellation_token().cancel();

        let report = coordinator.run(IterSource::new(numbered_records(3_000))).await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(client.calls(), 0);
        assert!(report.batches.is_empty());
    }
}
