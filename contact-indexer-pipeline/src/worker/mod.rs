//! Worker pool.
//!
//! A fixed number of tasks pull batches from a shared bounded queue. Each
//! batch is driven by [`BatchProcessor`] through archival, bulk indexing and
//! retries until every one of its documents is indexed or dead-lettered.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use contact_indexer_shared::{BatchResult, ContactDocument, ErrorClass, FailedDocument, RawBatch};
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::archiver::Archiver;
use crate::errors::IngestError;
use crate::indexer::BulkIndexer;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::run::{RunControl, RunCounters};

/// Queue end shared by every worker in the pool.
pub type BatchQueue = Arc<Mutex<mpsc::Receiver<RawBatch>>>;

/// Where the documents of a batch stand.
#[derive(Debug)]
enum BatchState {
    /// About to make attempt `attempt` (1-based).
    Pending {
        attempt: u32,
        documents: Vec<ContactDocument>,
    },
    /// Attempt `attempt` is being submitted.
    InFlight {
        attempt: u32,
        documents: Vec<ContactDocument>,
    },
    /// Attempt `attempt` left these documents retriable.
    Retriable {
        attempt: u32,
        documents: Vec<ContactDocument>,
        error: String,
    },
    /// Every document is indexed or dead-lettered.
    Settled,
}

/// Drives a single batch to its terminal status.
pub struct BatchProcessor {
    archiver: Archiver,
    indexer: BulkIndexer,
    policy: RetryPolicy,
    control: Arc<RunControl>,
    counters: Arc<RunCounters>,
}

impl BatchProcessor {
    pub fn new(
        archiver: Archiver,
        indexer: BulkIndexer,
        policy: RetryPolicy,
        control: Arc<RunControl>,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            archiver,
            indexer,
            policy,
            control,
            counters,
        }
    }

    /// Archive then index `batch`.
    ///
    /// Only documents that failed retriably are resubmitted on a retry. A stop
    /// (cancellation or abort) is observed before each attempt and during the
    /// backoff sleep; an attempt already in flight runs to completion.
    pub async fn process(&self, batch: &RawBatch) -> BatchResult {
        let mut progress = BatchProgress::new(batch);
        self.drive(batch, &mut progress).await;
        progress.finish()
    }

    #[instrument(skip_all, fields(sequence = batch.sequence, records = batch.len()))]
    async fn drive(&self, batch: &RawBatch, progress: &mut BatchProgress) {
        if self.control.is_stopped() {
            let reason = self.control.stop_reason();
            progress.fail_outstanding(reason.class(), &reason.detail());
            return;
        }

        match self.archiver.archive(batch, &self.control).await {
            Ok(location) => {
                self.counters.add_archived(batch.len());
                progress.result.archive_location = Some(location);
            }
            Err(e) => {
                let err = if self.control.is_stopped() {
                    self.control.stop_reason()
                } else {
                    IngestError::from(e)
                };
                error!(error = %err, "Archival failed, skipping indexing for batch");
                progress.fail_outstanding(err.class(), &err.detail());
                return;
            }
        }

        let (documents, malformed) = BulkIndexer::project(batch);
        if !malformed.is_empty() {
            warn!(count = malformed.len(), "Records without identifier dead-lettered");
        }
        progress.result.failed.extend(malformed);

        let mut state = if documents.is_empty() {
            BatchState::Settled
        } else {
            BatchState::Pending {
                attempt: 1,
                documents,
            }
        };

        loop {
            progress.track(&state);
            let result = &mut progress.result;

            state = match state {
                BatchState::Pending { attempt, documents } => {
                    if self.control.is_stopped() {
                        self.dead_letter_stopped(result, documents);
                        BatchState::Settled
                    } else {
                        result.attempts = attempt;
                        if attempt > 1 {
                            result.retried += documents.len();
                            self.counters.add_retried(documents.len());
                        }
                        BatchState::InFlight { attempt, documents }
                    }
                }
                BatchState::InFlight { attempt, documents } => {
                    let outcome = self.indexer.submit(&documents).await;
                    result.indexed += outcome.indexed;
                    result.failed.extend(outcome.rejected);

                    if let Some(reason) = outcome.fatal {
                        error!(attempt, reason = %reason, "Destination unusable, aborting run");
                        let error = format!("run aborted: {reason}");
                        result.failed.extend(outcome.retry.into_iter().map(|(position, _)| {
                            FailedDocument::new(
                                documents[position].id.clone(),
                                ErrorClass::RunFatal,
                                error.clone(),
                            )
                        }));
                        self.control.abort(reason);
                        BatchState::Settled
                    } else if outcome.retry.is_empty() {
                        BatchState::Settled
                    } else {
                        let error = outcome.retry[0].1.clone();
                        let retry: Vec<ContactDocument> = outcome
                            .retry
                            .iter()
                            .map(|(position, _)| documents[*position].clone())
                            .collect();
                        BatchState::Retriable {
                            attempt,
                            documents: retry,
                            error,
                        }
                    }
                }
                BatchState::Retriable {
                    attempt,
                    documents,
                    error,
                } => match self.policy.decide(attempt) {
                    RetryDecision::Exhausted => {
                        warn!(
                            attempt,
                            documents = documents.len(),
                            error = %error,
                            "Retry budget exhausted, dead-lettering documents"
                        );
                        result.failed.extend(documents.into_iter().map(|doc| {
                            FailedDocument::new(doc.id, ErrorClass::Retriable, error.clone())
                        }));
                        BatchState::Settled
                    }
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            attempt,
                            documents = documents.len(),
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying failed documents"
                        );
                        tokio::select! {
                            _ = self.control.stopped() => {
                                self.dead_letter_stopped(result, documents);
                                BatchState::Settled
                            }
                            _ = tokio::time::sleep(delay) => BatchState::Pending {
                                attempt: attempt + 1,
                                documents,
                            },
                        }
                    }
                },
                BatchState::Settled => break,
            };
        }
    }

    fn dead_letter_stopped(&self, result: &mut BatchResult, documents: Vec<ContactDocument>) {
        let reason = self.control.stop_reason();
        let (class, detail) = (reason.class(), reason.detail());
        result.failed.extend(
            documents
                .into_iter()
                .map(|doc| FailedDocument::new(doc.id, class, detail.clone())),
        );
    }
}

/// A batch's result while it is being driven, plus the keys of documents
/// not yet indexed or dead-lettered.
///
/// Lives outside the processing future, so a panic part way through keeps
/// what earlier attempts already settled.
struct BatchProgress {
    result: BatchResult,
    outstanding: Vec<String>,
}

impl BatchProgress {
    fn new(batch: &RawBatch) -> Self {
        Self {
            result: BatchResult::pending(batch),
            outstanding: (0..batch.len()).map(|p| batch.dead_letter_key(p)).collect(),
        }
    }

    fn track(&mut self, state: &BatchState) {
        self.outstanding = match state {
            BatchState::Pending { documents, .. }
            | BatchState::InFlight { documents, .. }
            | BatchState::Retriable { documents, .. } => {
                documents.iter().map(|doc| doc.id.clone()).collect()
            }
            BatchState::Settled => Vec::new(),
        };
    }

    /// Dead-letter every outstanding document under `class`.
    fn fail_outstanding(&mut self, class: ErrorClass, error: &str) {
        self.result.failed.extend(
            self.outstanding
                .drain(..)
                .map(|id| FailedDocument::new(id, class, error)),
        );
    }

    fn finish(mut self) -> BatchResult {
        self.result.settle();
        debug!(
            status = ?self.result.status,
            indexed = self.result.indexed,
            failed = self.result.failed.len(),
            attempts = self.result.attempts,
            "Batch settled"
        );
        self.result
    }
}

/// A fixed set of worker tasks sharing one batch queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers. Each sends one [`BatchResult`] per batch it takes.
    pub fn spawn(
        size: usize,
        processor: Arc<BatchProcessor>,
        queue: BatchQueue,
        results: mpsc::UnboundedSender<BatchResult>,
        control: Arc<RunControl>,
    ) -> Self {
        info!(workers = size, "Starting worker pool");

        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    processor.clone(),
                    queue.clone(),
                    results.clone(),
                    control.clone(),
                ))
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    processor: Arc<BatchProcessor>,
    queue: BatchQueue,
    results: mpsc::UnboundedSender<BatchResult>,
    control: Arc<RunControl>,
) {
    debug!(worker_id, "Worker started");

    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = control.stopped() => None,
                batch = rx.recv() => batch,
            }
        };

        let Some(batch) = next else {
            break;
        };

        let mut progress = BatchProgress::new(&batch);
        let outcome = AssertUnwindSafe(processor.drive(&batch, &mut progress))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(()) => progress.finish(),
            Err(_) => {
                error!(worker_id, sequence = batch.sequence, "Batch processing panicked");
                progress.fail_outstanding(ErrorClass::Internal, "batch processing panicked");
                progress.finish()
            }
        };

        if results.send(result).is_err() {
            warn!(worker_id, "Result channel closed, stopping worker");
            break;
        }
    }

    debug!(worker_id, "Worker stopped");
}
