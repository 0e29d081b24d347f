//! Test doubles shared by the pipeline's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use contact_indexer_repository::{
    ArchiveError, ArchiveStore, BulkIndexClient, DocumentOutcome, SearchError,
};
use contact_indexer_shared::{ByteSpan, ContactDocument, ContactRecord, RawBatch, SourceRecord};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::SourceReadError;
use crate::source::{IterSource, RecordSource};

type Responder =
    Box<dyn Fn(&[ContactDocument]) -> Result<Vec<DocumentOutcome>, SearchError> + Send + Sync>;
type GatePredicate = Box<dyn Fn(&[ContactDocument]) -> bool + Send + Sync>;

/// Records `0..count` with ids `"0"`, `"1"`, ...
pub fn numbered_records(count: usize) -> Vec<ContactRecord> {
    (0..count)
        .map(|i| ContactRecord::new(i.to_string(), format!("Contact {i}")))
        .collect()
}

pub fn raw_batch(sequence: u64, ids: &[&str]) -> RawBatch {
    RawBatch {
        run_id: Uuid::new_v4(),
        sequence,
        span: ByteSpan::new(sequence * 100, sequence * 100 + 100),
        records: ids.iter().map(|id| ContactRecord::new(*id, "Test")).collect(),
    }
}

/// Bulk client whose per-call behaviour is a closure over the submitted documents.
///
/// Documents reported as indexed are stored in an in-memory "index" keyed by id.
pub struct MockBulkClient {
    responder: Responder,
    latency: Option<Duration>,
    gate: Option<(GatePredicate, Arc<Semaphore>)>,
    ensure_error: Option<SearchError>,
    calls: AtomicUsize,
    submitted: Mutex<Vec<Vec<String>>>,
    call_times: Mutex<Vec<Instant>>,
    index: Mutex<HashMap<String, ContactDocument>>,
    writes: Mutex<HashMap<String, usize>>,
}

impl MockBulkClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ContactDocument]) -> Result<Vec<DocumentOutcome>, SearchError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            gate: None,
            ensure_error: None,
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
            index: Mutex::new(HashMap::new()),
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Accepts every document.
    pub fn accepting() -> Self {
        Self::new(|docs| Ok(docs.iter().map(|d| DocumentOutcome::indexed(&d.id)).collect()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Calls matching `predicate` wait for a permit on the returned semaphore.
    pub fn with_gate<P>(mut self, predicate: P) -> (Self, Arc<Semaphore>)
    where
        P: Fn(&[ContactDocument]) -> bool + Send + Sync + 'static,
    {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some((Box::new(predicate), gate.clone()));
        (self, gate)
    }

    pub fn failing_ensure(mut self, error: SearchError) -> Self {
        self.ensure_error = Some(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids submitted on each call, in call order.
    pub fn submitted(&self) -> Vec<Vec<String>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    /// Ids currently present in the mock index, sorted.
    pub fn indexed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.index.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn document(&self, id: &str) -> Option<ContactDocument> {
        self.index.lock().unwrap().get(id).cloned()
    }

    /// How many times `id` was successfully written.
    pub fn writes(&self, id: &str) -> usize {
        self.writes.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BulkIndexClient for MockBulkClient {
    async fn bulk(&self, documents: &[ContactDocument]) -> Result<Vec<DocumentOutcome>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap()
            .push(documents.iter().map(|d| d.id.clone()).collect());
        self.call_times.lock().unwrap().push(Instant::now());

        if let Some((predicate, gate)) = &self.gate {
            if predicate(documents) {
                gate.acquire().await.unwrap().forget();
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let outcomes = (self.responder)(documents)?;

        let mut index = self.index.lock().unwrap();
        let mut writes = self.writes.lock().unwrap();
        for (doc, outcome) in documents.iter().zip(&outcomes) {
            if outcome.is_success() {
                index.insert(doc.id.clone(), doc.clone());
                *writes.entry(doc.id.clone()).or_default() += 1;
            }
        }

        Ok(outcomes)
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchError> {
        match &self.ensure_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

/// Archive store that fails a fixed number of times before succeeding.
pub struct FlakyArchive {
    failures: usize,
    hang: bool,
    calls: AtomicUsize,
}

impl FlakyArchive {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every upload hangs forever.
    pub fn hanging() -> Self {
        Self {
            failures: 0,
            hang: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for FlakyArchive {
    async fn put(&self, key: &str, _data: Bytes) -> Result<String, ArchiveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if call < self.failures {
            return Err(ArchiveError::Config(format!("injected failure {call}")));
        }
        Ok(format!("mock://{key}"))
    }
}

/// Source that yields records until `fail_at`, then an I/O error.
pub struct FailingSource {
    inner: IterSource,
    remaining: usize,
}

impl FailingSource {
    pub fn new(records: Vec<ContactRecord>, fail_at: usize) -> Self {
        Self {
            inner: IterSource::new(records),
            remaining: fail_at,
        }
    }
}

#[async_trait]
impl RecordSource for FailingSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceReadError> {
        if self.remaining == 0 {
            return Err(SourceReadError::Io {
                offset: 0,
                source: std::io::Error::other("disk went away"),
            });
        }
        self.remaining -= 1;
        self.inner.next_record().await
    }
}
