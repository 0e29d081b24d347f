//! Bulk indexer.
//!
//! Projects a batch into index documents, submits them as a single bulk
//! request and partitions the per-document outcome into indexed, retriable,
//! rejected and run-fatal subsets.

pub mod classify;

use std::sync::Arc;
use std::time::Duration;

use contact_indexer_repository::BulkIndexClient;
use contact_indexer_shared::{ContactDocument, ErrorClass, FailedDocument, RawBatch};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

pub use classify::{classify_item, classify_request_error};

/// Result of one bulk attempt over a set of documents.
#[derive(Debug, Default)]
pub struct AttemptOutcome {
    /// Documents the destination accepted.
    pub indexed: usize,
    /// Positions (into the submitted slice) that may be retried, with the error.
    pub retry: Vec<(usize, String)>,
    /// Documents rejected for good.
    pub rejected: Vec<FailedDocument>,
    /// Set when the destination is unusable for the rest of the run.
    pub fatal: Option<String>,
}

impl AttemptOutcome {
    fn retry_all(count: usize, error: String) -> Self {
        Self {
            retry: (0..count).map(|i| (i, error.clone())).collect(),
            ..Self::default()
        }
    }

    fn reject_all(documents: &[ContactDocument], class: ErrorClass, error: &str) -> Self {
        Self {
            rejected: documents
                .iter()
                .map(|doc| FailedDocument::new(doc.id.clone(), class, error))
                .collect(),
            ..Self::default()
        }
    }
}

/// Submits documents through a [`BulkIndexClient`] with a per-call timeout.
pub struct BulkIndexer {
    client: Arc<dyn BulkIndexClient>,
    timeout: Duration,
}

impl BulkIndexer {
    pub fn new(client: Arc<dyn BulkIndexClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Project every record of `batch` into an index document.
    ///
    /// Records without an identifier cannot be keyed in the index and come
    /// back as non-retriable failures under their positional key.
    pub fn project(batch: &RawBatch) -> (Vec<ContactDocument>, Vec<FailedDocument>) {
        let mut documents = Vec::with_capacity(batch.len());
        let mut malformed = Vec::new();

        for (position, record) in batch.records.iter().enumerate() {
            match ContactDocument::from_record(record) {
                Some(document) => documents.push(document),
                None => malformed.push(FailedDocument::new(
                    batch.positional_key(position),
                    ErrorClass::NonRetriable,
                    "record has no identifier",
                )),
            }
        }

        (documents, malformed)
    }

    /// Submit `documents` as one bulk request.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn submit(&self, documents: &[ContactDocument]) -> AttemptOutcome {
        if documents.is_empty() {
            return AttemptOutcome::default();
        }

        let outcomes = match timeout(self.timeout, self.client.bulk(documents)).await {
            Err(_) => {
                let error = format!(
                    "bulk request timed out after {}ms",
                    self.timeout.as_millis()
                );
                warn!(error = %error, "Bulk request timed out");
                return AttemptOutcome::retry_all(documents.len(), error);
            }
            Ok(Err(e)) => {
                let classified = classify_request_error(&e);
                warn!(error = %e, class = %classified.class(), "Bulk request failed");
                let detail = classified.detail();
                return match classified.class() {
                    ErrorClass::Retriable => AttemptOutcome::retry_all(documents.len(), detail),
                    ErrorClass::RunFatal => AttemptOutcome {
                        fatal: Some(detail.clone()),
                        ..AttemptOutcome::reject_all(documents, ErrorClass::RunFatal, &detail)
                    },
                    class => AttemptOutcome::reject_all(documents, class, &detail),
                };
            }
            Ok(Ok(outcomes)) => outcomes,
        };

        if outcomes.len() != documents.len() {
            let error = format!(
                "bulk response carried {} items for {} documents",
                outcomes.len(),
                documents.len()
            );
            warn!(error = %error, "Bulk response item count mismatch");
            return AttemptOutcome::retry_all(documents.len(), error);
        }

        let mut result = AttemptOutcome::default();
        for (position, (document, outcome)) in documents.iter().zip(outcomes.iter()).enumerate() {
            if outcome.is_success() {
                result.indexed += 1;
                continue;
            }

            let classified = classify_item(outcome);
            let detail = classified.detail();
            match classified.class() {
                ErrorClass::Retriable => result.retry.push((position, detail)),
                class => {
                    if class == ErrorClass::RunFatal && result.fatal.is_none() {
                        result.fatal = Some(detail.clone());
                    }
                    result
                        .rejected
                        .push(FailedDocument::new(document.id.clone(), class, detail));
                }
            }
        }

        debug!(
            indexed = result.indexed,
            retriable = result.retry.len(),
            rejected = result.rejected.len(),
            "Bulk attempt complete"
        );
        result
    }
}
