//! Persists raw batches to durable object storage before indexing.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use contact_indexer_repository::{ArchiveError, ArchiveStore};
use contact_indexer_shared::RawBatch;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use crate::run::RunControl;

/// Pause between archive attempts, multiplied by the attempt number.
const ARCHIVE_RETRY_STEP: Duration = Duration::from_millis(250);

/// Writes each batch to the archive store as newline-delimited JSON.
///
/// Keys are `{prefix}/{run_id}/{sequence:06}.jsonl`, so a batch archived
/// twice within a run lands on the same object.
pub struct Archiver {
    store: Arc<dyn ArchiveStore>,
    prefix: String,
    attempts: u32,
    timeout: Duration,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        prefix: impl Into<String>,
        attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            attempts: attempts.max(1),
            timeout,
        }
    }

    /// Object key for `batch`.
    pub fn key_for(&self, batch: &RawBatch) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/{:06}.jsonl", batch.run_id, batch.sequence)
        } else {
            format!("{}/{}/{:06}.jsonl", prefix, batch.run_id, batch.sequence)
        }
    }

    /// Serialize the batch's raw records, one per line.
    pub fn encode(batch: &RawBatch) -> Result<Bytes, ArchiveError> {
        let mut buf = BytesMut::new().writer();
        for record in &batch.records {
            serde_json::to_writer(&mut buf, record)?;
            buf.get_mut().put_u8(b'\n');
        }
        Ok(buf.into_inner().freeze())
    }

    /// Upload the batch and return its archive location.
    ///
    /// Each upload is bounded by the configured timeout. After the last
    /// attempt fails, or when the run stops between attempts, the error of
    /// the latest attempt is returned.
    #[instrument(skip(self, batch, control), fields(sequence = batch.sequence, records = batch.len()))]
    pub async fn archive(
        &self,
        batch: &RawBatch,
        control: &RunControl,
    ) -> Result<String, ArchiveError> {
        let key = self.key_for(batch);
        let data = Self::encode(batch)?;

        let mut attempt = 1;
        loop {
            let error = match timeout(self.timeout, self.store.put(&key, data.clone())).await {
                Ok(Ok(location)) => {
                    debug!(location = %location, attempt, "Batch archived");
                    return Ok(location);
                }
                Ok(Err(e)) => e,
                Err(_) => ArchiveError::Timeout {
                    key: key.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                },
            };

            if attempt >= self.attempts {
                return Err(error);
            }

            warn!(
                attempt,
                max_attempts = self.attempts,
                error = %error,
                "Archive upload failed, retrying"
            );
            tokio::select! {
                _ = control.stopped() => {
                    debug!(attempt, "Run stopped, abandoning archive retries");
                    return Err(error);
                }
                _ = sleep(ARCHIVE_RETRY_STEP * attempt) => {}
            }
            attempt += 1;
        }
    }
}
