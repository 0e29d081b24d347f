//! Cuts the record sequence into fixed-size batches.

use contact_indexer_shared::{ByteSpan, RawBatch};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::clamp_batch_size;
use crate::errors::SourceReadError;
use crate::source::RecordSource;

/// Groups records from a [`RecordSource`] into [`RawBatch`]es.
///
/// Every batch except possibly the last holds exactly `batch_size` records.
/// Sequence numbers start at zero and increase by one; concatenating the
/// batches in sequence order reproduces the source order. An exhausted source
/// yields no empty trailing batch.
pub struct Batcher<S> {
    source: S,
    batch_size: usize,
    run_id: Uuid,
    next_sequence: u64,
    exhausted: bool,
}

impl<S: RecordSource> Batcher<S> {
    /// `batch_size` is clamped into the supported range.
    pub fn new(source: S, batch_size: usize, run_id: Uuid) -> Self {
        Self {
            source,
            batch_size: clamp_batch_size(batch_size),
            run_id,
            next_sequence: 0,
            exhausted: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Read up to `batch_size` records and cut them into the next batch.
    ///
    /// A source error is returned as-is; batches already emitted stay valid
    /// and the batcher yields nothing further.
    #[instrument(skip(self), fields(sequence = self.next_sequence))]
    pub async fn next_batch(&mut self) -> Result<Option<RawBatch>, SourceReadError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.batch_size);
        let mut span: Option<ByteSpan> = None;

        while records.len() < self.batch_size {
            match self.source.next_record().await {
                Ok(Some(item)) => {
                    span = Some(span.map_or(item.span, |s| s.union(&item.span)));
                    records.push(item.record);
                }
                Ok(None) => {
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }

        let Some(span) = span else {
            return Ok(None);
        };

        let batch = RawBatch {
            run_id: self.run_id,
            sequence: self.next_sequence,
            span,
            records,
        };
        self.next_sequence += 1;

        debug!(records = batch.len(), start = span.start, end = span.end, "Cut batch");
        Ok(Some(batch))
    }
}
