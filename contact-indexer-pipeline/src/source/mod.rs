//! Record sources.
//!
//! A source yields records lazily, one at a time, in a stable order. Each
//! record carries the byte span it was read from so a failed batch can be
//! traced back to the exact region of the input.

use std::path::Path;

use async_trait::async_trait;
use contact_indexer_shared::{ByteSpan, ContactRecord, SourceRecord};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::errors::SourceReadError;

/// A lazy, ordered sequence of contact records.
#[async_trait]
pub trait RecordSource: Send {
    /// Return the next record, or `None` once the source is exhausted.
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceReadError>;
}

/// Reads newline-delimited JSON records from any buffered async reader.
///
/// Blank lines are skipped. A line that does not decode to a record object
/// ends the read with [`SourceReadError::Malformed`].
pub struct JsonLinesSource<R> {
    reader: R,
    offset: u64,
    line: u64,
    buf: String,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a JSON-lines file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceReadError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|source| SourceReadError::Io { offset: 0, source })?;

        info!(path = %path.display(), "Opened record source");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            line: 0,
            buf: String::new(),
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl<R> RecordSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceReadError> {
        loop {
            self.buf.clear();
            let start = self.offset;

            let read = self
                .reader
                .read_line(&mut self.buf)
                .await
                .map_err(|source| SourceReadError::Io {
                    offset: start,
                    source,
                })?;

            if read == 0 {
                debug!(bytes = self.offset, lines = self.line, "Record source exhausted");
                return Ok(None);
            }

            self.offset += read as u64;
            self.line += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            let record: ContactRecord =
                serde_json::from_str(line).map_err(|e| SourceReadError::Malformed {
                    line: self.line,
                    offset: start,
                    message: e.to_string(),
                })?;

            return Ok(Some(SourceRecord {
                record,
                span: ByteSpan::new(start, self.offset),
            }));
        }
    }
}

/// In-memory source over a vector of records.
///
/// Spans are synthesized as if the records had been written one per line
/// in compact JSON.
pub struct IterSource {
    records: std::vec::IntoIter<ContactRecord>,
    offset: u64,
}

impl IterSource {
    pub fn new(records: Vec<ContactRecord>) -> Self {
        Self {
            records: records.into_iter(),
            offset: 0,
        }
    }
}

#[async_trait]
impl RecordSource for IterSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceReadError> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };

        let width = serde_json::to_vec(&record)
            .map(|encoded| encoded.len() as u64 + 1)
            .unwrap_or(1);
        let span = ByteSpan::new(self.offset, self.offset + width);
        self.offset = span.end;

        Ok(Some(SourceRecord { record, span }))
    }
}
