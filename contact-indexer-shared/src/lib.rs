//! # Contact Indexer Shared
//!
//! Shared types and data structures for the contact indexer system: raw
//! contact records, their indexable projection, batches, per-batch results
//! and the run report handed to operational tooling.

pub mod batch;
pub mod document;
pub mod record;
pub mod report;

pub use batch::{BatchResult, BatchStatus, ErrorClass, FailedDocument, RawBatch};
pub use document::ContactDocument;
pub use record::{ByteSpan, ContactRecord, SourceRecord};
pub use report::{DeadLetter, RunProgress, RunReport, RunSettings, RunStatus};
