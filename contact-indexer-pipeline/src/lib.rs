//! # Contact Indexer Pipeline
//!
//! This crate provides the pipeline that reads contact records from a
//! record source, archives them in batches to object storage and bulk-loads
//! them into the search index.
//!
//! ## Architecture
//!
//! 1. **Source**: Yields raw records lazily, in a stable order
//! 2. **Batcher**: Cuts the record sequence into fixed-size batches
//! 3. **Archiver**: Persists each raw batch before it is indexed
//! 4. **Indexer**: Submits a batch as one bulk request and classifies the outcome
//! 5. **Retry**: Decides whether and when failed documents are resubmitted
//! 6. **Worker**: A fixed pool of tasks driving batches to a terminal status
//! 7. **Orchestrator**: Owns the run, dispatches batches and builds the report

pub mod archiver;
pub mod batcher;
pub mod config;
pub mod errors;
pub mod indexer;
pub mod orchestrator;
pub mod retry;
pub mod run;
pub mod source;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PipelineConfig;
pub use errors::{IngestError, SourceReadError};
pub use orchestrator::Coordinator;
pub use run::ProgressHandle;
pub use source::{IterSource, JsonLinesSource, RecordSource};
