//! # Contact Indexer Repository
//!
//! This crate provides traits and implementations for the two external
//! collaborators of the ingestion pipeline: the search engine's bulk API and
//! the object store that archives raw batches. It includes definitions for
//! errors, interfaces, and concrete implementations for OpenSearch and any
//! `object_store` backend (S3 in production, in-memory in tests).

pub mod archive;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use archive::ObjectStoreArchive;
pub use config::{ArchiveStoreConfig, OpenSearchConfig};
pub use errors::{ArchiveError, SearchError};
pub use interfaces::{ArchiveStore, BulkIndexClient};
pub use opensearch::OpenSearchClient;
pub use types::{DocumentOutcome, ItemError};
