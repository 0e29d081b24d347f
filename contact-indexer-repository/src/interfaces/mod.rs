//! Interface definitions for the pipeline's external collaborators.
//!
//! This module defines the abstract `BulkIndexClient` and `ArchiveStore`
//! traits that allow for dependency injection and swappable backends.

mod archive_store;
mod bulk_index_client;

pub use archive_store::ArchiveStore;
pub use bulk_index_client::BulkIndexClient;
