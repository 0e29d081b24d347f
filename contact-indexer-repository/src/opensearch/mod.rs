//! OpenSearch implementation of the bulk index client.
//!
//! This module provides a concrete implementation of `BulkIndexClient`
//! using OpenSearch as the backend.

mod client;
mod index_config;

pub use client::OpenSearchClient;
pub use index_config::{get_index_settings, DEFAULT_INDEX_NAME};
