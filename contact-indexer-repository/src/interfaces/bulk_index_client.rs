//! Bulk index client trait definition.
//!
//! This module defines the abstract interface for bulk indexing operations,
//! allowing for different backend implementations (OpenSearch, mock, etc.).

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::DocumentOutcome;
use contact_indexer_shared::ContactDocument;

/// Abstract interface for the search engine's bulk API.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across worker tasks.
///
/// # Error Handling
///
/// A request that fails as a whole (transport failure, non-success status)
/// returns `Err`. A request the engine processed returns `Ok` with one
/// outcome per submitted document, some of which may be failures.
#[async_trait]
pub trait BulkIndexClient: Send + Sync {
    /// Index multiple documents in a single bulk operation.
    ///
    /// Documents are keyed by their `id`; an existing document with the same
    /// id is replaced.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<DocumentOutcome>)` - One outcome per document, in submission order
    /// * `Err(SearchError)` - If the request failed as a whole
    async fn bulk(&self, documents: &[ContactDocument]) -> Result<Vec<DocumentOutcome>, SearchError>;

    /// Ensure the index exists with proper mappings.
    ///
    /// This should be called before the first bulk request of a run.
    async fn ensure_index_exists(&self) -> Result<(), SearchError>;

    /// Check if the search engine is healthy and reachable.
    async fn health_check(&self) -> Result<bool, SearchError>;
}
