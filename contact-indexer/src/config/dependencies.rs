//! Dependency initialization and wiring for the contact indexer.

use std::sync::Arc;

use contact_indexer_pipeline::Coordinator;
use contact_indexer_repository::{BulkIndexClient, ObjectStoreArchive, OpenSearchClient};
use tracing::info;

use crate::config::Settings;
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured coordinator ready to run.
    pub coordinator: Coordinator,
}

impl Dependencies {
    /// Build the search client, the archive store and the coordinator.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a client cannot be created or OpenSearch is unhealthy
    pub async fn new(settings: &Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch.url,
            index = %settings.opensearch.index,
            bucket = %settings.archive.bucket,
            prefix = %settings.archive.prefix,
            "Initializing dependencies"
        );

        let search_client = OpenSearchClient::new(&settings.opensearch).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch client: {}", e))
        })?;

        let healthy = search_client
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let archive = ObjectStoreArchive::s3(&settings.archive)?;

        info!("Archive store created");

        let coordinator = Coordinator::new(
            settings.pipeline.clone(),
            Arc::new(search_client),
            Arc::new(archive),
        );

        Ok(Self { coordinator })
    }
}
