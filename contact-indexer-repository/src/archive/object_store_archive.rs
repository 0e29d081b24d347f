//! `ArchiveStore` backed by any `object_store::ObjectStore`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info, instrument};

use crate::config::ArchiveStoreConfig;
use crate::errors::ArchiveError;
use crate::interfaces::ArchiveStore;

/// Archive store writing raw batches to an object store.
///
/// # Example
///
/// ```ignore
/// let archive = ObjectStoreArchive::s3(&ArchiveStoreConfig {
///     region: "eu-west-1".to_string(),
///     bucket: "contact-ingest-archive".to_string(),
///     prefix: "raw-batches".to_string(),
///     endpoint: None,
/// })?;
/// let location = archive.put("raw-batches/run/000000.jsonl", bytes).await?;
/// ```
pub struct ObjectStoreArchive {
    store: Arc<dyn ObjectStore>,
    /// Prepended to keys to form the returned location, e.g. `s3://bucket`.
    root: String,
}

impl ObjectStoreArchive {
    /// Wrap an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Create an archive backed by S3 (or an S3-compatible endpoint).
    ///
    /// Credentials are taken from the standard `AWS_*` environment variables.
    pub fn s3(config: &ArchiveStoreConfig) -> Result<Self, ArchiveError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(&config.region)
            .with_bucket_name(&config.bucket);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| ArchiveError::Config(e.to_string()))?;

        info!(
            region = %config.region,
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            "Created S3 archive store"
        );

        Ok(Self::new(Arc::new(store), format!("s3://{}", config.bucket)))
    }

    /// Create an archive that keeps objects in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    /// The underlying object store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn location(&self, key: &str) -> String {
        if self.root.ends_with('/') {
            format!("{}{}", self.root, key)
        } else {
            format!("{}/{}", self.root, key)
        }
    }
}

#[async_trait]
impl ArchiveStore for ObjectStoreArchive {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<String, ArchiveError> {
        let path = Path::from(key);

        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| ArchiveError::transport(key, e))?;

        let location = self.location(key);
        debug!(location = %location, "Archived object");
        Ok(location)
    }
}
