//! Archive store trait definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::ArchiveError;

/// Durable storage for raw batch payloads.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous object.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The storage location, e.g. `s3://bucket/key`
    /// * `Err(ArchiveError)` - If the upload failed
    async fn put(&self, key: &str, data: Bytes) -> Result<String, ArchiveError>;
}
