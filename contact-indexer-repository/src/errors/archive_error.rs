//! Archive error types.

use thiserror::Error;

/// Errors that can occur while archiving a raw batch.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The object store rejected or failed the upload.
    #[error("Archive upload to '{key}' failed: {source}")]
    Transport {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// The upload did not complete in time.
    #[error("Archive upload to '{key}' timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },

    /// The batch could not be serialized.
    #[error("Failed to serialize batch for archival: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The object store could not be configured.
    #[error("Archive store configuration error: {0}")]
    Config(String),
}

impl ArchiveError {
    /// Create a transport error for `key`.
    pub fn transport(key: impl Into<String>, source: object_store::Error) -> Self {
        Self::Transport {
            key: key.into(),
            source,
        }
    }
}
