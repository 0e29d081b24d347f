//! Connection configuration for the repository implementations.

/// Connection settings for the OpenSearch cluster.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Cluster URL, e.g. `http://localhost:9200`.
    pub url: String,
    /// Index (or alias) documents are written to.
    pub index: String,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
}

impl OpenSearchConfig {
    /// Create a config without credentials.
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            username: None,
            password: None,
        }
    }

    /// Set basic auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Settings for the object store raw batches are archived to.
#[derive(Debug, Clone)]
pub struct ArchiveStoreConfig {
    pub region: String,
    pub bucket: String,
    /// Key prefix every archived batch is written under.
    pub prefix: String,
    /// Endpoint override for S3-compatible stores (MinIO, LocalStack).
    pub endpoint: Option<String>,
}
