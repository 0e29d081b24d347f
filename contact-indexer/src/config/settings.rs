//! Environment-driven settings for the contact indexer.
//!
//! Resolution is a pure function over a key lookup, so tests can resolve
//! from a map instead of the process environment.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use contact_indexer_pipeline::config::{
    self as pipeline_config, PipelineConfig, MAX_ARCHIVE_ATTEMPTS, MAX_ATTEMPTS_CEILING,
    MAX_BASE_PARALLELISM, MAX_BATCH_SIZE, MAX_QUEUE_DEPTH, MAX_WORKER_MULTIPLIER, MIN_BATCH_SIZE,
    MIN_WORKER_MULTIPLIER,
};
use contact_indexer_repository::opensearch::DEFAULT_INDEX_NAME;
use contact_indexer_repository::{ArchiveStoreConfig, OpenSearchConfig};
use tracing::warn;

use crate::IndexingError;

/// Default AWS region for the archive bucket.
const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default archive bucket.
const DEFAULT_ARCHIVE_BUCKET: &str = "contact-ingest-archive";

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch: OpenSearchConfig,
    pub archive: ArchiveStoreConfig,
    pub pipeline: PipelineConfig,
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_INDEX`: Target index (default: contacts)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: Basic auth, both or neither
    /// - `AWS_REGION`: Archive bucket region (default: us-east-1)
    /// - `ARCHIVE_BUCKET`, `ARCHIVE_PREFIX`, `ARCHIVE_ENDPOINT`: Archive location
    /// - `INGEST_*`: Throughput and retry knobs, clamped into range
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::resolve(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`.
    pub fn resolve<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = var("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string());
        let index = var("OPENSEARCH_INDEX").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string());
        let mut opensearch = OpenSearchConfig::new(url, index);

        match (var("OPENSEARCH_USERNAME"), var("OPENSEARCH_PASSWORD")) {
            (Some(username), Some(password)) => {
                opensearch = opensearch.with_credentials(username, password);
            }
            (None, None) => {}
            _ => {
                return Err(IndexingError::config(
                    "OPENSEARCH_USERNAME and OPENSEARCH_PASSWORD must be set together",
                ))
            }
        }

        let archive_prefix =
            var("ARCHIVE_PREFIX").unwrap_or_else(|| pipeline_config::DEFAULT_ARCHIVE_PREFIX.to_string());
        let archive = ArchiveStoreConfig {
            region: var("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            bucket: var("ARCHIVE_BUCKET").unwrap_or_else(|| DEFAULT_ARCHIVE_BUCKET.to_string()),
            prefix: archive_prefix.clone(),
            endpoint: var("ARCHIVE_ENDPOINT"),
        };

        let defaults = PipelineConfig::default();
        let number = |key: &str, default: u64| parse_or(key, var(key), default);

        let pipeline = PipelineConfig {
            batch_size: bounded(
                "INGEST_BATCH_SIZE",
                parse_or("INGEST_BATCH_SIZE", var("INGEST_BATCH_SIZE"), defaults.batch_size),
                MIN_BATCH_SIZE,
                MAX_BATCH_SIZE,
            ),
            worker_multiplier: bounded(
                "INGEST_WORKER_MULTIPLIER",
                parse_or(
                    "INGEST_WORKER_MULTIPLIER",
                    var("INGEST_WORKER_MULTIPLIER"),
                    defaults.worker_multiplier,
                ),
                MIN_WORKER_MULTIPLIER,
                MAX_WORKER_MULTIPLIER,
            ),
            base_parallelism: bounded(
                "INGEST_BASE_PARALLELISM",
                parse_or(
                    "INGEST_BASE_PARALLELISM",
                    var("INGEST_BASE_PARALLELISM"),
                    defaults.base_parallelism,
                ),
                1,
                MAX_BASE_PARALLELISM,
            ),
            max_attempts: bounded(
                "INGEST_BULK_RETRY_ATTEMPTS",
                parse_or(
                    "INGEST_BULK_RETRY_ATTEMPTS",
                    var("INGEST_BULK_RETRY_ATTEMPTS"),
                    defaults.max_attempts,
                ),
                1,
                MAX_ATTEMPTS_CEILING,
            ),
            retry_base_delay: millis(
                "INGEST_RETRY_BASE_MS",
                number("INGEST_RETRY_BASE_MS", defaults.retry_base_delay.as_millis() as u64),
                1,
            ),
            retry_jitter: bounded(
                "INGEST_RETRY_JITTER",
                parse_or("INGEST_RETRY_JITTER", var("INGEST_RETRY_JITTER"), defaults.retry_jitter),
                0.0,
                1.0,
            ),
            archive_attempts: bounded(
                "INGEST_ARCHIVE_ATTEMPTS",
                parse_or(
                    "INGEST_ARCHIVE_ATTEMPTS",
                    var("INGEST_ARCHIVE_ATTEMPTS"),
                    defaults.archive_attempts,
                ),
                1,
                MAX_ARCHIVE_ATTEMPTS,
            ),
            archive_timeout: millis(
                "INGEST_ARCHIVE_TIMEOUT_MS",
                number("INGEST_ARCHIVE_TIMEOUT_MS", defaults.archive_timeout.as_millis() as u64),
                1,
            ),
            index_timeout: millis(
                "INGEST_INDEX_TIMEOUT_MS",
                number("INGEST_INDEX_TIMEOUT_MS", defaults.index_timeout.as_millis() as u64),
                1,
            ),
            queue_depth: bounded(
                "INGEST_QUEUE_DEPTH",
                parse_or("INGEST_QUEUE_DEPTH", var("INGEST_QUEUE_DEPTH"), defaults.queue_depth),
                1,
                MAX_QUEUE_DEPTH,
            ),
            progress_interval: millis(
                "INGEST_PROGRESS_INTERVAL_MS",
                number(
                    "INGEST_PROGRESS_INTERVAL_MS",
                    defaults.progress_interval.as_millis() as u64,
                ),
                100,
            ),
            archive_prefix,
        };

        Ok(Self {
            opensearch,
            archive,
            pipeline,
        })
    }
}

/// Parse `raw`, falling back to `default` with a warning when it does not parse.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = key, value = %raw, default = %default, "Unparseable value, using default");
            default
        }),
    }
}

/// Clamp `value` into `[min, max]`, warning when it was out of range.
fn bounded<T>(key: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + Display,
{
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };

    if clamped != value {
        warn!(variable = key, value = %value, clamped = %clamped, "Value out of range, clamped");
    }
    clamped
}

fn millis(key: &str, value: u64, min: u64) -> Duration {
    Duration::from_millis(bounded(key, value, min, u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> Result<Settings, IndexingError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::resolve(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(&[]).unwrap();

        assert_eq!(settings.opensearch.url, "http://localhost:9200");
        assert_eq!(settings.opensearch.index, "contacts");
        assert!(settings.opensearch.username.is_none());
        assert_eq!(settings.archive.region, "us-east-1");
        assert_eq!(settings.archive.bucket, "contact-ingest-archive");
        assert_eq!(settings.archive.prefix, "raw-batches");
        assert!(settings.archive.endpoint.is_none());
        assert_eq!(settings.pipeline.batch_size, 7_500);
        assert_eq!(settings.pipeline.worker_multiplier, 2);
        assert_eq!(settings.pipeline.max_attempts, 5);
        assert_eq!(settings.pipeline.retry_base_delay, Duration::from_secs(2));
        assert_eq!(settings.pipeline.retry_jitter, 0.2);
    }

    #[test]
    fn test_overrides() {
        let settings = resolve(&[
            ("OPENSEARCH_URL", "https://search.internal:9200"),
            ("OPENSEARCH_INDEX", "contacts-v2"),
            ("OPENSEARCH_USERNAME", "ingest"),
            ("OPENSEARCH_PASSWORD", "secret"),
            ("ARCHIVE_ENDPOINT", "http://localhost:9000"),
            ("INGEST_BATCH_SIZE", "5000"),
            ("INGEST_BASE_PARALLELISM", "4"),
            ("INGEST_RETRY_BASE_MS", "250"),
        ])
        .unwrap();

        assert_eq!(settings.opensearch.index, "contacts-v2");
        assert_eq!(settings.opensearch.username.as_deref(), Some("ingest"));
        assert_eq!(settings.archive.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(settings.pipeline.batch_size, 5_000);
        assert_eq!(settings.pipeline.pool_size(), 8);
        assert_eq!(settings.pipeline.retry_base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let settings = resolve(&[
            ("INGEST_BATCH_SIZE", "50"),
            ("INGEST_WORKER_MULTIPLIER", "64"),
            ("INGEST_BULK_RETRY_ATTEMPTS", "0"),
            ("INGEST_RETRY_JITTER", "1.5"),
            ("INGEST_QUEUE_DEPTH", "100"),
            ("INGEST_BASE_PARALLELISM", "0"),
        ])
        .unwrap();

        assert_eq!(settings.pipeline.batch_size, 1_000);
        assert_eq!(settings.pipeline.worker_multiplier, 8);
        assert_eq!(settings.pipeline.max_attempts, 1);
        assert_eq!(settings.pipeline.retry_jitter, 1.0);
        assert_eq!(settings.pipeline.queue_depth, 16);
        assert_eq!(settings.pipeline.base_parallelism, 1);

        let settings = resolve(&[("INGEST_BATCH_SIZE", "1000000")]).unwrap();
        assert_eq!(settings.pipeline.batch_size, 20_000);
    }

    #[test]
    fn test_huge_base_parallelism_is_clamped() {
        let settings = resolve(&[
            ("INGEST_BASE_PARALLELISM", "9223372036854775807"),
            ("INGEST_WORKER_MULTIPLIER", "4"),
        ])
        .unwrap();

        let pipeline = settings.pipeline.clamped();
        assert_eq!(pipeline.base_parallelism, MAX_BASE_PARALLELISM);
        assert_eq!(pipeline.pool_size(), 4 * MAX_BASE_PARALLELISM);
        assert_eq!(pipeline.queue_capacity(), 4 * MAX_BASE_PARALLELISM * 2);
    }

    #[test]
    fn test_unparseable_values_fall_back_to_default() {
        let settings = resolve(&[
            ("INGEST_BATCH_SIZE", "lots"),
            ("INGEST_RETRY_BASE_MS", "-5"),
            ("INGEST_RETRY_JITTER", "some"),
        ])
        .unwrap();

        assert_eq!(settings.pipeline.batch_size, 7_500);
        assert_eq!(settings.pipeline.retry_base_delay, Duration::from_secs(2));
        assert_eq!(settings.pipeline.retry_jitter, 0.2);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let settings = resolve(&[("OPENSEARCH_INDEX", "  "), ("INGEST_BATCH_SIZE", "")]).unwrap();
        assert_eq!(settings.opensearch.index, "contacts");
        assert_eq!(settings.pipeline.batch_size, 7_500);
    }

    #[test]
    fn test_half_credentials_rejected() {
        let result = resolve(&[("OPENSEARCH_USERNAME", "ingest")]);
        assert!(matches!(result, Err(IndexingError::ConfigError(_))));

        let result = resolve(&[("OPENSEARCH_PASSWORD", "secret")]);
        assert!(matches!(result, Err(IndexingError::ConfigError(_))));
    }
}
