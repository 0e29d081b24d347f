//! Throughput and reliability knobs for a run.
//!
//! Every value is clamped into its supported range by [`PipelineConfig::clamped`],
//! which the coordinator applies before a run starts.

use std::time::Duration;

use contact_indexer_shared::RunSettings;

pub const MIN_BATCH_SIZE: usize = 1_000;
pub const MAX_BATCH_SIZE: usize = 20_000;
pub const DEFAULT_BATCH_SIZE: usize = 7_500;

pub const MIN_WORKER_MULTIPLIER: usize = 1;
pub const MAX_WORKER_MULTIPLIER: usize = 8;
pub const DEFAULT_WORKER_MULTIPLIER: usize = 2;

pub const MAX_BASE_PARALLELISM: usize = 1_024;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const MAX_ATTEMPTS_CEILING: u32 = 20;

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_JITTER: f64 = 0.2;

pub const DEFAULT_ARCHIVE_ATTEMPTS: u32 = 3;
pub const MAX_ARCHIVE_ATTEMPTS: u32 = 10;

pub const DEFAULT_ARCHIVE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_QUEUE_DEPTH: usize = 2;
pub const MAX_QUEUE_DEPTH: usize = 16;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_ARCHIVE_PREFIX: &str = "raw-batches";

/// Clamp a requested batch size into `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// Clamp a requested worker multiplier into `[MIN_WORKER_MULTIPLIER, MAX_WORKER_MULTIPLIER]`.
pub fn clamp_worker_multiplier(requested: usize) -> usize {
    requested.clamp(MIN_WORKER_MULTIPLIER, MAX_WORKER_MULTIPLIER)
}

/// Clamp a requested base parallelism into `[1, MAX_BASE_PARALLELISM]`.
pub fn clamp_base_parallelism(requested: usize) -> usize {
    requested.clamp(1, MAX_BASE_PARALLELISM)
}

/// Number of execution threads available to the process, at least 1.
pub fn default_base_parallelism() -> usize {
    clamp_base_parallelism(
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    )
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per batch.
    pub batch_size: usize,
    /// Multiplier applied to `base_parallelism` to size the worker pool.
    pub worker_multiplier: usize,
    /// Externally supplied concurrency unit.
    pub base_parallelism: usize,
    /// Maximum bulk-index attempts per batch, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub retry_base_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the computed delay.
    pub retry_jitter: f64,
    /// Upload attempts per batch before archival is given up.
    pub archive_attempts: u32,
    /// Timeout of a single archive upload.
    pub archive_timeout: Duration,
    /// Timeout of a single bulk-index call.
    pub index_timeout: Duration,
    /// Queue slots per worker.
    pub queue_depth: usize,
    /// How often progress is logged while a run is active.
    pub progress_interval: Duration,
    /// Key prefix archived batches are written under.
    pub archive_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_multiplier: DEFAULT_WORKER_MULTIPLIER,
            base_parallelism: default_base_parallelism(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_jitter: DEFAULT_RETRY_JITTER,
            archive_attempts: DEFAULT_ARCHIVE_ATTEMPTS,
            archive_timeout: DEFAULT_ARCHIVE_TIMEOUT,
            index_timeout: DEFAULT_INDEX_TIMEOUT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Return a copy with every knob clamped into its supported range.
    pub fn clamped(mut self) -> Self {
        self.batch_size = clamp_batch_size(self.batch_size);
        self.worker_multiplier = clamp_worker_multiplier(self.worker_multiplier);
        self.base_parallelism = clamp_base_parallelism(self.base_parallelism);
        self.max_attempts = self.max_attempts.clamp(1, MAX_ATTEMPTS_CEILING);
        self.retry_base_delay = self.retry_base_delay.max(Duration::from_millis(1));
        self.retry_jitter = if self.retry_jitter.is_finite() {
            self.retry_jitter.clamp(0.0, 1.0)
        } else {
            DEFAULT_RETRY_JITTER
        };
        self.archive_attempts = self.archive_attempts.clamp(1, MAX_ARCHIVE_ATTEMPTS);
        self.archive_timeout = self.archive_timeout.max(Duration::from_millis(1));
        self.index_timeout = self.index_timeout.max(Duration::from_millis(1));
        self.queue_depth = self.queue_depth.clamp(1, MAX_QUEUE_DEPTH);
        self.progress_interval = self.progress_interval.max(Duration::from_millis(100));
        self
    }

    /// Worker pool size: `worker_multiplier × base_parallelism`.
    pub fn pool_size(&self) -> usize {
        self.worker_multiplier.saturating_mul(self.base_parallelism)
    }

    /// Capacity of the batch queue between the dispatcher and the pool.
    pub fn queue_capacity(&self) -> usize {
        self.pool_size().saturating_mul(self.queue_depth)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, multiplier: usize, base_parallelism: usize) -> Self {
        self.worker_multiplier = multiplier;
        self.base_parallelism = base_parallelism;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Snapshot recorded in the run report.
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            batch_size: self.batch_size,
            worker_multiplier: self.worker_multiplier,
            base_parallelism: self.base_parallelism,
            pool_size: self.pool_size(),
            queue_capacity: self.queue_capacity(),
            max_attempts: self.max_attempts,
            retry_base_delay_ms: self.retry_base_delay.as_millis() as u64,
            retry_jitter: self.retry_jitter,
            archive_attempts: self.archive_attempts,
            archive_timeout_ms: self.archive_timeout.as_millis() as u64,
            index_timeout_ms: self.index_timeout.as_millis() as u64,
        }
    }
}
