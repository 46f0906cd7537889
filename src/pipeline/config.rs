//! Configuration types for pipeline runs

use crate::ranges::DEFAULT_BUCKET_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Hostname prefixes of known fake instances inflating directory statistics
pub const DEFAULT_FIXTURE_PREFIXES: &[&str] = &["you-think-your-fake"];

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker tasks (default: 4)
    pub workers: usize,
    /// Hostnames handed to a worker at a time (default: 10)
    pub batch_size: usize,
    /// Keep only the top-N instances by users, 0 for all (default: 30)
    pub limit: usize,
    /// Rows per range-table bucket (default: 1000)
    pub bucket_size: usize,
    /// Directory holding the persisted caches (default: current directory)
    pub cache_dir: PathBuf,
    /// Hostname prefixes skipped without counting as success or failure
    pub fixture_prefixes: Vec<String>,
    /// How often progress is logged while workers run (default: 2s)
    pub progress_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 10,
            limit: 30,
            bucket_size: DEFAULT_BUCKET_SIZE,
            cache_dir: PathBuf::from("."),
            fixture_prefixes: DEFAULT_FIXTURE_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            progress_interval: Duration::from_secs(2),
        }
    }
}

impl PipelineConfig {
    /// Create a new PipelineConfig builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.workers < 1 {
            return Err("workers must be at least 1".to_string());
        }
        if self.batch_size < 1 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.bucket_size < 1 {
            return Err("bucket_size must be at least 1".to_string());
        }
        if self.progress_interval.is_zero() {
            return Err("progress_interval must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Whether `hostname` belongs to a known fake instance
    pub fn is_fixture(&self, hostname: &str) -> bool {
        self.fixture_prefixes
            .iter()
            .any(|prefix| hostname.starts_with(prefix.as_str()))
    }
}

/// Builder for PipelineConfig
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Set the number of worker tasks
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the top-N instance limit (0 for all)
    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    /// Set the range-table bucket size
    pub fn bucket_size(mut self, size: usize) -> Self {
        self.config.bucket_size = size;
        self
    }

    /// Set the cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Replace the fake-instance prefixes
    pub fn fixture_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fixture_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the progress logging interval
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
