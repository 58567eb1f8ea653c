//! Configuration for the indexing pipeline.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Default number of documents per upload batch.
const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 100;

/// Default number of uploaded documents between backend commits.
const DEFAULT_UPDATES_BEFORE_COMMIT: usize = 1000;

/// Default number of fan-out workers.
const DEFAULT_WORKER_COUNT: usize = 4;

/// Default per-worker queue capacity.
const DEFAULT_QUEUE_SIZE: usize = 200;

/// Default per-document build timeout in milliseconds.
const DEFAULT_BUILD_TIMEOUT_MILLIS: u64 = 2500;

/// Default number of retries for a transient commit failure.
const DEFAULT_COMMIT_RETRY_LIMIT: u32 = 10;

/// Default delay between commit retries in seconds.
const DEFAULT_COMMIT_RETRY_DELAY_SECS: u64 = 1;

/// Configuration for one indexing pipeline.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Number of documents aggregated into one backend add call.
    pub upload_chunk_size: usize,
    /// Number of uploaded documents that triggers an intermediate commit.
    pub updates_before_commit: usize,
    /// Number of parallel upload workers. Zero is treated as one.
    pub worker_count: usize,
    /// Capacity of each worker's queue; a full queue blocks the producer.
    pub queue_size: usize,
    /// Bound on building a single backend document.
    pub build_timeout: Duration,
    /// How many times a transient commit failure is retried before it
    /// escalates to fatal.
    pub commit_retry_limit: u32,
    /// Fixed delay between commit retries.
    pub commit_retry_delay: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            updates_before_commit: DEFAULT_UPDATES_BEFORE_COMMIT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_size: DEFAULT_QUEUE_SIZE,
            build_timeout: Duration::from_millis(DEFAULT_BUILD_TIMEOUT_MILLIS),
            commit_retry_limit: DEFAULT_COMMIT_RETRY_LIMIT,
            commit_retry_delay: Duration::from_secs(DEFAULT_COMMIT_RETRY_DELAY_SECS),
        }
    }
}

impl IndexerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for unset or invalid values.
    ///
    /// # Environment Variables
    ///
    /// - `INDEXER_UPLOAD_CHUNK_SIZE`: documents per backend add call
    /// - `INDEXER_UPDATES_BEFORE_COMMIT`: documents between commits
    /// - `INDEXER_WORKER_COUNT`: parallel upload workers
    /// - `INDEXER_QUEUE_SIZE`: per-worker queue capacity
    /// - `INDEXER_BUILD_TIMEOUT_MILLIS`: per-document build timeout
    /// - `INDEXER_COMMIT_RETRY_LIMIT`: transient-commit retry budget
    /// - `INDEXER_COMMIT_RETRY_DELAY_SECS`: delay between commit retries
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_chunk_size: env_parse("INDEXER_UPLOAD_CHUNK_SIZE", defaults.upload_chunk_size),
            updates_before_commit: env_parse(
                "INDEXER_UPDATES_BEFORE_COMMIT",
                defaults.updates_before_commit,
            ),
            worker_count: env_parse("INDEXER_WORKER_COUNT", defaults.worker_count),
            queue_size: env_parse("INDEXER_QUEUE_SIZE", defaults.queue_size),
            build_timeout: Duration::from_millis(env_parse(
                "INDEXER_BUILD_TIMEOUT_MILLIS",
                DEFAULT_BUILD_TIMEOUT_MILLIS,
            )),
            commit_retry_limit: env_parse("INDEXER_COMMIT_RETRY_LIMIT", defaults.commit_retry_limit),
            commit_retry_delay: Duration::from_secs(env_parse(
                "INDEXER_COMMIT_RETRY_DELAY_SECS",
                DEFAULT_COMMIT_RETRY_DELAY_SECS,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.upload_chunk_size, 100);
        assert_eq!(config.updates_before_commit, 1000);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_size, 200);
        assert_eq!(config.build_timeout, Duration::from_millis(2500));
        assert_eq!(config.commit_retry_limit, 10);
        assert_eq!(config.commit_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        // Unset variables fall back silently.
        assert_eq!(env_parse("INDEXER_TEST_UNSET_VARIABLE", 17usize), 17);
    }
}
