//! Collector and counter configuration, loadable from TOML:
//!
//! ```toml
//! [collector]
//! debounce_ms = 500
//! max_batch_size = 30
//! worker_name = "click count collector"
//!
//! [counter]
//! wait_timeout_ms = 5000
//! cache_ttl_ms = 60000
//! cache_capacity = 10000
//! ```

use std::{fs, num::NonZeroUsize, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_MAX_BATCH_SIZE: usize = 30;
const DEFAULT_WORKER_NAME: &str = "click count collector";
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Batching rules for a [`BatchCollector`][crate::BatchCollector].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// How long the worker waits after the first queued request before it
    /// dispatches a batch, to let more requests pile up. 0 dispatches
    /// immediately.
    pub debounce_ms: u64,

    /// Maximum number of requests in one batch. A batch that fills up during
    /// the debounce window is dispatched right away.
    pub max_batch_size: NonZeroUsize,

    /// Thread name used by [`BatchCollector::spawn`][crate::BatchCollector::spawn].
    pub worker_name: String,
}

impl CollectorConfig {
    pub fn new(debounce_delay: Duration, max_batch_size: NonZeroUsize) -> Self {
        Self {
            debounce_ms: debounce_delay.as_millis().try_into().unwrap_or(u64::MAX),
            max_batch_size,
            ..Self::default()
        }
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_batch_size: NonZeroUsize::new(DEFAULT_MAX_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            worker_name: DEFAULT_WORKER_NAME.to_owned(),
        }
    }
}

/// Settings for a [`ClickCounter`][crate::ClickCounter]. Both features are off
/// unless configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterConfig {
    /// Give up waiting for a count after this long, reporting 0.
    pub wait_timeout_ms: Option<u64>,

    /// Remember resolved counts for this long.
    pub cache_ttl_ms: Option<u64>,

    /// Most counts kept in the cache at once. Only used with a TTL.
    pub cache_capacity: Option<u64>,
}

impl CounterConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }

    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY)
    }
}

/// Top level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub collector: CollectorConfig,
    pub counter: CounterConfig,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;

        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.collector.debounce_delay(), Duration::from_millis(500));
        assert_eq!(settings.collector.max_batch_size.get(), 30);
        assert_eq!(settings.counter.wait_timeout(), None);
        assert_eq!(settings.counter.cache_capacity(), 10_000);
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [collector]
            debounce_ms = 0
            max_batch_size = 5
            worker_name = "flattr"

            [counter]
            wait_timeout_ms = 250
            cache_ttl_ms = 10000
            cache_capacity = 250
            "#,
        )
        .unwrap();

        assert_eq!(settings.collector.debounce_delay(), Duration::ZERO);
        assert_eq!(settings.collector.max_batch_size.get(), 5);
        assert_eq!(settings.collector.worker_name, "flattr");
        assert_eq!(settings.counter.wait_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.counter.cache_ttl(), Some(Duration::from_secs(10)));
        assert_eq!(settings.counter.cache_capacity(), 250);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = Settings::from_toml_str("[collector]\nmax_batch_size = 0\n");
        assert!(matches!(result, Err(ConfigError::Parse(..))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = Settings::from_toml_str("[collector]\ndelay = 10\n");
        assert!(matches!(result, Err(ConfigError::Parse(..))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::from_path(dir.path().join("collector.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        fs::write(&path, "[collector]\nmax_batch_size = 2\n").unwrap();

        let settings = Settings::from_path(&path).unwrap();
        assert_eq!(settings.collector.max_batch_size.get(), 2);
    }
}
