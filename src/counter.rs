//! Click counts for pages, served through a [`BatchCollector`] so that page
//! renders never cost more than one bulk call per debounce window.

use std::{
    fmt::{self, Debug, Formatter},
    hash::Hash,
    time::Duration,
};

use moka::sync::Cache;
use tracing::{debug, error, trace, warn};

use crate::{
    collector::BatchCollector,
    config::CounterConfig,
    error::WaitError,
    handle::{Outcome, RequestHandle},
};

/// Looks up the click count of a single thing. Unknown things count 0, and
/// so does every failure: a missing count must never break a page render.
///
/// With a cache TTL configured, resolved counts (including the 0 of an
/// unknown thing) are kept in a bounded in-memory cache. Entries expire
/// after the TTL and the least useful entries are evicted once the cache
/// holds `cache_capacity` counts.
pub struct ClickCounter<Key> {
    collector: BatchCollector<Key, u64>,
    wait_timeout: Option<Duration>,
    cache: Option<Cache<Key, u64>>,
}

impl<Key: Debug + Hash + Eq + Send + Sync + 'static> Debug for ClickCounter<Key> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickCounter")
            .field("collector", &self.collector)
            .field("wait_timeout", &self.wait_timeout)
            .field(
                "cached_entries",
                &self.cache.as_ref().map_or(0, |cache| cache.entry_count()),
            )
            .finish()
    }
}

impl<Key> ClickCounter<Key>
where
    Key: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(collector: BatchCollector<Key, u64>, config: &CounterConfig) -> Self {
        let cache = config.cache_ttl().map(|ttl| {
            debug!(
                max_capacity = config.cache_capacity(),
                ttl_ms = ttl.as_millis() as u64,
                "click count cache enabled"
            );

            Cache::builder()
                .max_capacity(config.cache_capacity())
                .time_to_live(ttl)
                .build()
        });

        Self {
            collector,
            wait_timeout: config.wait_timeout(),
            cache,
        }
    }

    pub fn collector(&self) -> &BatchCollector<Key, u64> {
        &self.collector
    }

    /// Get the click count for `key`, blocking the current thread until the
    /// batch containing it has been looked up.
    pub fn count(&self, key: Key) -> u64 {
        if let Some(count) = self.cached(&key) {
            return count;
        }

        let handle = self.collector.load(key);
        let result = handle.wait_blocking(self.wait_timeout);
        self.settle(&handle, result)
    }

    /// Async version of [`count`][ClickCounter::count].
    pub async fn count_async(&self, key: Key) -> u64 {
        if let Some(count) = self.cached(&key) {
            return count;
        }

        let handle = self.collector.load(key);
        let result = handle.wait(self.wait_timeout).await;
        self.settle(&handle, result)
    }

    /// Forget the cached count for `key`, if any.
    pub fn invalidate(&self, key: &Key) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
        }
    }

    /// Forget every cached count.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Approximate number of cached counts. Expired and evicted entries are
    /// only subtracted once the cache's housekeeping has run; see
    /// [`run_pending_tasks`][ClickCounter::run_pending_tasks].
    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, |cache| cache.entry_count())
    }

    /// Run the cache's pending expiry and eviction work now.
    pub fn run_pending_tasks(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks();
        }
    }

    fn settle(&self, handle: &RequestHandle<Key, u64>, result: Result<Outcome<u64>, WaitError>) -> u64 {
        let key = handle.key();

        match result {
            Ok(Outcome::Value(count)) => {
                self.remember(key, count);
                count
            }
            Ok(Outcome::NotFound) => {
                self.remember(key, 0);
                0
            }
            Ok(Outcome::Timeout) => {
                warn!(?key, "timed out waiting for click count");
                // Nobody is waiting for it anymore
                handle.cancel();
                0
            }
            Ok(Outcome::Cancelled) => 0,
            Err(err) => {
                error!(?key, error = %err, "failed to get click count");
                0
            }
        }
    }

    fn cached(&self, key: &Key) -> Option<u64> {
        let count = self.cache.as_ref()?.get(key)?;
        trace!(?key, count, "click count served from cache");
        Some(count)
    }

    fn remember(&self, key: &Key, count: u64) {
        if let Some(cache) = &self.cache {
            cache.insert(key.clone(), count);
        }
    }
}
