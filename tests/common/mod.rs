//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    convert::Infallible,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use batchcollector::{CollectorConfig, KeySet, LookupError, ValueMap};
use futures::future::{self, Ready};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("batchcollector=trace")),
        )
        .with_test_writer()
        .try_init();
}

pub fn config(debounce_ms: u64, max_batch_size: usize) -> CollectorConfig {
    CollectorConfig {
        debounce_ms,
        max_batch_size: NonZeroUsize::new(max_batch_size).unwrap(),
        ..CollectorConfig::default()
    }
}

pub fn known(entries: &[(&str, u64)]) -> HashMap<String, u64> {
    entries
        .iter()
        .map(|&(key, value)| (key.to_string(), value))
        .collect()
}

/// Records every bulk lookup (the keys it was called with, in order) and
/// every not-found notification.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    lookups: Arc<Mutex<Vec<Vec<String>>>>,
    notified: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn record(&self, keys: &KeySet<String>) {
        self.lookups
            .lock()
            .unwrap()
            .push(keys.keys().cloned().collect());
    }

    /// A lookup that resolves the keys present in `known` and leaves out the
    /// rest.
    pub fn lookup(
        &self,
        known: HashMap<String, u64>,
    ) -> impl Fn(KeySet<String>) -> Ready<Result<ValueMap<String, u64>, LookupError>> + Send + 'static
    {
        let recorder = self.clone();

        move |keys: KeySet<String>| {
            recorder.record(&keys);
            future::ready(Ok(keys.filter_values(|key| known.get(key).copied())))
        }
    }

    pub fn notifier(&self) -> impl Fn(&String) -> Result<(), Infallible> + Send + 'static {
        let notified = Arc::clone(&self.notified);

        move |key: &String| {
            notified.lock().unwrap().push(key.clone());
            Ok(())
        }
    }

    pub fn note_missing(&self, key: &str) {
        self.notified.lock().unwrap().push(key.to_string());
    }

    pub fn lookups(&self) -> Vec<Vec<String>> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }
}
