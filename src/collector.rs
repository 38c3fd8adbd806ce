use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    thread,
    time::Instant,
};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    executor,
    future::{self, Either},
    FutureExt, StreamExt,
};
use futures_timer::Delay;
use tracing::{debug, error, trace, warn};

use crate::{
    config::CollectorConfig,
    data::{KeySet, ValueMap},
    error::{LookupError, SpawnError},
    handle::{RequestHandle, Submission},
    lookup::{BulkLookup, NotFoundNotifier},
};

/// The submitting side of a collector. Any number of threads or tasks can
/// submit [`RequestHandle`]s through it (clones share the same queue); a
/// single [`Worker`] groups the queued handles into batches and resolves
/// them.
///
/// When the last `BatchCollector` clone is dropped, the worker finishes
/// every handle that is still queued and then stops.
pub struct BatchCollector<Key, Value> {
    queue: UnboundedSender<Submission<Key, Value>>,
}

impl<Key, Value> Clone for BatchCollector<Key, Value> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<Key, Value> Debug for BatchCollector<Key, Value> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCollector")
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

impl<Key, Value> BatchCollector<Key, Value> {
    /// Create a collector and the worker that serves it. The worker does
    /// nothing until [`Worker::run`] is driven on some executor; use
    /// [`spawn`][BatchCollector::spawn] to run it on a dedicated thread.
    pub fn new<Lookup, Notifier>(
        config: CollectorConfig,
        lookup: Lookup,
        notifier: Notifier,
    ) -> (Self, Worker<Key, Value, Lookup, Notifier>) {
        let (sender, receiver) = mpsc::unbounded();

        let collector = Self { queue: sender };
        let worker = Worker {
            config,
            queue: receiver,
            lookup,
            notifier,
        };

        (collector, worker)
    }

    /// Queue a handle for the next batch. Never blocks.
    ///
    /// If the worker is gone, the handle is abandoned right away and its
    /// waiters get [`WaitError::Abandoned`][crate::WaitError::Abandoned].
    pub fn submit(&self, handle: &RequestHandle<Key, Value>) {
        if self.queue.unbounded_send(Submission::new(handle)).is_err() {
            warn!("request submitted to a collector whose worker has stopped");
        }
    }

    /// Create a handle for `key`, submit it, and return it for waiting.
    pub fn load(&self, key: Key) -> RequestHandle<Key, Value> {
        let handle = RequestHandle::new(key);
        self.submit(&handle);
        handle
    }

    /// True if the worker has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl<Key, Value> BatchCollector<Key, Value>
where
    Key: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    Value: Clone + Send + 'static,
{
    /// Create a collector and run its worker on a new named thread, which
    /// lives until every collector clone has been dropped.
    pub fn spawn<Lookup, Notifier>(
        config: CollectorConfig,
        lookup: Lookup,
        notifier: Notifier,
    ) -> Result<(Self, thread::JoinHandle<()>), SpawnError>
    where
        Lookup: BulkLookup<Key, Value> + Send + 'static,
        Notifier: NotFoundNotifier<Key> + Send + 'static,
    {
        let name = config.worker_name.clone();
        let (collector, worker) = Self::new(config, lookup, notifier);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || executor::block_on(worker.run()))?;

        Ok((collector, thread))
    }
}

/// The consuming side of a collector: a long-lived loop that waits for
/// queued handles, collects them into a batch, performs one bulk lookup for
/// the batch, and resolves every handle in it.
///
/// The lookup and notifier are only ever called from this loop, one at a
/// time. A failing or panicking lookup or notifier is logged and never ends
/// the loop.
pub struct Worker<Key, Value, Lookup, Notifier> {
    config: CollectorConfig,
    queue: UnboundedReceiver<Submission<Key, Value>>,
    lookup: Lookup,
    notifier: Notifier,
}

impl<Key, Value, Lookup, Notifier> Worker<Key, Value, Lookup, Notifier>
where
    Key: Eq + Hash + Clone + Debug,
    Value: Clone,
    Lookup: BulkLookup<Key, Value>,
    Notifier: NotFoundNotifier<Key>,
{
    /// Run until every [`BatchCollector`] has been dropped and the queue is
    /// empty.
    pub async fn run(mut self) {
        debug!(
            debounce_ms = self.config.debounce_ms,
            max_batch_size = self.config.max_batch_size.get(),
            "collector worker started"
        );

        while let Some(batch) = self.next_batch().await {
            self.dispatch(batch).await;
        }

        debug!("collector worker stopped");
    }

    /// Wait for the next batch of handles. Returns None once the queue is
    /// closed and empty.
    async fn next_batch(&mut self) -> Option<Vec<Submission<Key, Value>>> {
        let max_batch_size = self.config.max_batch_size.get();

        // Idle until the first request shows up
        let first = self.queue.next().await?;
        let mut batch = vec![first];

        // Let more requests accumulate for the debounce window, unless the
        // batch fills up first.
        let window = self.config.debounce_delay();
        if !window.is_zero() {
            let mut delay = Delay::new(window);

            while batch.len() < max_batch_size {
                match future::select(&mut delay, self.queue.next()).await {
                    Either::Left(((), _)) => break,
                    Either::Right((Some(submission), _)) => batch.push(submission),
                    Either::Right((None, _)) => break,
                }
            }
        }

        // Take whatever else is already queued, up to the limit. The rest
        // stays queued for the next batch.
        while batch.len() < max_batch_size {
            match self.queue.next().now_or_never() {
                Some(Some(submission)) => batch.push(submission),
                // Closed, or nothing more is queued right now
                Some(None) | None => break,
            }
        }

        Some(batch)
    }

    async fn dispatch(&self, batch: Vec<Submission<Key, Value>>) {
        let started = Instant::now();
        let keys = KeySet::collect_from(batch.iter().map(Submission::key));

        debug!(
            handles = batch.len(),
            keys = keys.len(),
            cancelled = batch.iter().filter(|s| s.is_cancelled()).count(),
            "dispatching batch"
        );

        let values = self.fetch(keys.clone()).await;

        let mut missing = 0usize;
        for key in keys.missing(&values) {
            missing += 1;
            self.notify(key);
        }

        if missing > 0 {
            debug!(missing, "some keys could not be found");
        }

        // Cancelled handles ignore this
        let resolved = batch
            .iter()
            .filter(|submission| submission.resolve(&values))
            .count();

        trace!(
            resolved,
            found = values.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch delivered"
        );
    }

    /// Perform the bulk lookup. Any failure yields an empty map, so that
    /// every handle in the batch resolves as not found.
    async fn fetch(&self, keys: KeySet<Key>) -> ValueMap<Key, Value> {
        let count = keys.len();
        let lookup = &self.lookup;

        let result = AssertUnwindSafe(async move { lookup.lookup(keys).await })
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(values)) => values,
            Ok(Err(LookupError::NotFound)) => {
                debug!(keys = count, "none of the requested keys could be found");
                ValueMap::new()
            }
            Ok(Err(err)) => {
                error!(keys = count, error = %err, "bulk lookup failed");
                ValueMap::new()
            }
            Err(payload) => {
                error!(
                    keys = count,
                    panic = panic_message(&*payload),
                    "bulk lookup panicked"
                );
                ValueMap::new()
            }
        }
    }

    fn notify(&self, key: &Key) {
        let notifier = &self.notifier;

        match panic::catch_unwind(AssertUnwindSafe(|| notifier.not_found(key))) {
            Ok(Ok(())) => trace!(?key, "notified missing key"),
            Ok(Err(err)) => error!(?key, error = %err, "not-found notifier failed"),
            Err(payload) => error!(
                ?key,
                panic = panic_message(&*payload),
                "not-found notifier panicked"
            ),
        }
    }
}

impl<Key, Value, Lookup, Notifier> Debug for Worker<Key, Value, Lookup, Notifier> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("lookup", &"<lookup>")
            .field("notifier", &"<notifier>")
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
