//! Batchcollector folds many individual "get the value for key X" requests,
//! arriving concurrently from independent callers, into infrequent bulk
//! lookups. Each caller waits on its own [`RequestHandle`]; a single
//! background [`Worker`] groups the queued handles into batches, performs
//! one bulk call per batch, and hands every caller its own result.
//!
//! The typical use is an upstream API that offers a cheap bulk endpoint but
//! rate-limits single lookups, such as fetching click counts for every page
//! shown on a busy blog: without batching, every page view would cost one
//! upstream call.
//!
//! ## Overview
//!
//! A collector is built from two collaborators:
//!
//! - a [`BulkLookup`], which receives a [`KeySet`] of unique keys and
//!   returns a [`ValueMap`] with the keys it could resolve, and
//! - a [`NotFoundNotifier`], which is told about every key the lookup left
//!   out (so that, for instance, a stale record can be unregistered).
//!
//! Both are implemented for closures.
//!
//! ```
//! use std::{collections::HashMap, convert::Infallible, num::NonZeroUsize, time::Duration};
//! use batchcollector::{BatchCollector, CollectorConfig, KeySet, LookupError, Outcome};
//!
//! async fn fetch_clicks(ids: KeySet<String>) -> Result<HashMap<String, u64>, LookupError> {
//!     // one request to the upstream for every id in the set
//!     Ok(ids.filter_values(|id| if id == "gone" { None } else { Some(id.len() as u64) }))
//! }
//!
//! let config = CollectorConfig::new(Duration::from_millis(5), NonZeroUsize::new(50).unwrap());
//! let (collector, _worker) = BatchCollector::<String, u64>::spawn(
//!     config,
//!     fetch_clicks,
//!     |id: &String| -> Result<(), Infallible> { println!("{} is gone", id); Ok(()) },
//! )
//! .unwrap();
//!
//! let page = collector.load(String::from("page-1"));
//! let gone = collector.load(String::from("gone"));
//!
//! assert_eq!(page.wait_blocking(None), Ok(Outcome::Value(6)));
//! assert_eq!(gone.wait_blocking(None), Ok(Outcome::NotFound));
//! ```
//!
//! ## Batching rules
//!
//! The worker idles until a handle is submitted. It then waits for the
//! configured debounce delay to let more handles accumulate, unless the
//! batch reaches `max_batch_size` first, in which case it's dispatched right
//! away. Handles are taken from the queue in submission order; whatever
//! doesn't fit stays queued for the next batch.
//!
//! Keys are de-duplicated before the lookup, so two handles asking for the
//! same key cost one key in the bulk call, and a missing key is reported to
//! the notifier once per batch no matter how many handles asked for it.
//!
//! ## Outcomes
//!
//! Waiting on a handle always ends in one of the [`Outcome`]s: a value, not
//! found, a timeout, or cancelled. A failed or panicking lookup does not
//! produce an error for the caller: every handle in that batch simply
//! resolves as not found, and the worker moves on to the next batch. The
//! only error, [`WaitError::Abandoned`], means the worker itself is gone.
//!
//! Cancellation is cooperative: [`RequestHandle::cancel`] wakes the waiters
//! immediately, and the handle is skipped when its batch is delivered.
//!
//! ## Design notes
//!
//! The worker is runtime-agnostic: [`Worker::run`] is an ordinary future
//! whose only timer is [`futures_timer::Delay`], so it can be spawned on any
//! executor. [`BatchCollector::spawn`] drives it on a dedicated thread.
//!
//! [`futures_timer::Delay`]: https://docs.rs/futures-timer

mod collector;
mod config;
mod counter;
mod data;
mod error;
mod handle;
mod lookup;
mod test;
mod wakerset;

pub use collector::{BatchCollector, Worker};
pub use config::{CollectorConfig, CounterConfig, Settings};
pub use counter::ClickCounter;
pub use data::{KeySet, KeyedEntry, ValueMap};
pub use error::{BoxError, ConfigError, LookupError, SpawnError, WaitError};
pub use handle::{Outcome, RequestHandle, Resolution};
pub use lookup::{BulkLookup, NotFoundNotifier};
