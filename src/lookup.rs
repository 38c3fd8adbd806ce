//! The two collaborators a collector is built from: the bulk lookup that
//! resolves a whole batch of keys, and the notifier that is told about keys
//! the lookup couldn't resolve.
//!
//! Both are implemented for plain closures, so most users never implement
//! these traits by hand:
//!
//! ```
//! use std::convert::Infallible;
//! use batchcollector::{KeySet, LookupError};
//!
//! let lookup = |keys: KeySet<String>| async move {
//!     Ok::<_, LookupError>(keys.into_values(|key| key.len()))
//! };
//!
//! let notifier = |key: &String| -> Result<(), Infallible> {
//!     println!("{} is gone", key);
//!     Ok(())
//! };
//! ```

use std::{convert::Infallible, fmt::Display, future::Future};

use crate::{
    data::{KeySet, ValueMap},
    error::LookupError,
};

/// Resolves many keys in one round trip. The returned map may leave out any
/// key it couldn't resolve; those handles complete as not found.
///
/// A collector only ever calls its lookup from its single worker, one batch
/// at a time, so implementations need no internal synchronization.
pub trait BulkLookup<Key, Value> {
    type Future: Future<Output = Result<ValueMap<Key, Value>, LookupError>>;

    fn lookup(&self, keys: KeySet<Key>) -> Self::Future;
}

impl<Key, Value, F, Fut> BulkLookup<Key, Value> for F
where
    F: Fn(KeySet<Key>) -> Fut,
    Fut: Future<Output = Result<ValueMap<Key, Value>, LookupError>>,
{
    type Future = Fut;

    #[inline]
    fn lookup(&self, keys: KeySet<Key>) -> Fut {
        self(keys)
    }
}

/// Told about every distinct key in a batch that the lookup didn't resolve,
/// so the owner can react (for instance by unregistering stale records).
/// Errors are logged by the worker and otherwise ignored.
pub trait NotFoundNotifier<Key> {
    type Error: Display;

    fn not_found(&self, key: &Key) -> Result<(), Self::Error>;
}

impl<Key, F, E> NotFoundNotifier<Key> for F
where
    F: Fn(&Key) -> Result<(), E>,
    E: Display,
{
    type Error = E;

    #[inline]
    fn not_found(&self, key: &Key) -> Result<(), E> {
        self(key)
    }
}

/// Ignore missing keys.
impl<Key> NotFoundNotifier<Key> for () {
    type Error = Infallible;

    #[inline]
    fn not_found(&self, _key: &Key) -> Result<(), Infallible> {
        Ok(())
    }
}
