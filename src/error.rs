//! Error types. Note that a missing value is never an error: a lookup that
//! doesn't know a key simply leaves it out of its result, and the handle
//! resolves to [`Outcome::NotFound`][crate::Outcome::NotFound].

use std::{error::Error as StdError, io, path::PathBuf};

use thiserror::Error;

/// Boxed error type carried by [`LookupError::Failed`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a [`BulkLookup`][crate::BulkLookup]. Either way, every
/// handle in the batch resolves to `NotFound`; the variant only decides how
/// loudly the worker logs it.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The upstream reported that none of the requested keys exist.
    #[error("none of the requested keys could be found")]
    NotFound,

    /// The bulk call could not complete (network, rate limit, bad response).
    #[error("bulk lookup failed: {0}")]
    Failed(#[source] BoxError),
}

impl LookupError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        LookupError::Failed(err.into())
    }
}

/// Error returned from waiting on a [`RequestHandle`][crate::RequestHandle].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The request was dropped from the collector's queue without being
    /// resolved, because the worker is gone.
    #[error("the collector stopped before the request was resolved")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The worker thread could not be started.
#[derive(Debug, Error)]
#[error("failed to spawn collector worker thread: {0}")]
pub struct SpawnError(#[from] pub io::Error);
