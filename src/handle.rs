use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    hash::Hash,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use futures::{
    executor,
    future::{self, Either},
};
use futures_timer::Delay;

use crate::{
    data::ValueMap,
    error::WaitError,
    wakerset::{Token, WakerSet},
};

/// The terminal result of waiting on a [`RequestHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome<Value> {
    /// The bulk lookup resolved the key to this value.
    Value(Value),

    /// The batch completed, but the key wasn't part of the lookup result.
    /// This is also the outcome for every handle in a batch whose lookup
    /// failed.
    NotFound,

    /// The wait budget ran out first. The handle itself is still pending and
    /// may be resolved later.
    Timeout,

    /// The handle was cancelled before its batch completed.
    Cancelled,
}

// Once a handle leaves Pending it never changes again; every transition
// goes through `RequestHandle::settle`.
#[derive(Debug)]
enum Status<Value> {
    Pending,
    Completed(Option<Value>),
    Cancelled,
    Abandoned,
}

impl<Value: Clone> Status<Value> {
    fn outcome(&self) -> Option<Result<Outcome<Value>, WaitError>> {
        match self {
            Status::Pending => None,
            Status::Completed(Some(value)) => Some(Ok(Outcome::Value(value.clone()))),
            Status::Completed(None) => Some(Ok(Outcome::NotFound)),
            Status::Cancelled => Some(Ok(Outcome::Cancelled)),
            Status::Abandoned => Some(Err(WaitError::Abandoned)),
        }
    }
}

#[derive(Debug)]
struct State<Value> {
    status: Status<Value>,
    wakers: WakerSet,
}

#[derive(Debug)]
struct Shared<Key, Value> {
    key: Key,
    state: Mutex<State<Value>>,
}

/// A single pending request for the value associated with one key.
///
/// A handle is shared between the caller that created it and the collector
/// that resolves it; cloning it is cheap and every clone observes the same
/// state. The handle is resolved at most once: after it has completed (or
/// been cancelled), further calls to [`resolve`][RequestHandle::resolve] or
/// [`cancel`][RequestHandle::cancel] have no effect, and every wait returns
/// the same cached outcome.
pub struct RequestHandle<Key, Value> {
    shared: Arc<Shared<Key, Value>>,
}

impl<Key, Value> Clone for RequestHandle<Key, Value> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Key: Debug, Value: Debug> Debug for RequestHandle<Key, Value> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("key", &self.shared.key)
            .field("status", &self.lock().status)
            .finish()
    }
}

impl<Key, Value> RequestHandle<Key, Value> {
    /// Create a new, pending handle for `key`. The handle does nothing until
    /// it's submitted to a [`BatchCollector`][crate::BatchCollector].
    pub fn new(key: Key) -> Self {
        Self {
            shared: Arc::new(Shared {
                key,
                state: Mutex::new(State {
                    status: Status::Pending,
                    wakers: WakerSet::default(),
                }),
            }),
        }
    }

    pub fn key(&self) -> &Key {
        &self.shared.key
    }

    // No user code ever runs while this lock is held, and every write to the
    // state is a single assignment, so a poisoned lock still guards a
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, State<Value>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// True once the handle has left the pending state, for any reason.
    pub fn is_done(&self) -> bool {
        !matches!(self.lock().status, Status::Pending)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.lock().status, Status::Cancelled)
    }

    /// Move a pending handle into `status` and wake every waiter. Returns
    /// false, changing nothing, if the handle already left the pending
    /// state.
    fn settle(&self, status: impl FnOnce() -> Status<Value>) -> bool {
        let mut state = self.lock();
        if !matches!(state.status, Status::Pending) {
            return false;
        }

        state.status = status();

        // Wake outside the lock, in case a waker polls the handle inline.
        let mut wakers = mem::take(&mut state.wakers);
        drop(state);
        wakers.wake_all();

        true
    }

    /// Cancel this request. Every waiter is woken with
    /// [`Outcome::Cancelled`]. The handle stays in the collector's queue and
    /// is skipped when its batch is delivered.
    ///
    /// Returns false if the handle had already completed. Cancelling an
    /// already cancelled handle returns true.
    pub fn cancel(&self) -> bool {
        if self.settle(|| Status::Cancelled) {
            return true;
        }

        matches!(self.lock().status, Status::Cancelled)
    }

    /// Called when the collector drops this request without resolving it.
    pub(crate) fn abandon(&self) -> bool {
        self.settle(|| Status::Abandoned)
    }
}

impl<Key, Value> RequestHandle<Key, Value>
where
    Key: Eq + Hash,
    Value: Clone,
{
    /// Deliver the result of a batch to this handle: the handle completes
    /// with its key's value from `values`, or with "not found" if the key is
    /// absent. Calling this on a handle that has already completed, been
    /// cancelled, or been abandoned is a no-op that returns false.
    ///
    /// This is normally only called by the collector's worker.
    pub fn resolve(&self, values: &ValueMap<Key, Value>) -> bool {
        let key = &self.shared.key;
        self.settle(|| Status::Completed(values.get(key).cloned()))
    }

    /// Peek at the outcome without waiting. Returns None while the handle is
    /// still pending.
    pub fn outcome(&self) -> Option<Result<Outcome<Value>, WaitError>> {
        self.lock().status.outcome()
    }

    /// Get a future that completes once this handle leaves the pending
    /// state. It never completes with [`Outcome::Timeout`]. Any number of
    /// these futures can wait on the same handle at once.
    pub fn resolution(&self) -> Resolution<'_, Key, Value> {
        Resolution {
            handle: self,
            token: None,
        }
    }

    /// Wait for this handle to leave the pending state, for at most
    /// `timeout` if one is given. The timeout doesn't change the handle; a
    /// later wait can still observe the eventual result.
    ///
    /// The only error is [`WaitError::Abandoned`]: a key the lookup couldn't
    /// resolve is a normal [`Outcome::NotFound`].
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Outcome<Value>, WaitError> {
        let resolution = self.resolution();

        match timeout {
            None => resolution.await,
            Some(timeout) => match future::select(resolution, Delay::new(timeout)).await {
                Either::Left((result, _delay)) => result,
                Either::Right(((), _resolution)) => Ok(Outcome::Timeout),
            },
        }
    }

    /// Blocking version of [`wait`][RequestHandle::wait]; parks the calling
    /// thread. Don't call this from inside an async task.
    pub fn wait_blocking(&self, timeout: Option<Duration>) -> Result<Outcome<Value>, WaitError> {
        executor::block_on(self.wait(timeout))
    }
}

/// Future returned by [`RequestHandle::resolution`].
pub struct Resolution<'a, Key, Value> {
    handle: &'a RequestHandle<Key, Value>,
    token: Option<Token>,
}

impl<'a, Key, Value: Clone> Future for Resolution<'a, Key, Value> {
    type Output = Result<Outcome<Value>, WaitError>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let handle = this.handle;
        let mut state = handle.lock();

        if let Some(result) = state.status.outcome() {
            if let Some(token) = this.token.take() {
                state.wakers.discard_waker(token);
            }
            return Poll::Ready(result);
        }

        match this.token {
            Some(ref token) => state.wakers.replace_waker(token, ctx.waker()),
            None => this.token = Some(state.wakers.add_waker(ctx.waker().clone())),
        }

        Poll::Pending
    }
}

impl<'a, Key, Value> Drop for Resolution<'a, Key, Value> {
    fn drop(&mut self) {
        // A waiter that gives up (timeout, select) must not leave its waker
        // behind in the handle.
        if let Some(token) = self.token.take() {
            self.handle.lock().wakers.discard_waker(token);
        }
    }
}

impl<'a, Key, Value> Debug for Resolution<'a, Key, Value> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("registered", &self.token.is_some())
            .finish()
    }
}

/// A handle sitting in the collector's queue or in a batch. If it's dropped
/// before the worker resolves it, waiters are woken with
/// [`WaitError::Abandoned`] instead of hanging forever.
pub(crate) struct Submission<Key, Value> {
    handle: RequestHandle<Key, Value>,
}

impl<Key, Value> Submission<Key, Value> {
    pub(crate) fn new(handle: &RequestHandle<Key, Value>) -> Self {
        Self {
            handle: handle.clone(),
        }
    }

    pub(crate) fn key(&self) -> &Key {
        self.handle.key()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl<Key: Eq + Hash, Value: Clone> Submission<Key, Value> {
    pub(crate) fn resolve(&self, values: &ValueMap<Key, Value>) -> bool {
        self.handle.resolve(values)
    }
}

impl<Key, Value> Drop for Submission<Key, Value> {
    fn drop(&mut self) {
        // No-op if the worker already resolved it
        self.handle.abandon();
    }
}

#[cfg(test)]
pub(crate) fn waiter_count<Key, Value>(handle: &RequestHandle<Key, Value>) -> usize {
    handle.lock().wakers.len()
}
