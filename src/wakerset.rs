use std::{collections::HashMap, num::NonZeroUsize, task::Waker};

#[derive(Debug, Eq, PartialEq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    fn duplicate(&self) -> Token {
        Token(self.0)
    }
}

/// Data structure for managing the wakers of every task that is waiting on a
/// single request handle. Unlike a batch driver, a handle has no "driving"
/// task: the worker delivers the result from its own thread, so every parked
/// waker is simply awoken once the handle leaves the pending state.
///
/// Wakers are added to a wakerset; when added, a token associated with the
/// Waker is returned. This token should be associated with a waiting future
/// and can be used to:
/// - replace the waker on subsequent polls
/// - discard the waker from the wakerset when the future is dropped.
///
/// These tokens cannot be cloned or otherwise duplicated; this helps to ensure
/// that their lifespan are correctly associated with a particular future.
#[derive(Debug)]
pub(crate) struct WakerSet {
    wakers: HashMap<Token, Waker>,

    // Tokens are an ever-increasing integer. A handle is resolved exactly
    // once, so there's no chance of running out of these.
    next_token: NonZeroUsize,
}

impl Default for WakerSet {
    fn default() -> Self {
        Self {
            wakers: HashMap::with_capacity(1),
            next_token: NonZeroUsize::MIN,
        }
    }
}

impl WakerSet {
    /// Add a new waker to this set. Return the token associated with this
    /// waker's entry in the set. When the future is re-polled, replace_waker
    /// should be used with this token.
    #[must_use]
    pub(crate) fn add_waker(&mut self, waker: Waker) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.saturating_add(1);

        self.wakers.insert(token.duplicate(), waker);
        token
    }

    /// Update the waker stored under an existing token. The waker is passed
    /// by reference and is set with clone_from because it comes from a
    /// Context and would need to be cloned anyway. If the token is no longer
    /// present (the set was already drained by `wake_all`), the waker is
    /// re-inserted under the same token.
    pub(crate) fn replace_waker(&mut self, token: &Token, waker: &Waker) {
        match self.wakers.get_mut(token) {
            Some(existing) => existing.clone_from(waker),
            None => {
                self.wakers.insert(token.duplicate(), waker.clone());
            }
        }
    }

    /// Discard a waker from this set. Used when a waiting future is dropped
    /// or completes. No-op if the token isn't present.
    pub(crate) fn discard_waker(&mut self, token: Token) {
        self.wakers.remove(&token);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }

    /// Wake every parked waker, leaving the set empty.
    pub(crate) fn wake_all(&mut self) {
        self.wakers.drain().for_each(|(_token, waker)| waker.wake());
    }
}
