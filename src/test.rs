#![cfg(test)]

use std::{
    collections::HashMap,
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::{executor, task::noop_waker_ref, FutureExt};

use crate::{
    handle::{waiter_count, Submission},
    Outcome, RequestHandle, WaitError,
};

fn values(entries: &[(&str, u32)]) -> HashMap<String, u32> {
    entries
        .iter()
        .map(|&(key, value)| (key.to_string(), value))
        .collect()
}

#[test]
fn resolve_delivers_value() {
    let handle = RequestHandle::new("a".to_string());
    assert!(!handle.is_done());
    assert_eq!(handle.outcome(), None);

    assert!(handle.resolve(&values(&[("a", 7), ("b", 8)])));

    assert!(handle.is_done());
    assert_eq!(handle.outcome(), Some(Ok(Outcome::Value(7))));
    assert_eq!(executor::block_on(handle.wait(None)), Ok(Outcome::Value(7)));

    // Repeated reads return the same cached result
    assert_eq!(handle.wait_blocking(None), Ok(Outcome::Value(7)));
}

#[test]
fn resolve_without_key_is_not_found() {
    let handle = RequestHandle::new("missing".to_string());
    assert!(handle.resolve(&values(&[("a", 7)])));
    assert_eq!(handle.wait_blocking(None), Ok(Outcome::NotFound));
}

#[test]
fn second_resolve_is_noop() {
    let handle = RequestHandle::new("a".to_string());
    assert!(handle.resolve(&values(&[("a", 1)])));
    assert!(!handle.resolve(&values(&[("a", 2)])));
    assert!(!handle.resolve(&HashMap::new()));

    assert_eq!(handle.wait_blocking(None), Ok(Outcome::Value(1)));
}

#[test]
fn cancel_before_resolve() {
    let handle: RequestHandle<String, u32> = RequestHandle::new("a".to_string());

    assert!(handle.cancel());
    assert!(handle.is_cancelled());
    assert!(handle.is_done());

    // Cancelling again reports that the handle is cancelled
    assert!(handle.cancel());

    assert!(!handle.resolve(&values(&[("a", 1)])));
    assert_eq!(handle.wait_blocking(None), Ok(Outcome::Cancelled));
}

#[test]
fn cancel_after_resolve_fails() {
    let handle = RequestHandle::new("a".to_string());
    handle.resolve(&values(&[("a", 1)]));

    assert!(!handle.cancel());
    assert!(!handle.is_cancelled());
    assert_eq!(handle.wait_blocking(None), Ok(Outcome::Value(1)));
}

#[test]
fn timeout_leaves_handle_pending() {
    let handle = RequestHandle::new("a".to_string());

    let result = handle.wait_blocking(Some(Duration::from_millis(5)));
    assert_eq!(result, Ok(Outcome::Timeout));
    assert!(!handle.is_done());

    // The timed out waiter didn't leave its waker behind
    assert_eq!(waiter_count(&handle), 0);

    handle.resolve(&values(&[("a", 3)]));
    assert_eq!(handle.wait_blocking(Some(Duration::from_millis(5))), Ok(Outcome::Value(3)));
}

#[test]
fn zero_timeout_on_completed_handle_returns_value() {
    let handle = RequestHandle::new("a".to_string());
    handle.resolve(&values(&[("a", 3)]));

    assert_eq!(handle.wait_blocking(Some(Duration::ZERO)), Ok(Outcome::Value(3)));
}

#[test]
fn every_waiter_is_registered_and_released() {
    let handle: RequestHandle<String, u32> = RequestHandle::new("a".to_string());
    let mut ctx = Context::from_waker(noop_waker_ref());

    let mut wait1 = handle.resolution();
    let mut wait2 = handle.resolution();

    assert_eq!(wait1.poll_unpin(&mut ctx), Poll::Pending);
    assert_eq!(wait2.poll_unpin(&mut ctx), Poll::Pending);
    // Re-polling replaces the waker rather than adding another
    assert_eq!(wait1.poll_unpin(&mut ctx), Poll::Pending);
    assert_eq!(waiter_count(&handle), 2);

    drop(wait2);
    assert_eq!(waiter_count(&handle), 1);

    handle.resolve(&values(&[("a", 4)]));
    assert_eq!(waiter_count(&handle), 0);
    assert_eq!(wait1.poll_unpin(&mut ctx), Poll::Ready(Ok(Outcome::Value(4))));
}

#[test]
fn blocked_waiters_are_woken_by_cancel() {
    let handle: RequestHandle<String, u32> = RequestHandle::new("a".to_string());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || handle.wait_blocking(None))
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    assert!(handle.cancel());

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Ok(Outcome::Cancelled));
    }
}

#[test]
fn dropped_submission_abandons_pending_handle() {
    let handle: RequestHandle<String, u32> = RequestHandle::new("a".to_string());

    drop(Submission::new(&handle));

    assert!(handle.is_done());
    assert!(!handle.is_cancelled());
    assert_eq!(handle.wait_blocking(None), Err(WaitError::Abandoned));

    // Abandoned is final, too
    assert!(!handle.resolve(&values(&[("a", 1)])));
    assert!(!handle.cancel());
}

#[test]
fn dropped_submission_after_resolve_changes_nothing() {
    let handle = RequestHandle::new("a".to_string());
    let submission = Submission::new(&handle);

    assert!(submission.resolve(&values(&[("a", 9)])));
    drop(submission);

    assert_eq!(handle.wait_blocking(None), Ok(Outcome::Value(9)));
}
