//! Caller-supplied continuations and their isolated invocation

use super::types::{LockId, LockInfo};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Runs once the lock has been acquired on the caller's behalf
pub type AcquiredCallback = Box<dyn FnOnce(LockId) + Send + 'static>;

/// Runs once the request gave up waiting; receives a human-readable message
pub type TimeoutCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Runs when the reaper releases an expired lock
pub type ExpiredCallback = Box<dyn FnOnce(LockInfo) + Send + 'static>;

/// Invoke a callback so that a panic inside it cannot unwind into the
/// scheduler or reaper. Returns `false` if the callback panicked.
pub(crate) fn invoke_isolated<F: FnOnce()>(kind: &'static str, lock_name: &str, f: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            warn!(
                lock_name = %lock_name,
                callback = kind,
                panic = %panic_message(payload.as_ref()),
                "Lock callback panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
