//! Handle to a queued acquisition request

use super::manager::Inner;
use super::queue::Grant;
use super::types::{LockError, LockId, LockResult, RequestId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A queued lock request.
///
/// Awaiting the handle yields the lock id, or the reason the request did not
/// succeed ([`LockError::Timeout`] or [`LockError::Reset`]). Dropping the
/// handle does not withdraw a request that carries callbacks; those still
/// run. A request without callbacks
/// whose handle is dropped is discarded by the scheduler, and a lock granted
/// to it is released again.
#[must_use = "a timeout without an on_timeout handler is only reported through this handle"]
pub struct PendingLock {
    inner: Arc<Inner>,
    name: String,
    request_id: RequestId,
    rx: oneshot::Receiver<LockResult<Grant>>,
}

impl PendingLock {
    pub(crate) fn new(
        inner: Arc<Inner>,
        name: String,
        request_id: RequestId,
        rx: oneshot::Receiver<LockResult<Grant>>,
    ) -> Self {
        Self {
            inner,
            name,
            request_id,
            rx,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Withdraw the request.
    ///
    /// Returns `true` if the request was still queued. A lock granted to a
    /// request without an `on_acquired` callback is released so it does not
    /// leak. A lock handed to the callback stays with the callback's owner.
    pub fn cancel(mut self) -> bool {
        if self.inner.cancel_request(&self.name, self.request_id) {
            return true;
        }

        if let Ok(Ok(grant)) = self.rx.try_recv() {
            if !grant.owned_by_callback {
                self.inner.release(grant.lock_id);
            }
        }
        false
    }
}

impl Future for PendingLock {
    type Output = LockResult<LockId>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            // the sender only disappears without a value on reset
            .map(|result| {
                result
                    .unwrap_or(Err(LockError::Reset))
                    .map(|grant| grant.lock_id)
            })
    }
}

impl fmt::Debug for PendingLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLock")
            .field("name", &self.name)
            .field("request_id", &self.request_id)
            .finish()
    }
}
