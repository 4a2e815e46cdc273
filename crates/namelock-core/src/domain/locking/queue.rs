//! Per-name FIFO queues of pending acquisition requests

use super::callback::{AcquiredCallback, ExpiredCallback, TimeoutCallback};
use super::types::{Deadline, LockId, LockInfo, LockResult, RequestId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A request to acquire a named lock.
///
/// Every field except the name is optional. Without `max_wait` the request
/// waits until the name is free; without `hold` the acquired lock is kept
/// until released.
pub struct LockRequest {
    pub(crate) name: String,
    pub(crate) max_wait: Option<Duration>,
    pub(crate) hold: Option<Duration>,
    pub(crate) on_acquired: Option<AcquiredCallback>,
    pub(crate) on_timeout: Option<TimeoutCallback>,
    pub(crate) on_expired: Option<ExpiredCallback>,
}

impl LockRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_wait: None,
            hold: None,
            on_acquired: None,
            on_timeout: None,
            on_expired: None,
        }
    }

    /// Give up after waiting this long
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Auto-release the lock this long after it is acquired
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn on_acquired(mut self, f: impl FnOnce(LockId) + Send + 'static) -> Self {
        self.on_acquired = Some(Box::new(f));
        self
    }

    pub fn on_timeout(mut self, f: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(f));
        self
    }

    /// Called only when the lock is released by expiry, never on explicit release
    pub fn on_expired(mut self, f: impl FnOnce(LockInfo) + Send + 'static) -> Self {
        self.on_expired = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRequest")
            .field("name", &self.name)
            .field("max_wait", &self.max_wait)
            .field("hold", &self.hold)
            .field("on_acquired", &self.on_acquired.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_expired", &self.on_expired.is_some())
            .finish()
    }
}

/// Outcome delivered to a request's handle when the lock is granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Grant {
    pub lock_id: LockId,
    /// An `on_acquired` callback received the id and owns the lock
    pub owned_by_callback: bool,
}

pub(crate) type Completion = oneshot::Sender<LockResult<Grant>>;

/// A queued request, owned by the waiter queue until it resolves
pub(crate) struct WaitRequest {
    pub id: RequestId,
    pub name: String,
    pub deadline: Deadline,
    pub submitted_at: Instant,
    pub hold: Option<Duration>,
    pub on_acquired: Option<AcquiredCallback>,
    pub on_timeout: Option<TimeoutCallback>,
    pub on_expired: Option<ExpiredCallback>,
    pub completion: Option<Completion>,
    /// Set once the scheduler has looked at this request as queue head
    pub attempted: bool,
}

impl WaitRequest {
    pub fn from_request(
        id: RequestId,
        request: LockRequest,
        now: Instant,
        completion: Completion,
    ) -> Self {
        Self {
            id,
            deadline: Deadline::after(now, request.max_wait),
            name: request.name,
            submitted_at: now,
            hold: request.hold,
            on_acquired: request.on_acquired,
            on_timeout: request.on_timeout,
            on_expired: request.on_expired,
            completion: Some(completion),
            attempted: false,
        }
    }

    /// Nobody would observe the outcome: no callbacks and the handle is gone.
    pub fn is_abandoned(&self) -> bool {
        self.on_acquired.is_none()
            && self.on_timeout.is_none()
            && self.completion.as_ref().is_none_or(|tx| tx.is_closed())
    }

    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }
}

impl fmt::Debug for WaitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deadline", &self.deadline)
            .field("hold", &self.hold)
            .finish_non_exhaustive()
    }
}

/// FIFO queue per lock name. Empty queues are pruned.
#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    queues: HashMap<String, VecDeque<WaitRequest>>,
    next_id: u64,
}

impl WaiterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_request_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    pub fn push(&mut self, request: WaitRequest) {
        self.queues
            .entry(request.name.clone())
            .or_default()
            .push_back(request);
    }

    /// Names with at least one waiter, in a stable order for one pass
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub fn head(&self, name: &str) -> Option<&WaitRequest> {
        self.queues.get(name).and_then(|q| q.front())
    }

    pub fn head_mut(&mut self, name: &str) -> Option<&mut WaitRequest> {
        self.queues.get_mut(name).and_then(|q| q.front_mut())
    }

    pub fn pop_head(&mut self, name: &str) -> Option<WaitRequest> {
        let queue = self.queues.get_mut(name)?;
        let head = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(name);
        }
        head
    }

    /// Remove a specific request wherever it sits in its name's queue.
    pub fn remove(&mut self, name: &str, id: RequestId) -> Option<WaitRequest> {
        let queue = self.queues.get_mut(name)?;
        let position = queue.iter().position(|r| r.id == id)?;
        let removed = queue.remove(position);
        if queue.is_empty() {
            self.queues.remove(name);
        }
        removed
    }

    pub fn len(&self, name: &str) -> usize {
        self.queues.get(name).map_or(0, VecDeque::len)
    }

    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn waiting_names(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn drain_all(&mut self) -> Vec<WaitRequest> {
        self.queues
            .drain()
            .flat_map(|(_, queue)| queue.into_iter())
            .collect()
    }
}
