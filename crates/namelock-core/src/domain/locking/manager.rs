//! Lock manager for coordinating named locks
//!
//! The lock manager is the single owner of the lock table and the waiter
//! queues. It handles:
//! - Queued acquisition with optional deadlines (served FIFO per name)
//! - Immediate, non-queued acquisition
//! - Auto-release of locks held for a fixed duration
//! - Recovery and reset of the background scheduler and reaper
//!
//! State lives behind one mutex that is held only while state is mutated.
//! User callbacks always run after the mutex has been released.

use super::event::LockEvent;
use super::guard::LockGuard;
use super::pending::PendingLock;
use super::queue::{LockRequest, WaitRequest, WaiterQueue};
use super::table::LockTable;
use super::callback::{ExpiredCallback, TimeoutCallback};
use super::types::{
    LockConfig, LockError, LockId, LockInfo, LockResult, LockStats, LockStatus, RecoveryReport,
    RequestId, as_millis_u64,
};
use super::{reaper, scheduler};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lock manager for coordinating named locks
#[derive(Debug, Clone)]
pub struct LockManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(super) config: LockConfig,
    state: Mutex<State>,
    events: broadcast::Sender<LockEvent>,
    pub(super) scheduler_wake: Notify,
    runtime: Handle,
}

#[derive(Debug)]
pub(super) struct State {
    pub table: LockTable,
    pub queue: WaiterQueue,
    pub scheduler: LoopSlot,
    pub reaper: LoopSlot,
    /// Cancelled by `reset`; every loop task belongs to one generation.
    pub generation: CancellationToken,
}

/// Bookkeeping for one background loop
#[derive(Debug, Default)]
pub(super) struct LoopSlot {
    pub active: bool,
    pub handle: Option<JoinHandle<()>>,
}

impl LoopSlot {
    fn is_running(&self) -> bool {
        self.active && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Mark the loop dormant. Called by the loop itself under the state lock.
    pub fn park(&mut self) {
        self.active = false;
        self.handle = None;
    }
}

impl LockManager {
    /// Create a new lock manager on the current tokio runtime
    pub fn new(config: LockConfig) -> LockResult<Self> {
        let runtime = Handle::try_current().map_err(|_| LockError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Create a lock manager with default configuration
    pub fn with_defaults() -> LockResult<Self> {
        Self::new(LockConfig::default())
    }

    /// Create a lock manager whose background loops run on `runtime`
    pub fn with_runtime(config: LockConfig, runtime: Handle) -> LockResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    table: LockTable::new(),
                    queue: WaiterQueue::new(),
                    scheduler: LoopSlot::default(),
                    reaper: LoopSlot::default(),
                    generation: CancellationToken::new(),
                }),
                events,
                scheduler_wake: Notify::new(),
                runtime,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// Queue a request for `name`.
    ///
    /// `on_acquired` runs with the lock id once the lock is granted. With
    /// `max_wait` set, the request gives up after that long and `on_timeout`
    /// runs instead. A timeout with no `on_timeout` is reported through the
    /// returned handle; if the handle is dropped as well it is logged as an
    /// error.
    pub fn lock(
        &self,
        name: &str,
        on_acquired: impl FnOnce(LockId) + Send + 'static,
        max_wait: Option<Duration>,
        on_timeout: Option<TimeoutCallback>,
    ) -> PendingLock {
        let mut request = LockRequest::new(name).on_acquired(on_acquired);
        request.max_wait = max_wait;
        request.on_timeout = on_timeout;
        self.submit(request)
    }

    /// Wait for `name` indefinitely, then hold it for at most `hold`.
    ///
    /// `on_expired` runs only if the lock is released by expiry.
    pub fn lock_for(
        &self,
        name: &str,
        on_acquired: impl FnOnce(LockId) + Send + 'static,
        hold: Duration,
        on_expired: Option<ExpiredCallback>,
    ) -> PendingLock {
        let mut request = LockRequest::new(name).on_acquired(on_acquired).hold(hold);
        request.on_expired = on_expired;
        self.submit(request)
    }

    /// Queue an acquisition request.
    ///
    /// The acquisition itself is always attempted by the scheduler task,
    /// never on the caller's stack.
    pub fn submit(&self, request: LockRequest) -> PendingLock {
        let (tx, rx) = oneshot::channel();
        let name = request.name.clone();

        let request_id = {
            let mut state = self.inner.state();
            let request_id = state.queue.next_request_id();
            state
                .queue
                .push(WaitRequest::from_request(request_id, request, Instant::now(), tx));
            self.inner.ensure_scheduler(&mut state);
            request_id
        };
        self.inner.scheduler_wake.notify_one();

        debug!(lock_name = %name, request_id = %request_id, "Lock request queued");
        PendingLock::new(self.inner.clone(), name, request_id, rx)
    }

    /// Acquire `name`, waiting at most `max_wait` (None = wait forever).
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn acquire(&self, name: &str, max_wait: Option<Duration>) -> LockResult<LockGuard> {
        let mut request = LockRequest::new(name);
        request.max_wait = max_wait;
        let lock_id = self.submit(request).await?;
        Ok(LockGuard::new(self.inner.clone(), lock_id, name.to_string()))
    }

    /// Acquire `name`, waiting forever, and hold it for at most `hold`.
    pub async fn acquire_for(&self, name: &str, hold: Duration) -> LockResult<LockGuard> {
        let lock_id = self.submit(LockRequest::new(name).hold(hold)).await?;
        Ok(LockGuard::new(self.inner.clone(), lock_id, name.to_string()))
    }

    /// Try to acquire `name` without queuing.
    ///
    /// Fails if the name is held or if other requests are already queued
    /// for it, so a caller can never jump the queue.
    pub fn try_lock(&self, name: &str, hold: Option<Duration>) -> Option<LockId> {
        let lock_id = {
            let mut state = self.inner.state();
            if state.queue.len(name) > 0 {
                return None;
            }
            let lock_id = state.table.acquire(name, hold, None, Instant::now())?;
            self.inner.ensure_reaper(&mut state);
            lock_id
        };

        debug!(lock_name = %name, lock_id = %lock_id, "Lock acquired without queuing");
        self.inner.publish(LockEvent::lock_acquired(name, lock_id, 0));
        Some(lock_id)
    }

    /// Release a lock by ID.
    ///
    /// Releasing an unknown or already released id is a no-op; the return
    /// value tells whether a lock was actually removed.
    pub fn release(&self, lock_id: LockId) -> bool {
        self.inner.release(lock_id)
    }

    /// Push the expiry of a held lock to `hold` from now.
    ///
    /// A zero `hold` makes the lock permanent until released.
    pub fn renew(&self, lock_id: LockId, hold: Duration) -> LockResult<LockInfo> {
        let info = {
            let mut state = self.inner.state();
            let info = state
                .table
                .renew(lock_id, Some(hold), Instant::now())
                .cloned()
                .ok_or_else(|| LockError::NotFound(lock_id.to_string()))?;
            self.inner.ensure_reaper(&mut state);
            info
        };

        debug!(lock_name = %info.name, lock_id = %lock_id, hold_ms = as_millis_u64(hold), "Lock renewed");
        Ok(info)
    }

    /// Whether the lock with this id is still held
    pub fn is_held(&self, lock_id: LockId) -> bool {
        self.inner.state().table.contains_id(lock_id)
    }

    /// Get information about the lock held for `name`
    pub fn lock_info(&self, name: &str) -> Option<LockInfo> {
        self.inner.state().table.find(name).map(|lock| lock.info.clone())
    }

    /// Check the status of a lock
    pub fn check_lock_status(&self, name: &str) -> LockStatus {
        let state = self.inner.state();
        match (state.table.find(name), state.queue.len(name)) {
            (None, _) => LockStatus::Available,
            (Some(_), 0) => LockStatus::Held,
            (Some(_), _) => LockStatus::Contended,
        }
    }

    /// List all active locks
    pub fn list_active_locks(&self) -> Vec<LockInfo> {
        self.inner.state().table.infos().cloned().collect()
    }

    /// Number of requests waiting for `name`
    pub fn queue_len(&self, name: &str) -> usize {
        self.inner.state().queue.len(name)
    }

    pub fn stats(&self) -> LockStats {
        let state = self.inner.state();
        LockStats {
            active_locks: state.table.len(),
            queued_requests: state.queue.total(),
            waiting_names: state.queue.waiting_names(),
            scheduler_active: state.scheduler.active,
            reaper_active: state.reaper.active,
        }
    }

    /// Subscribe to lock lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.inner.events.subscribe()
    }

    /// Force-restart the scheduler and reaper.
    ///
    /// Restarts a loop whose task ended without going dormant, and a dormant
    /// loop that has work pending. Loops that are running are left alone, so
    /// calling this repeatedly is harmless.
    pub fn recover(&self) -> RecoveryReport {
        let report = {
            let mut state = self.inner.state();
            let mut report = RecoveryReport::default();

            if !state.scheduler.is_running() && !state.queue.is_empty() {
                self.inner.spawn_scheduler(&mut state);
                report.scheduler_restarted = true;
            }
            if !state.reaper.is_running() && state.table.has_expiring() {
                self.inner.spawn_reaper(&mut state);
                report.reaper_restarted = true;
            }
            report
        };
        self.inner.scheduler_wake.notify_one();

        if report.restarted_any() {
            info!(
                scheduler_restarted = report.scheduler_restarted,
                reaper_restarted = report.reaper_restarted,
                "Lock manager loops restarted"
            );
        }
        report
    }

    /// Drop every lock and queued request and stop the background loops.
    ///
    /// Pending handles resolve with [`LockError::Reset`]; their callbacks
    /// are not invoked. Expiration callbacks of dropped locks never run.
    pub fn reset(&self) {
        let dropped = {
            let mut state = self.inner.state();
            state.generation.cancel();
            state.generation = CancellationToken::new();
            state.scheduler = LoopSlot::default();
            state.reaper = LoopSlot::default();
            state.table.clear();
            state.queue.drain_all()
        };

        let dropped_requests = dropped.len();
        for mut request in dropped {
            if let Some(tx) = request.completion.take() {
                let _ = tx.send(Err(LockError::Reset));
            }
        }

        info!(dropped_requests, "Lock manager reset");
    }

    #[cfg(test)]
    pub(crate) fn abort_loops_for_test(&self) {
        let state = self.inner.state();
        for slot in [&state.scheduler, &state.reaper] {
            if let Some(handle) = &slot.handle {
                handle.abort();
            }
        }
    }
}

impl Inner {
    /// Lock the state; a poisoned mutex is recovered since no state
    /// mutation can panic halfway.
    pub(super) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn publish(&self, event: LockEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    pub(super) fn release(&self, lock_id: LockId) -> bool {
        let released = self.state().table.release(lock_id);

        match released {
            Some(lock) => {
                let held = lock.held_for(Instant::now());
                debug!(lock_name = %lock.info.name, lock_id = %lock_id, "Lock released");
                self.publish(LockEvent::lock_released(
                    &lock.info.name,
                    lock_id,
                    as_millis_u64(held),
                ));
                self.scheduler_wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Remove a still-queued request.
    pub(super) fn cancel_request(&self, name: &str, request_id: RequestId) -> bool {
        let removed = self.state().queue.remove(name, request_id);

        match removed {
            Some(_) => {
                debug!(lock_name = %name, request_id = %request_id, "Lock request cancelled");
                self.publish(LockEvent::request_cancelled(name, request_id));
                true
            }
            None => false,
        }
    }

    /// Start the scheduler unless a live task is serving the queues. A task
    /// that died without parking is replaced.
    pub(super) fn ensure_scheduler(self: &Arc<Self>, state: &mut State) {
        if !state.scheduler.is_running() {
            self.spawn_scheduler(state);
        }
    }

    pub(super) fn ensure_reaper(self: &Arc<Self>, state: &mut State) {
        if !state.reaper.is_running() && state.table.has_expiring() {
            self.spawn_reaper(state);
        }
    }

    fn spawn_scheduler(self: &Arc<Self>, state: &mut State) {
        let task = scheduler::run(Arc::downgrade(self), state.generation.clone());
        state.scheduler = LoopSlot {
            active: true,
            handle: Some(self.runtime.spawn(task)),
        };
    }

    fn spawn_reaper(self: &Arc<Self>, state: &mut State) {
        let task = reaper::run(Arc::downgrade(self), state.generation.clone());
        state.reaper = LoopSlot {
            active: true,
            handle: Some(self.runtime.spawn(task)),
        };
    }
}
