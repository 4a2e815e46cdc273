//! Scheduler loop serving the waiter queues
//!
//! Each pass looks only at the head request of every non-empty queue: a
//! head whose deadline passed is timed out, otherwise the scheduler tries to
//! take the lock on its behalf. The loop sleeps one tick between passes, is
//! woken early by releases, and exits (goes dormant) once every queue is
//! empty. The next submission starts it again.

use super::callback::invoke_isolated;
use super::event::LockEvent;
use super::manager::Inner;
use super::queue::{Grant, WaitRequest, WaiterQueue};
use super::table::LockTable;
use super::types::{LockError, LockId, as_millis_u64};
use std::sync::{Arc, Weak};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// What one pass decided for a head request
#[derive(Debug)]
pub(crate) enum Resolution {
    Acquired { request: WaitRequest, lock_id: LockId },
    TimedOut { request: WaitRequest },
    Abandoned { request: WaitRequest },
}

/// One pass over the heads of all queues. Pure state transition; the
/// returned resolutions still have to be dispatched.
pub(crate) fn run_pass(table: &mut LockTable, queue: &mut WaiterQueue, now: Instant) -> Vec<Resolution> {
    let mut resolutions = Vec::new();

    for name in queue.names() {
        let name_free = table.find(&name).is_none();
        let Some(head) = queue.head_mut(&name) else {
            continue;
        };

        if head.is_abandoned() {
            if let Some(request) = queue.pop_head(&name) {
                resolutions.push(Resolution::Abandoned { request });
            }
            continue;
        }

        // a request always gets one attempt at a free name, even with no wait
        let first_attempt = !head.attempted;
        head.attempted = true;
        let expired = head.deadline.is_expired(now);

        if expired && !(first_attempt && name_free) {
            if let Some(request) = queue.pop_head(&name) {
                resolutions.push(Resolution::TimedOut { request });
            }
            continue;
        }

        if !name_free {
            // still held; the head retries on the next pass
            continue;
        }

        if let Some(mut request) = queue.pop_head(&name) {
            let on_expired = request.on_expired.take();
            if let Some(lock_id) = table.acquire(&name, request.hold, on_expired, now) {
                resolutions.push(Resolution::Acquired { request, lock_id });
            }
        }
    }

    resolutions
}

pub(super) async fn run(inner: Weak<Inner>, generation: CancellationToken) {
    debug!("Lock scheduler started");

    loop {
        let Some(manager) = inner.upgrade() else {
            return;
        };

        if !manager.scheduler_tick(&generation) {
            debug!("Lock scheduler dormant");
            return;
        }

        let tick = manager.config.tick_interval;
        tokio::select! {
            _ = generation.cancelled() => return,
            _ = manager.scheduler_wake.notified() => {}
            _ = sleep(tick) => {}
        }
    }
}

impl Inner {
    /// Run one scheduler pass. Returns `false` once the loop should stop.
    fn scheduler_tick(self: &Arc<Self>, generation: &CancellationToken) -> bool {
        let now = Instant::now();

        let (resolutions, keep_running) = {
            let mut state = self.state();
            if generation.is_cancelled() {
                return false;
            }

            let state = &mut *state;
            let resolutions = run_pass(&mut state.table, &mut state.queue, now);
            self.ensure_reaper(state);

            let keep_running = !state.queue.is_empty();
            if !keep_running {
                state.scheduler.park();
            }
            (resolutions, keep_running)
        };

        for resolution in resolutions {
            self.dispatch(resolution, now);
        }
        keep_running
    }

    fn dispatch(&self, resolution: Resolution, now: Instant) {
        match resolution {
            Resolution::Acquired { mut request, lock_id } => {
                let waited_ms = as_millis_u64(request.waited(now));
                debug!(
                    lock_name = %request.name,
                    lock_id = %lock_id,
                    waited_ms,
                    "Lock acquired"
                );
                self.publish(LockEvent::lock_acquired(&request.name, lock_id, waited_ms));

                let had_callback = match request.on_acquired.take() {
                    Some(callback) => {
                        invoke_isolated("acquired", &request.name, move || callback(lock_id));
                        true
                    }
                    None => false,
                };
                let grant = Grant {
                    lock_id,
                    owned_by_callback: had_callback,
                };
                let delivered = request
                    .completion
                    .take()
                    .is_some_and(|tx| tx.send(Ok(grant)).is_ok());

                if !had_callback && !delivered {
                    debug!(lock_name = %request.name, "Granted lock has no owner, releasing");
                    self.release(lock_id);
                }
            }
            Resolution::TimedOut { mut request } => {
                let waited_ms = as_millis_u64(request.waited(now));
                let err = LockError::Timeout {
                    name: request.name.clone(),
                    waited_ms,
                };

                let had_handler = match request.on_timeout.take() {
                    Some(callback) => {
                        let message = err.to_string();
                        invoke_isolated("timeout", &request.name, move || callback(message));
                        true
                    }
                    None => false,
                };
                let delivered = request
                    .completion
                    .take()
                    .is_some_and(|tx| tx.send(Err(err)).is_ok());

                let handled = had_handler || delivered;
                if handled {
                    debug!(lock_name = %request.name, waited_ms, "Lock request timed out");
                } else {
                    error!(
                        lock_name = %request.name,
                        request_id = %request.id,
                        waited_ms,
                        "Lock request timed out with no timeout handler and no listener"
                    );
                }
                self.publish(LockEvent::acquire_timed_out(
                    &request.name,
                    request.id,
                    waited_ms,
                    handled,
                ));
            }
            Resolution::Abandoned { request } => {
                debug!(
                    lock_name = %request.name,
                    request_id = %request.id,
                    "Dropping abandoned lock request"
                );
            }
        }
    }
}
