//! Reaper loop releasing expired locks
//!
//! Runs while at least one held lock carries an expiry. Every tick it
//! releases the locks whose hold elapsed, runs their expiration callbacks
//! and wakes the scheduler so queued waiters see the freed names.

use super::callback::invoke_isolated;
use super::event::LockEvent;
use super::manager::Inner;
use super::table::HeldLock;
use super::types::as_millis_u64;
use std::sync::Weak;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(super) async fn run(inner: Weak<Inner>, generation: CancellationToken) {
    debug!("Lock reaper started");

    loop {
        let Some(manager) = inner.upgrade() else {
            return;
        };

        let interval = manager.config.reaper_interval;
        tokio::select! {
            _ = generation.cancelled() => return,
            _ = sleep(interval) => {}
        }

        if !manager.reaper_tick(&generation) {
            debug!("Lock reaper dormant");
            return;
        }
    }
}

impl Inner {
    /// Release expired locks. Returns `false` once the loop should stop.
    fn reaper_tick(&self, generation: &CancellationToken) -> bool {
        let now = Instant::now();

        let (expired, keep_running) = {
            let mut state = self.state();
            if generation.is_cancelled() {
                return false;
            }

            let expired = state.table.drain_expired(now);
            let keep_running = state.table.has_expiring();
            if !keep_running {
                state.reaper.park();
            }
            (expired, keep_running)
        };

        if !expired.is_empty() {
            self.scheduler_wake.notify_one();
        }
        for lock in expired {
            self.expire(lock, now);
        }
        keep_running
    }

    fn expire(&self, lock: HeldLock, now: Instant) {
        let held_ms = as_millis_u64(lock.held_for(now));
        info!(
            lock_name = %lock.info.name,
            lock_id = %lock.info.id,
            held_ms,
            "Lock expired"
        );
        self.publish(LockEvent::lock_expired(&lock.info.name, lock.info.id, held_ms));

        if let Some(callback) = lock.on_expired {
            let info = lock.info;
            let name = info.name.clone();
            invoke_isolated("expired", &name, move || callback(info));
        }
    }
}
