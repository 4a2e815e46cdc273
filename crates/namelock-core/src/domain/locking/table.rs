//! Ground-truth store of held locks

use super::callback::ExpiredCallback;
use super::types::{LockId, LockInfo, effective_hold};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// A lock owned by the table
pub(crate) struct HeldLock {
    pub info: LockInfo,
    pub acquired: Instant,
    pub expires_at: Option<Instant>,
    pub on_expired: Option<ExpiredCallback>,
}

impl HeldLock {
    pub fn held_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.acquired)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for HeldLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldLock")
            .field("info", &self.info)
            .field("acquired", &self.acquired)
            .field("expires_at", &self.expires_at)
            .field("on_expired", &self.on_expired.is_some())
            .finish()
    }
}

/// Held locks keyed by name, with a reverse index from id to name
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: HashMap<String, HeldLock>,
    names_by_id: HashMap<LockId, String>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lock for `name` if none is held. Never blocks.
    pub fn acquire(
        &mut self,
        name: &str,
        hold: Option<Duration>,
        on_expired: Option<ExpiredCallback>,
        now: Instant,
    ) -> Option<LockId> {
        if self.locks.contains_key(name) {
            return None;
        }

        let hold = effective_hold(hold);
        let mut info = LockInfo::new(name.to_string(), hold);
        let expires_at = expiry_instant(now, hold, &mut info);
        let id = info.id;

        self.names_by_id.insert(id, name.to_string());
        self.locks.insert(
            name.to_string(),
            HeldLock {
                info,
                acquired: now,
                expires_at,
                on_expired,
            },
        );

        Some(id)
    }

    /// Remove the lock with this id. Unknown ids are ignored.
    pub fn release(&mut self, id: LockId) -> Option<HeldLock> {
        let name = self.names_by_id.remove(&id)?;
        self.locks.remove(&name)
    }

    pub fn find(&self, name: &str) -> Option<&HeldLock> {
        self.locks.get(name)
    }

    pub fn contains_id(&self, id: LockId) -> bool {
        self.names_by_id.contains_key(&id)
    }

    /// Replace the expiry of a held lock. Returns `None` for unknown ids.
    pub fn renew(&mut self, id: LockId, hold: Option<Duration>, now: Instant) -> Option<&LockInfo> {
        let name = self.names_by_id.get(&id)?;
        let lock = self.locks.get_mut(name)?;
        let hold = effective_hold(hold);

        lock.info.renew(hold);
        lock.expires_at = expiry_instant(now, hold, &mut lock.info);
        Some(&lock.info)
    }

    /// Remove and return every lock whose expiry has passed.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<HeldLock> {
        let expired_ids: Vec<LockId> = self
            .locks
            .values()
            .filter(|lock| lock.is_expired(now))
            .map(|lock| lock.info.id)
            .collect();

        expired_ids
            .into_iter()
            .filter_map(|id| self.release(id))
            .collect()
    }

    /// Whether any held lock can still auto-expire
    pub fn has_expiring(&self) -> bool {
        self.locks.values().any(|lock| lock.expires_at.is_some())
    }

    pub fn infos(&self) -> impl Iterator<Item = &LockInfo> {
        self.locks.values().map(|lock| &lock.info)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn clear(&mut self) {
        self.locks.clear();
        self.names_by_id.clear();
    }
}

/// Monotonic expiry for `hold`. A hold too long to represent never expires,
/// and the descriptor is kept in agreement.
fn expiry_instant(now: Instant, hold: Option<Duration>, info: &mut LockInfo) -> Option<Instant> {
    let expires_at = hold
        .and_then(|d| now.checked_add(d))
        .filter(|_| info.expires_at.is_some());
    if expires_at.is_none() {
        info.expires_at = None;
    }
    expires_at
}
