//! Lock guards for RAII-style lock management
//!
//! Guards automatically release locks when dropped, ensuring proper cleanup
//! even in the presence of panics or early returns.

use super::manager::Inner;
use super::types::LockId;
use std::fmt;
use std::sync::Arc;

/// A held named lock, released when dropped
pub struct LockGuard {
    inner: Arc<Inner>,

    /// Identity of the held lock
    id: LockId,

    /// Name of the locked resource
    name: String,

    /// Whether the lock has been explicitly released
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(inner: Arc<Inner>, id: LockId, name: String) -> Self {
        Self {
            inner,
            id,
            name,
            released: false,
        }
    }

    /// Get the lock ID
    pub fn id(&self) -> LockId {
        self.id
    }

    /// Get the locked name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the lock is still held (not released and not expired)
    pub fn is_held(&self) -> bool {
        !self.released && self.inner.state().table.contains_id(self.id)
    }

    /// Explicitly release the lock (normally done automatically on drop)
    pub fn release(mut self) {
        self.do_release();
    }

    /// Give up ownership without releasing; the id must be released by hand
    /// or the lock must expire.
    pub fn into_id(mut self) -> LockId {
        self.released = true;
        self.id
    }

    fn do_release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release(self.id);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.do_release();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("released", &self.released)
            .finish()
    }
}

impl fmt::Display for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock[{}]", self.name)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::locking::LockManager;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_guard_releases_on_drop() {
        let manager = LockManager::with_defaults().unwrap();
        {
            let guard = manager.acquire("scoped", None).await.unwrap();
            assert!(guard.is_held());
            assert!(manager.try_lock("scoped", None).is_none());
        }
        assert!(manager.try_lock("scoped", None).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_into_id_keeps_lock() {
        let manager = LockManager::with_defaults().unwrap();
        let guard = manager.acquire("kept", None).await.unwrap();
        let id = guard.into_id();

        assert!(manager.is_held(id));
        assert!(manager.release(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_after_expiry() {
        let manager = LockManager::with_defaults().unwrap();
        let guard = manager
            .acquire_for("brief", Duration::from_millis(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!guard.is_held());

        // a new holder must survive the stale guard being dropped
        let next = manager.try_lock("brief", None).unwrap();
        drop(guard);
        assert!(manager.is_held(next));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_display() {
        let manager = LockManager::with_defaults().unwrap();
        let guard = manager.acquire("printable", None).await.unwrap();
        assert_eq!(guard.to_string(), "Lock[printable]");
    }
}
