//! Named locks for cooperating async tasks
//!
//! Tasks that share one process serialize access to a resource identified
//! by a string name. Acquisition never blocks a thread: requests are queued
//! per name and served in submission order by a background scheduler, and
//! locks taken for a fixed duration are released by a background reaper.
//!
//! # Architecture
//!
//! - **Lock table**: the held locks, at most one per name
//! - **Waiter queue**: FIFO of pending requests per name
//! - **Scheduler**: serves the head of every queue, times out stale heads
//! - **Reaper**: releases locks whose hold elapsed
//! - **Lock Manager**: `LockManager` owns all of the above
//!
//! Both loops are tokio tasks that go dormant when they have nothing to do
//! and are restarted by the next request.
//!
//! # Example
//!
//! ```ignore
//! use namelock_core::domain::locking::LockManager;
//!
//! let manager = LockManager::with_defaults()?;
//!
//! // Wait at most five seconds for the lock
//! let guard = manager.acquire("reports", Some(Duration::from_secs(5))).await?;
//!
//! // Do work with the resource...
//!
//! // Lock is automatically released when guard is dropped
//! ```

pub mod callback;
pub mod event;
pub mod guard;
pub mod manager;
pub mod pending;
pub mod queue;
mod reaper;
mod scheduler;
mod table;
pub mod types;

// Re-export main types
pub use callback::{AcquiredCallback, ExpiredCallback, TimeoutCallback};
pub use event::{LockEvent, LockEventType};
pub use guard::LockGuard;
pub use manager::LockManager;
pub use pending::PendingLock;
pub use queue::LockRequest;
pub use types::{
    DEFAULT_TICK_INTERVAL, Deadline, LockConfig, LockError, LockId, LockInfo, LockResult,
    LockStats, LockStatus, RecoveryReport, RequestId,
};
