//! Namelock Core Library
//!
//! Cooperative, advisory named locks for tasks sharing one tokio runtime:
//! - Queued acquisition, FIFO per name, with optional deadlines
//! - Locks held for a fixed duration and released by a background reaper
//! - RAII guards, cancellable pending handles and lifecycle events
//! - File and environment based configuration

pub mod config;
pub mod domain;
pub mod error;

pub use domain::locking::{
    LockConfig, LockError, LockGuard, LockId, LockManager, LockRequest, LockResult, PendingLock,
};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::locking::{LockEvent, LockEventType, LockInfo, LockStatus};
    pub use crate::error::{Error, Result};
    pub use crate::{LockConfig, LockError, LockGuard, LockId, LockManager, LockRequest};
}
