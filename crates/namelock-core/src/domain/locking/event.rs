//! Lock lifecycle events
//!
//! Every state change of the lock manager is published on a broadcast
//! channel. Subscribing is optional; events are dropped when nobody listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{LockId, RequestId};

/// Type of lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventType {
    /// A lock was acquired
    LockAcquired,
    /// A lock was explicitly released
    LockReleased,
    /// A lock was released by the reaper after its hold elapsed
    LockExpired,
    /// A queued request gave up waiting
    AcquireTimedOut,
    /// A request timed out and nobody observed it
    UnhandledTimeout,
    /// A queued request was withdrawn by its owner
    RequestCancelled,
}

impl LockEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockAcquired => "lock_acquired",
            Self::LockReleased => "lock_released",
            Self::LockExpired => "lock_expired",
            Self::AcquireTimedOut => "acquire_timed_out",
            Self::UnhandledTimeout => "unhandled_timeout",
            Self::RequestCancelled => "request_cancelled",
        }
    }
}

impl std::fmt::Display for LockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lock lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// The lock name the event concerns
    pub lock_name: String,
    /// The lock involved, when one exists
    pub lock_id: Option<LockId>,
    /// Type of event
    pub event_type: LockEventType,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LockEvent {
    /// Create a new lock event
    pub fn new(
        lock_name: &str,
        lock_id: Option<LockId>,
        event_type: LockEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lock_name: lock_name.to_string(),
            lock_id,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    /// Create a lock acquired event
    pub fn lock_acquired(lock_name: &str, lock_id: LockId, waited_ms: u64) -> Self {
        let data = serde_json::json!({ "waited_ms": waited_ms });
        Self::new(lock_name, Some(lock_id), LockEventType::LockAcquired, Some(data))
    }

    /// Create a lock released event
    pub fn lock_released(lock_name: &str, lock_id: LockId, held_ms: u64) -> Self {
        let data = serde_json::json!({ "held_ms": held_ms });
        Self::new(lock_name, Some(lock_id), LockEventType::LockReleased, Some(data))
    }

    /// Create a lock expired event
    pub fn lock_expired(lock_name: &str, lock_id: LockId, held_ms: u64) -> Self {
        let data = serde_json::json!({ "held_ms": held_ms });
        Self::new(lock_name, Some(lock_id), LockEventType::LockExpired, Some(data))
    }

    /// Create a timeout event; `handled` is false when nobody observed it
    pub fn acquire_timed_out(lock_name: &str, request_id: RequestId, waited_ms: u64, handled: bool) -> Self {
        let data = serde_json::json!({
            "request_id": request_id.to_string(),
            "waited_ms": waited_ms,
        });
        let event_type = if handled {
            LockEventType::AcquireTimedOut
        } else {
            LockEventType::UnhandledTimeout
        };
        Self::new(lock_name, None, event_type, Some(data))
    }

    /// Create a request cancelled event
    pub fn request_cancelled(lock_name: &str, request_id: RequestId) -> Self {
        let data = serde_json::json!({ "request_id": request_id.to_string() });
        Self::new(lock_name, None, LockEventType::RequestCancelled, Some(data))
    }
}
