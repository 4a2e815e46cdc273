//! Lock types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The wait deadline elapsed before the name became free
    #[error("unable to acquire lock for: {name} (waited {waited_ms}ms)")]
    Timeout { name: String, waited_ms: u64 },

    /// Lock was not found (for renewal)
    #[error("Lock not found: {0}")]
    NotFound(String),

    /// The manager was reset while the request was pending
    #[error("Lock manager was reset before the request resolved")]
    Reset,

    /// The manager was constructed outside of a tokio runtime
    #[error("Lock manager requires a tokio runtime")]
    NoRuntime,

    /// A configuration value was rejected
    #[error("Invalid lock configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E300",
            Self::NotFound(_) => "E302",
            Self::Reset => "E309",
            Self::NoRuntime => "E310",
            Self::InvalidConfig(_) => "E311",
        }
    }

    /// Whether this error means the deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Opaque identity of a held lock, required to release it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(Uuid);

impl LockId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a queued acquisition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// When a queued request gives up waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Wait until the name becomes free, however long that takes
    Never,
    /// Give up once this instant is reached
    At(Instant),
}

impl Deadline {
    /// Deadline for a request submitted at `now` that may wait `max_wait`.
    /// A wait too long to represent is treated as waiting forever.
    pub fn after(now: Instant, max_wait: Option<Duration>) -> Self {
        match max_wait.and_then(|wait| now.checked_add(wait)) {
            Some(deadline) => Self::At(deadline),
            None => Self::Never,
        }
    }

    /// A deadline equal to `now` counts as expired.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Self::Never => false,
            Self::At(deadline) => now >= *deadline,
        }
    }
}

/// Lock status as seen by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// No lock is held for the name
    Available,
    /// A lock is held and nobody is waiting
    Held,
    /// A lock is held and requests are queued behind it
    Contended,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Held => write!(f, "held"),
            Self::Contended => write!(f, "contended"),
        }
    }
}

/// Descriptor of a held lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Lock ID
    pub id: LockId,

    /// Name of the protected resource
    pub name: String,

    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,

    /// When the lock expires (None = held until released)
    pub expires_at: Option<DateTime<Utc>>,

    /// Number of times this lock has been renewed
    pub renewal_count: u32,
}

impl LockInfo {
    pub(crate) fn new(name: String, hold: Option<Duration>) -> Self {
        let now = Utc::now();
        Self {
            id: LockId::new(),
            name,
            acquired_at: now,
            expires_at: hold.and_then(|d| wall_clock_after(now, d)),
            renewal_count: 0,
        }
    }

    pub(crate) fn renew(&mut self, hold: Option<Duration>) {
        self.expires_at = hold.and_then(|d| wall_clock_after(Utc::now(), d));
        self.renewal_count += 1;
    }
}

/// `None` when the hold runs past the representable calendar range.
fn wall_clock_after(now: DateTime<Utc>, hold: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(hold)
        .ok()
        .and_then(|hold| now.checked_add_signed(hold))
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A zero hold means the lock never auto-expires.
pub(crate) fn effective_hold(hold: Option<Duration>) -> Option<Duration> {
    hold.filter(|d| !d.is_zero())
}

/// Configuration for the lock manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Upper bound between two scheduler passes over the waiter queues
    pub tick_interval: Duration,

    /// Interval between two reaper passes over the lock table
    pub reaper_interval: Duration,

    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

/// Default retry and pruning granularity
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            reaper_interval: DEFAULT_TICK_INTERVAL,
            event_capacity: 256,
        }
    }
}

impl LockConfig {
    /// Set the scheduler tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the reaper tick interval
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Reject values the background loops cannot run with
    pub fn validate(&self) -> LockResult<()> {
        if self.tick_interval.is_zero() {
            return Err(LockError::InvalidConfig(
                "tick_interval must be greater than zero".to_string(),
            ));
        }
        if self.reaper_interval.is_zero() {
            return Err(LockError::InvalidConfig(
                "reaper_interval must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(LockError::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time counters for a lock manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub active_locks: usize,
    pub queued_requests: usize,
    pub waiting_names: usize,
    pub scheduler_active: bool,
    pub reaper_active: bool,
}

/// Which background loops a call to `recover` had to restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub scheduler_restarted: bool,
    pub reaper_restarted: bool,
}

impl RecoveryReport {
    /// Whether anything was restarted
    pub fn restarted_any(&self) -> bool {
        self.scheduler_restarted || self.reaper_restarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_never_is_not_expired() {
        let now = Instant::now();
        assert!(!Deadline::Never.is_expired(now));
        assert!(!Deadline::Never.is_expired(now + Duration::from_secs(86_400)));
    }

    #[test]
    fn test_deadline_equal_to_now_is_expired() {
        let now = Instant::now();
        let deadline = Deadline::after(now, Some(Duration::from_millis(50)));

        assert!(!deadline.is_expired(now));
        assert!(!deadline.is_expired(now + Duration::from_millis(49)));
        assert!(deadline.is_expired(now + Duration::from_millis(50)));
        assert!(deadline.is_expired(now + Duration::from_millis(51)));
    }

    #[test]
    fn test_unrepresentable_wait_is_never() {
        let now = Instant::now();
        assert_eq!(Deadline::after(now, Some(Duration::MAX)), Deadline::Never);
        assert_eq!(Deadline::after(now, None), Deadline::Never);
    }

    #[test]
    fn test_huge_hold_has_no_wall_clock_expiry() {
        let info = LockInfo::new("db".to_string(), Some(Duration::MAX));
        assert!(info.expires_at.is_none());

        let mut renewed = LockInfo::new("db".to_string(), Some(Duration::from_secs(1)));
        renewed.renew(Some(Duration::MAX));
        assert!(renewed.expires_at.is_none());
        assert_eq!(renewed.renewal_count, 1);
    }

    #[test]
    fn test_millis_saturate() {
        assert_eq!(as_millis_u64(Duration::from_millis(1500)), 1500);
        assert_eq!(as_millis_u64(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_zero_hold_never_expires() {
        assert_eq!(effective_hold(Some(Duration::ZERO)), None);
        assert_eq!(effective_hold(None), None);
        assert_eq!(
            effective_hold(Some(Duration::from_millis(5))),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("db".to_string(), Some(Duration::from_secs(60)));
        assert_eq!(info.name, "db");
        assert!(info.expires_at.is_some());
        assert_eq!(info.renewal_count, 0);

        let forever = LockInfo::new("db".to_string(), None);
        assert!(forever.expires_at.is_none());
        assert_ne!(info.id, forever.id);
    }

    #[test]
    fn test_lock_info_renewal() {
        let mut info = LockInfo::new("cache".to_string(), Some(Duration::from_secs(1)));
        let original = info.expires_at;

        info.renew(Some(Duration::from_secs(600)));

        assert_eq!(info.renewal_count, 1);
        assert!(info.expires_at > original);
    }

    #[test]
    fn test_lock_status_display() {
        assert_eq!(LockStatus::Available.to_string(), "available");
        assert_eq!(LockStatus::Held.to_string(), "held");
        assert_eq!(LockStatus::Contended.to_string(), "contended");
    }

    #[test]
    fn test_lock_error_codes() {
        let timeout = LockError::Timeout {
            name: "B".to_string(),
            waited_ms: 1500,
        };
        assert_eq!(timeout.code(), "E300");
        assert!(timeout.is_timeout());
        assert_eq!(
            timeout.to_string(),
            "unable to acquire lock for: B (waited 1500ms)"
        );

        assert_eq!(LockError::Reset.code(), "E309");
        assert!(!LockError::Reset.is_timeout());
    }

    #[test]
    fn test_lock_config_builder() {
        let config = LockConfig::default()
            .with_tick_interval(Duration::from_millis(5))
            .with_reaper_interval(Duration::from_millis(20))
            .with_event_capacity(16);

        assert_eq!(config.tick_interval, Duration::from_millis(5));
        assert_eq!(config.reaper_interval, Duration::from_millis(20));
        assert_eq!(config.event_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lock_config_rejects_zero_interval() {
        let config = LockConfig::default().with_tick_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(LockError::InvalidConfig(_))
        ));
    }
}
