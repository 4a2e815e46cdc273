//! Domain layer
//!
//! - `locking`: named locks, waiter queues and their background loops

pub mod locking;
