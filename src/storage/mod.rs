//! Storage Engine Module
//!
//! This module provides the key-value store for relaykv: a thread-safe,
//! sharded map from key to value with optional time-to-live.
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **TTL Support**: `SET ... PX <ms>` stores an absolute expiry instant
//! - **Lazy Expiry**: Expired keys are removed when a read observes them
//! - **Pluggable Clock**: [`ManualClock`] drives expiry in tests
//!
//! ## Example
//!
//! ```
//! use relaykv::storage::{ManualClock, StorageEngine};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(ManualClock::new());
//! let engine = StorageEngine::with_clock(clock.clone());
//!
//! engine.set(Bytes::from("session"), Bytes::from("token"), Some(Duration::from_millis(50)));
//! clock.advance(Duration::from_millis(50));
//! assert_eq!(engine.get(&Bytes::from("session")), None);
//! ```

pub mod clock;
pub mod engine;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Entry, StorageEngine};
