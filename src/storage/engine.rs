//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! This module implements the key-value store behind every relaykv instance.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, keys are spread over shards to reduce contention.
//! 2. **Lazy Expiry**: An expired key is removed only when a read observes it. There is no sweeper.
//! 3. **Injected Clock**: Expiry is computed against a [`Clock`], so tests control time.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write to a key takes that key's shard lock exclusively, so two
//! concurrent SETs on one key leave exactly one of the two values.

use crate::storage::clock::{Clock, SystemClock};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry, expiring `ttl` after `now` when a TTL is given.
    ///
    /// A TTL too large to represent as an `Instant` never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// An entry is expired once `now` reaches its expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The key-value store shared by every connection.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all connection tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use relaykv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("demo"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("demo")));
///
/// engine.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Time source for expiry decisions
    clock: Arc<dyn Clock>,

    /// Number of expired keys removed by reads
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .field("expired", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a storage engine on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a storage engine that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            clock,
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// The instant a key set now with `ttl` would expire, or `None` when
    /// that lies beyond what the clock can represent.
    pub fn deadline(&self, ttl: Duration) -> Option<Instant> {
        self.clock.now().checked_add(ttl)
    }

    /// Sets a key, replacing any previous value and TTL.
    ///
    /// With `ttl = None` the key never expires, even if the old entry had a
    /// TTL.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        let entry = Entry::new(value, ttl, self.clock.now());

        let shard = self.get_shard(&key);
        let mut data = shard.data.write();
        data.insert(key, entry).is_none()
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired key
    /// is removed here; this is the only place expired memory is reclaimed.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let shard = self.get_shard(key);
        let now = self.clock.now();

        // Fast path for existing, non-expired keys
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Race: another writer replaced the key in between
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Returns the number of stored entries, including expired entries no
    /// read has observed yet.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.data.read().len()).sum()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many expired keys reads have removed so far.
    pub fn expired_keys(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }
}
