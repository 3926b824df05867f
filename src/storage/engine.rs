//! TTL-Aware Key-Value Store
//!
//! This module implements the store every connection reads and writes.
//!
//! ## Design Decisions
//!
//! 1. **One Mutex**: The whole map sits behind a single `parking_lot::Mutex`.
//!    Every operation takes the lock exactly once, so no reader ever sees a
//!    half-written entry and value plus TTL always change together.
//! 2. **Lazy Expiry**: An entry whose expiry is at or before "now" is absent
//!    to every read. There is no background sweep; an expired slot is
//!    reclaimed when it is read or overwritten.
//! 3. **Injectable Clock**: "now" comes from a [`Clock`], so expiry can be
//!    tested without sleeping.
//!
//! Sharding the map or splitting readers from writers (RwLock) would reduce
//! contention under a multi-threaded front end; the single-threaded reactor
//! does not need either.

use crate::storage::clock::{Clock, SystemClock};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry with an optional absolute expiry.
    pub fn with_expiry(value: Bytes, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Result of [`Store::set_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// The live entry that was in the slot before the call
    pub previous: Option<Entry>,
    /// Whether a new entry was written
    pub written: bool,
}

/// The key-value store shared by all connections.
///
/// # Example
///
/// ```
/// use pollkv::storage::{Entry, Store};
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set(Bytes::from("name"), Entry::new(Bytes::from("Ariz")));
///
/// let entry = store.get(b"name").unwrap();
/// assert_eq!(entry.value, Bytes::from("Ariz"));
/// assert!(store.get(b"missing").is_none());
/// ```
#[derive(Debug)]
pub struct Store {
    data: Mutex<HashMap<Bytes, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// The store's notion of "now". Expiry instants must be derived from it.
    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Overwrites the slot for `key`, replacing value and TTL together.
    pub fn set(&self, key: Bytes, entry: Entry) {
        self.data.lock().insert(key, entry);
    }

    /// Gets the live entry for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry found here is dropped from the map under the same lock.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let now = self.clock.now();
        let mut data = self.data.lock();

        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Runs a conditional write under one lock acquisition.
    ///
    /// `decide` sees the live entry (expired entries look absent) and returns
    /// the entry to write, or `None` to leave the slot untouched. This keeps
    /// check-then-set commands atomic with respect to other connections.
    pub fn set_with<F>(&self, key: Bytes, decide: F) -> SetOutcome
    where
        F: FnOnce(Option<&Entry>) -> Option<Entry>,
    {
        let now = self.clock.now();
        let mut data = self.data.lock();

        let previous = data
            .get(&key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned();

        match decide(previous.as_ref()) {
            Some(entry) => {
                data.insert(key, entry);
                SetOutcome {
                    previous,
                    written: true,
                }
            }
            None => SetOutcome {
                previous,
                written: false,
            },
        }
    }

    /// Number of occupied slots, including expired entries not yet reclaimed.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}
