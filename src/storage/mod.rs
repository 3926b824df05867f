//! Storage Module
//!
//! An in-memory map from key to value plus optional expiry instant, shared by
//! every connection behind a single mutex.
//!
//! ## Features
//!
//! - **Exclusive access**: one lock acquisition per operation
//! - **TTL Support**: entries can carry an absolute expiry instant
//! - **Lazy Expiry**: expired entries are treated as absent on every read
//! - **Testable time**: expiry runs against an injectable [`Clock`]
//!
//! ## Example
//!
//! ```
//! use pollkv::storage::{Entry, Store};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let store = Store::new();
//!
//! // Basic operations
//! store.set(Bytes::from("name"), Entry::new(Bytes::from("Ariz")));
//! assert_eq!(store.get(b"name").map(|e| e.value), Some(Bytes::from("Ariz")));
//!
//! // Set with TTL
//! let expires_at = store.now() + Duration::from_secs(3600);
//! store.set(
//!     Bytes::from("session"),
//!     Entry::with_expiry(Bytes::from("token123"), Some(expires_at)),
//! );
//! ```

pub mod clock;
pub mod engine;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Entry, SetOutcome, Store};
