//! Connection Module
//!
//! Per-client state driven by the reactor. A connection owns its socket and
//! two buffers, and alternates between reading requests and draining replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Reactor (server module)                    │
//! │          poll() → readiness for token N → connection        │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ handle_read / handle_write
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Connection                             │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read chunk  │───>│ Decode reqs │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │  outbound   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking**: never waits on the socket; reports the readiness it needs
//! - **Pipelining**: every complete request in a read is executed, in order
//! - **Backpressure**: reading pauses while replies are pending
//! - **Statistics**: tracks connection and command metrics

pub mod handler;

// Re-export commonly used types
pub use handler::{Connection, ConnectionError, ConnectionStats, StatsSnapshot};
