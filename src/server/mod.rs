//! Server Module
//!
//! The reactor: one thread, one `mio::Poll`, one listening socket and a map
//! of live connections keyed by poll token.
//!
//! ## Event Loop
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │ poll(): the only place the thread waits      │
//!   └──────────────────────┬───────────────────────┘
//!                          ▼
//!   listener ready?  ── accept until WouldBlock, register READABLE
//!                          ▼
//!   client ready?    ── handle_read / handle_write
//!                          ▼
//!   interest changed? ── reregister;  closing? ── deregister + drop
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use pollkv::server::Server;
//!
//! let mut server = Server::new(6379)?;
//! server.run()?;
//! # Ok::<(), pollkv::server::ServerError>(())
//! ```

pub mod reactor;

pub use reactor::{Server, ShutdownHandle};

use std::io;

/// Errors that stop the server (as opposed to a single connection).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The bind address could not be resolved
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    /// Binding or listening failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The readiness poll itself failed
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
