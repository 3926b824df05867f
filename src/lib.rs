//! # PollKV - A Poll-Driven In-Memory Key-Value Server
//!
//! PollKV serves a small subset of the Redis protocol from a single thread.
//! One readiness poll multiplexes the listening socket and every client, so
//! no client ever waits on another.
//!
//! ## Features
//!
//! - **Redis-Compatible Framing**: requests are arrays of bulk strings, replies
//!   are RESP values, so `redis-cli` works out of the box
//! - **Single-Threaded Reactor**: built on `mio`, non-blocking everywhere
//! - **Pipelining**: any number of requests per read, replies in order
//! - **TTL Support**: `SET ... EX/PX` with lazy expiry on read
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PollKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (mio Poll)  │    │ (per token) │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────┐     │
//! │                     │  Protocol   │    │          Store           │     │
//! │                     │   decode    │    │  Mutex<HashMap<K, Entry>>│     │
//! │                     └─────────────┘    └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pollkv::config::ServerConfig;
//! use pollkv::server::Server;
//!
//! let config = ServerConfig::builder().host("127.0.0.1").port(6379).build();
//! let mut server = Server::bind(config)?;
//!
//! // Stop from another thread with server.shutdown_handle().shutdown()
//! server.run()?;
//! # Ok::<(), pollkv::server::ServerError>(())
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `GET key`
//! - `SET key value [NX|XX] [GET] [EX seconds|PX milliseconds|KEEPTTL]`
//!
//! Command names and options are case-sensitive.
//!
//! ## Module Overview
//!
//! - [`protocol`]: incremental request decoder and reply encoding
//! - [`storage`]: the shared TTL store
//! - [`commands`]: command dispatch and SET option parsing
//! - [`connection`]: per-client buffering and the read/drain state machine
//! - [`server`]: the reactor
//! - [`config`]: listen address and protocol limits

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Limits, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{Connection, ConnectionStats};
pub use protocol::{decode, Decoded, FrameError, RespValue};
pub use server::{Server, ServerError, ShutdownHandle};
pub use storage::{Entry, Store};

/// Version of PollKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
