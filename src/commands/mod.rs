//! Command Execution
//!
//! Turns a decoded request into a store operation and a reply.
//! Dispatch is an exact, case-sensitive match on the first argument.
//!
//! ## Example
//!
//! ```
//! use pollkv::commands::CommandHandler;
//! use pollkv::protocol::RespValue;
//! use pollkv::storage::Store;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(Arc::new(Store::new()));
//! let reply = handler.execute(&[Bytes::from("PING")]);
//! assert_eq!(reply, Some(RespValue::pong()));
//! ```

pub mod handler;

pub use handler::{parse_set_options, CommandError, CommandHandler, Condition, SetOptions, Ttl};
