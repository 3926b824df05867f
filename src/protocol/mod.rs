//! Wire Protocol
//!
//! The server speaks a subset of RESP: requests are arrays of bulk strings,
//! replies are simple strings, errors, integers, bulk strings and null bulks.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply type and its encoders
//! - `parser`: the incremental request decoder
//!
//! ## Example
//!
//! ```
//! use pollkv::config::Limits;
//! use pollkv::protocol::{decode, Decoded, RespValue};
//!
//! // Decoding incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let Decoded::Complete(request) = decode(data, &Limits::default()) else {
//!     panic!("expected a complete request");
//! };
//! assert_eq!(request.consumed, data.len());
//!
//! // Encoding replies
//! let reply = RespValue::bulk_string("Ariz").serialize();
//! assert_eq!(reply, b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{decode, parse_integer, Decoded, FrameError, Request};
pub use types::RespValue;
