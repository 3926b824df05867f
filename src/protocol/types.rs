//! Reply Types and Encoders
//!
//! This module defines the values the server writes back to clients, and the
//! pure formatting functions that turn them into wire bytes.
//!
//! ## Protocol Format
//!
//! Each reply starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command 'FOO'\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array (the request framing): `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value that can be encoded onto the wire.
///
/// Command handlers build one of these per request; the connection encodes it
/// into its outbound buffer. Nothing else writes raw reply bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe status line.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Error line, same shape as a simple string.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string.
    /// Format: `$-1\r\n`
    Null,

    /// Array of values. Clients send every request in this shape.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string reply.
    ///
    /// # Example
    /// ```
    /// use pollkv::protocol::RespValue;
    /// assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error reply.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new integer reply.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string reply.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates a null bulk reply.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Builds a request frame: an array of bulk strings.
    ///
    /// # Example
    /// ```
    /// use pollkv::protocol::RespValue;
    /// let frame = RespValue::command(["GET", "k"]).serialize();
    /// assert_eq!(frame, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    /// ```
    pub fn command<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p.as_ref())))
                .collect(),
        )
    }

    /// Common reply for successful writes
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Reply to PING
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Encodes the value into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Encodes the value at the tail of an existing buffer.
    ///
    /// This is what the connection uses to append replies to its outbound
    /// buffer in request order.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.reserve(data.len() + 16);
                buf.put_u8(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::Array(values) => {
                buf.put_u8(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => write!(f, "(array, {} elements)", values.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        let value = RespValue::simple_string("OK");
        assert_eq!(value.serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error("ERR unknown command 'FOO'");
        assert_eq!(value.serialize(), b"-ERR unknown command 'FOO'\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_empty_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::new());
        assert_eq!(value.serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_binary_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from_static(b"a\r\n\x00b"));
        assert_eq!(value.serialize(), b"$5\r\na\r\n\x00b\r\n");
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_command_frame() {
        let value = RespValue::command(["SET", "k", "v"]);
        assert_eq!(
            value.serialize(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"
        );
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut buf = BytesMut::from(&b"+OK\r\n"[..]);
        RespValue::pong().serialize_into(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n+PONG\r\n");
    }

    #[test]
    fn test_ok_and_pong() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"+PONG\r\n");
    }
}
