//! Incremental Request Decoder
//!
//! This module decodes client requests from the front of a connection's
//! inbound buffer. Requests are always arrays of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<L1>\r\n<L1 bytes>\r\n
//! ...
//! $<LN>\r\n<LN bytes>\r\n
//! ```
//!
//! ## How the Decoder Works
//!
//! [`decode`] is a pure function over a byte slice and returns one of:
//! - `Decoded::Complete(request)` - a full request is present; `request.consumed`
//!   bytes must be discarded from the head of the buffer
//! - `Decoded::Incomplete` - the request is a valid prefix, wait for more data
//! - `Decoded::Malformed(e)` - a protocol violation, the connection must close
//!
//! No state is kept between calls. A partially received request is simply
//! re-scanned once more bytes arrive, and since every length header is bounded
//! before it is used, a hostile header can never drive an allocation or an
//! index past the configured limits.

use crate::config::Limits;
use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Longest header body (sign plus digits) worth scanning for a terminator.
/// Anything longer cannot hold a valid `i64`.
const MAX_HEADER_LEN: usize = 32;

/// Reasons a request frame is rejected.
///
/// These never become wire replies; they only explain in the logs why a
/// connection was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A type byte other than the one the grammar requires
    #[error("expected '{expected}', got {found:#04x}")]
    UnexpectedPrefix { expected: char, found: u8 },

    /// Header is not an optional '-' followed by ASCII digits
    #[error("invalid length header: {0:?}")]
    InvalidLength(String),

    /// Header has no terminator within a sane distance
    #[error("length header exceeds {MAX_HEADER_LEN} bytes")]
    HeaderTooLong,

    /// Negative array or bulk length
    #[error("negative length: {0}")]
    NegativeLength(i64),

    /// Array declares more elements than allowed
    #[error("too many arguments: {count} (max: {max})")]
    TooManyArguments { count: i64, max: usize },

    /// Bulk string declares more bytes than allowed
    #[error("bulk string too large: {len} bytes (max: {max})")]
    BulkTooLarge { len: i64, max: usize },

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,
}

/// A fully decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Arguments in wire order; the first is the command name
    pub args: Vec<Bytes>,
    /// Bytes this request occupies at the head of the buffer
    pub consumed: usize,
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Complete(Request),
    Incomplete,
    Malformed(FrameError),
}

/// Decodes one request from the front of `buf`.
///
/// # Example
///
/// ```
/// use pollkv::config::Limits;
/// use pollkv::protocol::{decode, Decoded};
///
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
/// match decode(buf, &Limits::default()) {
///     Decoded::Complete(req) => {
///         assert_eq!(req.args.len(), 2);
///         assert_eq!(req.consumed, buf.len());
///     }
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn decode(buf: &[u8], limits: &Limits) -> Decoded {
    match decode_request(buf, limits) {
        Ok(Some(request)) => Decoded::Complete(request),
        Ok(None) => Decoded::Incomplete,
        Err(e) => Decoded::Malformed(e),
    }
}

fn decode_request(buf: &[u8], limits: &Limits) -> Result<Option<Request>, FrameError> {
    if buf.is_empty() {
        return Ok(None);
    }
    expect_prefix(buf[0], prefix::ARRAY)?;

    let (count, mut cursor) = match read_header(buf, 0)? {
        Some(header) => header,
        None => return Ok(None),
    };
    if count < 0 {
        return Err(FrameError::NegativeLength(count));
    }
    if count as u64 > limits.max_args as u64 {
        return Err(FrameError::TooManyArguments {
            count,
            max: limits.max_args,
        });
    }

    let mut args = Vec::with_capacity(count as usize);

    for _ in 0..count {
        if cursor >= buf.len() {
            return Ok(None);
        }
        expect_prefix(buf[cursor], prefix::BULK_STRING)?;

        let (len, data_start) = match read_header(buf, cursor)? {
            Some(header) => header,
            None => return Ok(None),
        };
        if len < 0 {
            return Err(FrameError::NegativeLength(len));
        }
        if len as u64 > limits.max_bulk_len as u64 {
            return Err(FrameError::BulkTooLarge {
                len,
                max: limits.max_bulk_len,
            });
        }

        let data_end = data_start + len as usize;
        if buf.len() < data_end + CRLF.len() {
            return Ok(None);
        }
        if &buf[data_end..data_end + CRLF.len()] != CRLF {
            return Err(FrameError::MissingTerminator);
        }

        args.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
        cursor = data_end + CRLF.len();
    }

    Ok(Some(Request {
        args,
        consumed: cursor,
    }))
}

#[inline]
fn expect_prefix(found: u8, expected: u8) -> Result<(), FrameError> {
    if found == expected {
        Ok(())
    } else {
        Err(FrameError::UnexpectedPrefix {
            expected: char::from(expected),
            found,
        })
    }
}

/// Reads the `<prefix><integer>\r\n` header starting at `start`.
///
/// Returns the value and the offset just past the CRLF, or `None` when the
/// terminator has not arrived yet.
fn read_header(buf: &[u8], start: usize) -> Result<Option<(i64, usize)>, FrameError> {
    let body_start = start + 1;
    let rest = &buf[body_start..];
    let window = &rest[..rest.len().min(MAX_HEADER_LEN + CRLF.len())];

    match find_crlf(window) {
        Some(pos) => {
            let digits = &rest[..pos];
            let value = parse_integer(digits).ok_or_else(|| {
                FrameError::InvalidLength(String::from_utf8_lossy(digits).into_owned())
            })?;
            Ok(Some((value, body_start + pos + CRLF.len())))
        }
        None if window.len() == MAX_HEADER_LEN + CRLF.len() => Err(FrameError::HeaderTooLong),
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a numeric header or argument: an optional leading `-`, then one or
/// more ASCII digits.
///
/// Returns `None` for an empty digit run, any other byte, or a value that does
/// not fit in an `i64`.
///
/// ```
/// use pollkv::protocol::parse_integer;
/// assert_eq!(parse_integer(b"-12"), Some(-12));
/// assert_eq!(parse_integer(b"-"), None);
/// assert_eq!(parse_integer(b"1x"), None);
/// ```
pub fn parse_integer(text: &[u8]) -> Option<i64> {
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, text),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }

    Some(if negative { -value } else { value })
}
