//! Command Handler Module
//!
//! This module executes decoded requests against the store and builds the
//! reply for each one.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `GET key` - Get a key's value
//! - `SET key value [NX|XX] [GET] [EX seconds | PX milliseconds | KEEPTTL]`
//!
//! Command names and SET options are matched case-sensitively.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                             Store           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers return `Result<RespValue, CommandError>`; an error becomes a
//! `-ERR ...` reply and the connection keeps going.

use crate::protocol::{parse_integer, RespValue};
use crate::storage::{Entry, Store};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Command-level failures. The `Display` text is the wire error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
}

impl From<CommandError> for RespValue {
    fn from(e: CommandError) -> Self {
        RespValue::error(e.to_string())
    }
}

/// Write condition of a SET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Condition {
    #[default]
    Always,
    /// NX
    IfAbsent,
    /// XX
    IfPresent,
}

/// What a SET does to the key's time-to-live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// No TTL option: the new entry never expires
    #[default]
    Discard,
    /// EX / PX, already resolved to an absolute instant
    ExpireAt(Instant),
    /// KEEPTTL
    Keep,
}

/// Fully resolved SET options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: Condition,
    pub ttl: Ttl,
    /// GET: reply with the previous value instead of OK
    pub get: bool,
}

/// Parses the trailing SET options in a single left-to-right pass.
///
/// EX/PX are resolved against `now`. Any duplicate or conflicting option, a
/// missing or invalid EX/PX amount, or an unknown token is an error, and the
/// caller must not touch the store.
pub fn parse_set_options(flags: &[Bytes], now: Instant) -> Result<SetOptions, CommandError> {
    let mut options = SetOptions::default();
    let mut ttl_given = false;
    let mut iter = flags.iter();

    while let Some(flag) = iter.next() {
        match &flag[..] {
            b"NX" | b"XX" => {
                if options.condition != Condition::Always {
                    return Err(CommandError::Syntax);
                }
                options.condition = if &flag[..] == b"NX" {
                    Condition::IfAbsent
                } else {
                    Condition::IfPresent
                };
            }
            b"GET" => {
                if options.get {
                    return Err(CommandError::Syntax);
                }
                options.get = true;
            }
            b"KEEPTTL" => {
                if ttl_given {
                    return Err(CommandError::Syntax);
                }
                ttl_given = true;
                options.ttl = Ttl::Keep;
            }
            unit @ (b"EX" | b"PX") => {
                if ttl_given {
                    return Err(CommandError::Syntax);
                }
                ttl_given = true;

                let raw = iter.next().ok_or(CommandError::Syntax)?;
                let amount = parse_integer(raw)
                    .filter(|amount| *amount > 0)
                    .ok_or(CommandError::NotAnInteger)?;

                let ttl = if unit == b"EX" {
                    Duration::from_secs(amount as u64)
                } else {
                    Duration::from_millis(amount as u64)
                };
                let at = now
                    .checked_add(ttl)
                    .ok_or(CommandError::NotAnInteger)?;
                options.ttl = Ttl::ExpireAt(at);
            }
            _ => return Err(CommandError::Syntax),
        }
    }

    Ok(options)
}

/// Executes requests against the shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes one request and returns the reply to send.
    ///
    /// An empty request (`*0\r\n`) produces no reply.
    pub fn execute(&self, args: &[Bytes]) -> Option<RespValue> {
        let (name, rest) = args.split_first()?;

        let reply = self.dispatch(name, rest).unwrap_or_else(RespValue::from);
        trace!(command = %String::from_utf8_lossy(name), reply = %reply, "Executed command");
        Some(reply)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, name: &[u8], args: &[Bytes]) -> Result<RespValue, CommandError> {
        match name {
            b"PING" => self.cmd_ping(args),
            b"ECHO" => self.cmd_echo(args),
            b"GET" => self.cmd_get(args),
            b"SET" => self.cmd_set(args),
            _ => Err(CommandError::UnknownCommand(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Result<RespValue, CommandError> {
        match args {
            [] => Ok(RespValue::pong()),
            [message] => Ok(RespValue::bulk_string(message.clone())),
            _ => Err(CommandError::WrongArity("ping")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Result<RespValue, CommandError> {
        match args {
            [message] => Ok(RespValue::bulk_string(message.clone())),
            _ => Err(CommandError::WrongArity("echo")),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let [key] = args else {
            return Err(CommandError::WrongArity("get"));
        };

        Ok(match self.store.get(key) {
            Some(entry) => RespValue::bulk_string(entry.value),
            None => RespValue::null(),
        })
    }

    /// SET key value [NX|XX] [GET] [EX seconds | PX milliseconds | KEEPTTL]
    fn cmd_set(&self, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let [key, value, flags @ ..] = args else {
            return Err(CommandError::WrongArity("set"));
        };

        let SetOptions {
            condition,
            ttl,
            get,
        } = parse_set_options(flags, self.store.now())?;

        let value = value.clone();
        let outcome = self.store.set_with(key.clone(), |previous| {
            let allowed = match condition {
                Condition::Always => true,
                Condition::IfAbsent => previous.is_none(),
                Condition::IfPresent => previous.is_some(),
            };
            if !allowed {
                return None;
            }

            let expires_at = match ttl {
                Ttl::Discard => None,
                Ttl::ExpireAt(at) => Some(at),
                Ttl::Keep => previous.and_then(|entry| entry.expires_at),
            };
            Some(Entry::with_expiry(value, expires_at))
        });

        Ok(if get {
            match outcome.previous {
                Some(entry) => RespValue::bulk_string(entry.value),
                None => RespValue::null(),
            }
        } else if outcome.written {
            RespValue::ok()
        } else {
            RespValue::null()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ManualClock;

    fn setup() -> (Arc<ManualClock>, Arc<Store>, CommandHandler) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(Store::with_clock(clock.clone()));
        let handler = CommandHandler::new(Arc::clone(&store));
        (clock, store, handler)
    }

    fn run(handler: &CommandHandler, parts: &[&str]) -> RespValue {
        let args: Vec<Bytes> = parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        handler.execute(&args).expect("non-empty request yields a reply")
    }

    fn value_of(store: &Store, key: &str) -> Option<Bytes> {
        store.get(key.as_bytes()).map(|e| e.value)
    }

    #[test]
    fn test_ping() {
        let (_, _, handler) = setup();
        assert_eq!(run(&handler, &["PING"]), RespValue::pong());
        assert_eq!(
            run(&handler, &["PING", "hello"]),
            RespValue::bulk_string("hello")
        );
        assert_eq!(
            run(&handler, &["PING", "a", "b"]),
            RespValue::error("ERR wrong number of arguments for 'ping' command")
        );
    }

    #[test]
    fn test_echo() {
        let (_, _, handler) = setup();
        assert_eq!(
            run(&handler, &["ECHO", "Hello World"]),
            RespValue::bulk_string("Hello World")
        );
        assert_eq!(
            run(&handler, &["ECHO"]),
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
    }

    #[test]
    fn test_empty_request_has_no_reply() {
        let (_, _, handler) = setup();
        assert_eq!(handler.execute(&[]), None);
    }

    #[test]
    fn test_set_and_get() {
        let (_, _, handler) = setup();
        assert_eq!(run(&handler, &["SET", "name", "Ariz"]), RespValue::ok());
        assert_eq!(
            run(&handler, &["GET", "name"]),
            RespValue::bulk_string("Ariz")
        );
        assert_eq!(run(&handler, &["GET", "missing"]), RespValue::null());
    }

    #[test]
    fn test_arity_errors_do_not_touch_store() {
        let (_, store, handler) = setup();
        assert_eq!(
            run(&handler, &["GET"]),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            run(&handler, &["GET", "a", "b"]),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            run(&handler, &["SET", "k"]),
            RespValue::error("ERR wrong number of arguments for 'set' command")
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let (_, store, handler) = setup();
        assert_eq!(
            run(&handler, &["FOO", "bar"]),
            RespValue::error("ERR unknown command 'FOO'")
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        let (_, _, handler) = setup();
        assert_eq!(
            run(&handler, &["ping"]),
            RespValue::error("ERR unknown command 'ping'")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "nx"]),
            RespValue::error("ERR syntax error")
        );
    }

    #[test]
    fn test_set_px_expiry() {
        let (clock, _, handler) = setup();
        assert_eq!(run(&handler, &["SET", "k", "v", "PX", "50"]), RespValue::ok());
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::bulk_string("v"));

        clock.advance(Duration::from_millis(100));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::null());
    }

    #[test]
    fn test_set_ex_expiry() {
        let (clock, _, handler) = setup();
        run(&handler, &["SET", "k", "v", "EX", "2"]);

        clock.advance(Duration::from_millis(1999));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::bulk_string("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::null());
    }

    #[test]
    fn test_plain_set_clears_ttl() {
        let (clock, _, handler) = setup();
        run(&handler, &["SET", "k", "v1", "PX", "10"]);
        run(&handler, &["SET", "k", "v2"]);

        clock.advance(Duration::from_secs(1));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::bulk_string("v2"));
    }

    #[test]
    fn test_keepttl_preserves_expiry() {
        let (clock, _, handler) = setup();
        run(&handler, &["SET", "k", "v1", "PX", "100"]);
        assert_eq!(run(&handler, &["SET", "k", "v2", "KEEPTTL"]), RespValue::ok());

        clock.advance(Duration::from_millis(50));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::bulk_string("v2"));

        clock.advance(Duration::from_millis(50));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::null());
    }

    #[test]
    fn test_keepttl_without_live_entry() {
        let (clock, _, handler) = setup();

        // Absent key: nothing to keep, the value never expires
        assert_eq!(run(&handler, &["SET", "k", "v", "KEEPTTL"]), RespValue::ok());
        clock.advance(Duration::from_secs(3600));
        assert_eq!(run(&handler, &["GET", "k"]), RespValue::bulk_string("v"));

        // Expired entry: its TTL is not carried over
        run(&handler, &["SET", "old", "v1", "PX", "10"]);
        clock.advance(Duration::from_millis(20));
        assert_eq!(run(&handler, &["SET", "old", "v2", "KEEPTTL"]), RespValue::ok());
        clock.advance(Duration::from_secs(3600));
        assert_eq!(run(&handler, &["GET", "old"]), RespValue::bulk_string("v2"));
    }

    #[test]
    fn test_conflicting_flags_leave_value_untouched() {
        let (_, store, handler) = setup();
        run(&handler, &["SET", "k", "original"]);

        let conflicts: &[&[&str]] = &[
            &["SET", "k", "v", "NX", "XX"],
            &["SET", "k", "v", "EX", "10", "PX", "10"],
            &["SET", "k", "v", "EX", "10", "KEEPTTL"],
            &["SET", "k", "v", "KEEPTTL", "PX", "10"],
            &["SET", "k", "v", "GET", "GET"],
            &["SET", "k", "v", "XX", "XX"],
            &["SET", "k", "v", "EX"],
            &["SET", "k", "v", "BOGUS"],
        ];

        for args in conflicts {
            assert_eq!(
                run(&handler, args),
                RespValue::error("ERR syntax error"),
                "{:?}",
                args
            );
        }
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("original")));
    }

    #[test]
    fn test_invalid_expire_values_leave_value_untouched() {
        let (_, store, handler) = setup();
        run(&handler, &["SET", "k", "original"]);

        assert_eq!(
            run(&handler, &["SET", "k", "v", "EX", "ten"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "PX", "0"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "EX", "-5"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&handler, &["SET", "k", "v", "EX", "9223372036854775807"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("original")));
    }

    #[test]
    fn test_nx() {
        let (_, store, handler) = setup();
        assert_eq!(run(&handler, &["SET", "k", "first", "NX"]), RespValue::ok());
        assert_eq!(run(&handler, &["SET", "k", "second", "NX"]), RespValue::null());
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("first")));
    }

    #[test]
    fn test_xx() {
        let (_, store, handler) = setup();
        assert_eq!(run(&handler, &["SET", "k", "v", "XX"]), RespValue::null());
        assert!(store.is_empty());

        run(&handler, &["SET", "k", "v1"]);
        assert_eq!(run(&handler, &["SET", "k", "v2", "XX"]), RespValue::ok());
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("v2")));
    }

    #[test]
    fn test_nx_treats_expired_key_as_absent() {
        let (clock, store, handler) = setup();
        run(&handler, &["SET", "k", "old", "PX", "10"]);
        clock.advance(Duration::from_millis(10));

        assert_eq!(run(&handler, &["SET", "k", "new", "NX"]), RespValue::ok());
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("new")));
    }

    #[test]
    fn test_get_flag_returns_previous_value() {
        let (_, store, handler) = setup();
        assert_eq!(run(&handler, &["SET", "k", "v1", "GET"]), RespValue::null());
        assert_eq!(
            run(&handler, &["SET", "k", "v2", "GET"]),
            RespValue::bulk_string("v1")
        );
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("v2")));
    }

    #[test]
    fn test_get_flag_with_failed_condition() {
        let (_, store, handler) = setup();
        run(&handler, &["SET", "k", "v1"]);

        // NX fails, but GET still reports the current value
        assert_eq!(
            run(&handler, &["SET", "k", "v2", "NX", "GET"]),
            RespValue::bulk_string("v1")
        );
        assert_eq!(value_of(&store, "k"), Some(Bytes::from("v1")));

        assert_eq!(
            run(&handler, &["SET", "other", "v", "GET", "XX"]),
            RespValue::null()
        );
        assert_eq!(value_of(&store, "other"), None);
    }

    #[test]
    fn test_parse_set_options() {
        let now = Instant::now();
        let flags: Vec<Bytes> = ["XX", "GET", "PX", "250"]
            .iter()
            .map(|s| Bytes::from(*s))
            .collect();

        let options = parse_set_options(&flags, now).unwrap();
        assert_eq!(options.condition, Condition::IfPresent);
        assert!(options.get);
        assert_eq!(
            options.ttl,
            Ttl::ExpireAt(now + Duration::from_millis(250))
        );

        assert_eq!(parse_set_options(&[], now).unwrap(), SetOptions::default());
    }
}
