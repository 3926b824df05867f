//! Connection State Machine
//!
//! This module drives one client socket on behalf of the reactor. A
//! connection never blocks: it is told that its socket is ready, does as much
//! work as the socket allows, and records what it wants to wait for next.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!            accept
//!              │
//!              ▼
//!     ┌─────────────────┐   outbound non-empty   ┌─────────────────┐
//!     │     Reading     │───────────────────────>│    Draining     │
//!     │ (wants_read)    │<───────────────────────│ (wants_write)   │
//!     └────────┬────────┘   outbound drained     └────────┬────────┘
//!              │                                          │
//!              │  EOF / I/O error / bad frame /           │  I/O error
//!              │  buffer limit                            │
//!              ▼                                          ▼
//!     ┌───────────────────────────────────────────────────────────┐
//!     │              Closing (reaped by the reactor)              │
//!     └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Buffer Management
//!
//! Inbound and outbound data live in `BytesMut` buffers: appended at the tail,
//! consumed from the head. TCP is a stream protocol, so one read may carry a
//! fraction of a request or several pipelined ones. Every complete request at
//! the head of the inbound buffer is executed before the read returns, and the
//! replies are appended to the outbound buffer in the same order.
//!
//! While replies are waiting to be written, read interest is dropped. A client
//! that does not read its replies therefore stops being read from. The
//! inbound buffer is capped by `Limits::max_buffered`; the outbound buffer is
//! not, so one read of pipelined requests can still queue many large replies.

use crate::commands::CommandHandler;
use crate::config::Limits;
use crate::protocol::{decode, Decoded, FrameError};
use bytes::{Buf, BytesMut};
use mio::Interest;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling, shared by the reactor and its
/// connections and readable from any thread.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub commands_processed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Why a connection was closed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Request framing violated the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] FrameError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected with a partial request buffered
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Inbound buffer limit exceeded
    #[error("Buffer size limit exceeded: {size} bytes (max: {max})")]
    BufferFull { size: usize, max: usize },
}

/// One client connection.
///
/// Generic over the socket so the state machine can be driven by any
/// non-blocking `Read + Write` stream; the reactor uses `mio::net::TcpStream`.
pub struct Connection<S> {
    /// The client socket
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet consumed by a complete request
    inbound: BytesMut,

    /// Encoded replies not yet accepted by the socket
    // TODO: cap outbound like inbound; pipelined GETs of a large value can
    // queue thousands of full replies from a single read.
    outbound: BytesMut,

    wants_read: bool,
    wants_write: bool,

    /// Set once; the connection is terminal afterwards
    close_reason: Option<ConnectionError>,

    /// The command handler (shares the store)
    command_handler: CommandHandler,

    limits: Limits,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S: Read + Write> Connection<S> {
    /// Creates a connection in the Reading state.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        limits: Limits,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            addr,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            wants_read: true,
            wants_write: false,
            close_reason: None,
            command_handler,
            limits,
            stats,
        }
    }

    /// Reads whatever the socket has, executing every complete request.
    ///
    /// `chunk` is the temporary read buffer; its length bounds a single read.
    /// Reading continues until the socket would block, so this is safe to
    /// drive from an edge-triggered poller. It stops early once replies are
    /// pending that the socket would not take (the connection is then
    /// Draining) or once the connection is closing.
    pub fn handle_read(&mut self, chunk: &mut [u8]) {
        while self.wants_read && !self.should_close() {
            let n = match self.stream.read(chunk) {
                Ok(0) => {
                    let reason = if self.inbound.is_empty() {
                        ConnectionError::ClientDisconnected
                    } else {
                        ConnectionError::UnexpectedEof
                    };
                    self.close(reason);
                    return;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close(e.into());
                    return;
                }
            };

            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");

            let size = self.inbound.len() + n;
            if size > self.limits.max_buffered {
                self.close(ConnectionError::BufferFull {
                    size,
                    max: self.limits.max_buffered,
                });
                return;
            }
            self.inbound.extend_from_slice(&chunk[..n]);

            self.process_requests();

            if !self.should_close() && !self.outbound.is_empty() {
                self.wants_read = false;
                self.wants_write = true;

                // Most replies fit in the socket buffer; write now instead
                // of waiting for the next readiness notification.
                self.handle_write();
            }
        }
    }

    /// Writes as much pending output as the socket accepts.
    ///
    /// Unsent bytes stay at the head of the outbound buffer. Once the buffer
    /// is empty the connection goes back to Reading.
    pub fn handle_write(&mut self) {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => {
                    self.close(io::Error::from(io::ErrorKind::WriteZero).into());
                    return;
                }
                Ok(n) => {
                    self.outbound.advance(n);
                    self.stats.bytes_written(n);
                    trace!(
                        client = %self.addr,
                        bytes = n,
                        remaining = self.outbound.len(),
                        "Sent response"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close(e.into());
                    return;
                }
            }
        }

        self.wants_write = false;
        self.wants_read = true;
    }

    /// Decodes and executes requests until the buffer runs dry.
    fn process_requests(&mut self) {
        loop {
            match decode(&self.inbound, &self.limits) {
                Decoded::Complete(request) => {
                    self.inbound.advance(request.consumed);
                    trace!(
                        client = %self.addr,
                        consumed = request.consumed,
                        remaining = self.inbound.len(),
                        "Parsed command"
                    );

                    self.stats.command_processed();
                    if let Some(reply) = self.command_handler.execute(&request.args) {
                        reply.serialize_into(&mut self.outbound);
                    }
                }
                Decoded::Incomplete => {
                    trace!(
                        client = %self.addr,
                        buffered = self.inbound.len(),
                        "Incomplete command, need more data"
                    );
                    return;
                }
                Decoded::Malformed(e) => {
                    self.inbound.clear();
                    self.close(e.into());
                    return;
                }
            }
        }
    }

    /// Marks the connection as closing. The first reason wins.
    pub fn close(&mut self, reason: ConnectionError) {
        if self.close_reason.is_some() {
            return;
        }

        match &reason {
            ConnectionError::ClientDisconnected => {
                debug!(client = %self.addr, "Client disconnected")
            }
            ConnectionError::IoError(io_err)
                if matches!(
                    io_err.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe
                ) =>
            {
                debug!(client = %self.addr, error = %io_err, "Connection reset by client")
            }
            ConnectionError::UnexpectedEof => {
                debug!(
                    client = %self.addr,
                    buffered = self.inbound.len(),
                    "Client disconnected mid-request"
                )
            }
            _ => warn!(client = %self.addr, error = %reason, "Closing connection"),
        }

        self.wants_read = false;
        self.wants_write = false;
        self.close_reason = Some(reason);
    }

    /// Readiness the reactor should wait for, or `None` once closing.
    pub fn interest(&self) -> Option<Interest> {
        match (self.wants_read, self.wants_write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl<S> Connection<S> {
    /// The underlying socket (for registration with the poller).
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Client's address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn wants_read(&self) -> bool {
        self.wants_read
    }

    pub fn wants_write(&self) -> bool {
        self.wants_write
    }

    /// True once the connection is terminal and must be reaped.
    pub fn should_close(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<&ConnectionError> {
        self.close_reason.as_ref()
    }

    /// Inbound bytes not yet consumed by a complete request
    pub fn buffered_input(&self) -> usize {
        self.inbound.len()
    }

    /// Encoded reply bytes not yet written
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}
