//! Readiness-Driven Reactor
//!
//! A single thread multiplexes the listening socket and every client socket
//! through `mio::Poll`. Nothing here blocks except the poll call itself.
//!
//! mio reports readiness edge-triggered, so every handler keeps going until
//! the socket says WouldBlock: the listener accepts until its queue is empty
//! and a connection reads until the socket is dry or replies back up. When a
//! connection switches between reading and draining it is reregistered with
//! its new interest, which also re-reports any data still waiting.

use crate::commands::CommandHandler;
use crate::config::{Limits, ServerConfig};
use crate::connection::{Connection, ConnectionError, ConnectionStats};
use crate::server::{Result, ServerError};
use crate::storage::Store;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Token for the listening socket
const LISTENER: Token = Token(0);

/// Token for the shutdown waker
const WAKER: Token = Token(1);

/// First token handed to a client connection
const FIRST_CLIENT_TOKEN: usize = 2;

/// Readiness events drained per poll call
const EVENTS_CAPACITY: usize = 1024;

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the reactor to stop. `run()` returns after its current iteration.
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::Release);
        self.waker.wake()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// The key-value server.
pub struct Server {
    poll: Poll,
    listener: TcpListener,

    /// Live connections. Removing an entry closes its socket.
    connections: HashMap<Token, Connection<TcpStream>>,
    next_token: usize,

    command_handler: CommandHandler,
    store: Arc<Store>,
    limits: Limits,
    stats: Arc<ConnectionStats>,
    shutdown: ShutdownHandle,

    /// Temporary read chunk shared by all connections
    read_buf: Vec<u8>,
}

impl Server {
    /// Binds and listens on `0.0.0.0:port` with default limits.
    pub fn new(port: u16) -> Result<Self> {
        Self::bind(ServerConfig::builder().port(port).build())
    }

    /// Binds and listens according to `config`, with a fresh store.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(Store::new()))
    }

    /// Binds and listens according to `config`, serving `store`.
    pub fn with_store(config: ServerConfig, store: Arc<Store>) -> Result<Self> {
        let address = config.bind_address();
        let addr = address
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ServerError::InvalidAddress(address.clone()))?;

        let mut listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
            addr: address.clone(),
            source,
        })?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        debug!(address = %address, "Listener registered");

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            command_handler: CommandHandler::new(Arc::clone(&store)),
            store,
            limits: config.limits,
            stats: Arc::new(ConnectionStats::new()),
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            read_buf: vec![0u8; config.limits.read_chunk.max(1)],
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// Per-connection failures close that connection only. An error is
    /// returned only if polling itself fails.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while !self.shutdown.is_requested() {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "Poll failed");
                return Err(ServerError::Poll(e));
            }

            // Admit new clients before serving existing ones
            if events.iter().any(|event| event.token() == LISTENER) {
                self.accept_connections();
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER | WAKER => {}
                    token => self.service(token, event),
                }
            }
        }

        info!(
            connections = self.connections.len(),
            "Shutdown requested, closing connections"
        );
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.remove_connection(token);
        }

        let stats = self.stats.snapshot();
        info!(
            accepted = stats.connections_accepted,
            commands = stats.commands_processed,
            bytes_read = stats.bytes_read,
            bytes_written = stats.bytes_written,
            "Server stopped"
        );
        Ok(())
    }

    /// Accepts until the listen queue is empty.
    fn accept_connections(&mut self) {
        loop {
            let (mut stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
            }

            let token = Token(self.next_token);
            self.next_token += 1;

            if let Err(e) = self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
            {
                warn!(client = %addr, error = %e, "Failed to register connection");
                continue;
            }

            let connection = Connection::new(
                stream,
                addr,
                self.command_handler.clone(),
                self.limits,
                Arc::clone(&self.stats),
            );
            self.connections.insert(token, connection);

            info!(client = %addr, token = ?token, "Client connected");
        }
    }

    /// Dispatches one readiness event to its connection.
    fn service(&mut self, token: Token, event: &Event) {
        // Already removed earlier in this batch
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };

        let before = connection.interest();
        trace!(
            token = ?token,
            readable = event.is_readable(),
            writable = event.is_writable(),
            "Readiness event"
        );

        if event.is_error() {
            let err = match connection.stream_mut().take_error() {
                Ok(Some(err)) | Err(err) => err,
                Ok(None) => io::Error::other("socket error reported by poll"),
            };
            connection.close(ConnectionError::IoError(err));
        }

        if event.is_readable() || event.is_read_closed() {
            connection.handle_read(&mut self.read_buf);
        }

        if event.is_writable() && connection.wants_write() {
            connection.handle_write();
        }

        if !connection.should_close() {
            let after = connection.interest();
            if after != before {
                if let Some(interest) = after {
                    if let Err(e) =
                        self.poll
                            .registry()
                            .reregister(connection.stream_mut(), token, interest)
                    {
                        connection.close(ConnectionError::IoError(e));
                    }
                }
            }
        }

        if connection.should_close() {
            self.remove_connection(token);
        }
    }

    /// Deregisters and drops a connection, closing its socket.
    fn remove_connection(&mut self, token: Token) {
        if let Some(mut connection) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(connection.stream_mut()) {
                debug!(token = ?token, error = %e, "Failed to deregister connection");
            }
            info!(
                client = %connection.addr(),
                token = ?token,
                "Connection closed"
            );
        }
    }
}
