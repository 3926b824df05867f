//! Server Configuration
//!
//! Listen address plus the security limits enforced on every connection.
//! All values have defaults suitable for a local deployment, and each struct
//! comes with a small builder.

/// Default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Largest single bulk string a client may send (16 MiB)
pub const DEFAULT_MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// Largest number of arguments in one request
pub const DEFAULT_MAX_ARGS: usize = 1024;

/// Headroom on top of the bulk limit for protocol headers (1 MiB)
pub const BUFFER_HEADROOM: usize = 1024 * 1024;

/// Size of the temporary chunk each socket read fills (64 KiB)
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Per-connection protocol limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum declared length of one bulk string
    pub max_bulk_len: usize,

    /// Maximum declared number of arguments in one request
    pub max_args: usize,

    /// Maximum inbound bytes buffered but not yet consumed.
    /// Must be larger than `max_bulk_len` to leave room for headers.
    pub max_buffered: usize,

    /// Bytes requested from the socket per read call
    pub read_chunk: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_args: DEFAULT_MAX_ARGS,
            max_buffered: DEFAULT_MAX_BULK_LEN + BUFFER_HEADROOM,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

impl Limits {
    /// Create a new limits builder
    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::default()
    }
}

/// Builder for Limits
#[derive(Debug, Default)]
pub struct LimitsBuilder {
    limits: Limits,
    max_buffered: Option<usize>,
}

impl LimitsBuilder {
    /// Set the bulk string limit. Unless overridden, the buffer cap follows
    /// it with [`BUFFER_HEADROOM`] on top.
    pub fn max_bulk_len(mut self, len: usize) -> Self {
        self.limits.max_bulk_len = len;
        self
    }

    /// Set the argument count limit
    pub fn max_args(mut self, count: usize) -> Self {
        self.limits.max_args = count;
        self
    }

    /// Set the inbound buffer cap explicitly
    pub fn max_buffered(mut self, bytes: usize) -> Self {
        self.max_buffered = Some(bytes);
        self
    }

    /// Set the per-read chunk size (at least 1 byte)
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.limits.read_chunk = bytes.max(1);
        self
    }

    pub fn build(self) -> Limits {
        let mut limits = self.limits;
        limits.max_buffered = self
            .max_buffered
            .unwrap_or_else(|| limits.max_bulk_len.saturating_add(BUFFER_HEADROOM));
        limits
    }
}

/// Main configuration for a server instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Protocol and buffer limits
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            limits: Limits::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the protocol limits
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_bulk_len, 16 * 1024 * 1024);
        assert_eq!(limits.max_args, 1024);
        assert_eq!(limits.max_buffered, 17 * 1024 * 1024);
        assert!(limits.max_buffered > limits.max_bulk_len);
    }

    #[test]
    fn test_buffer_cap_follows_bulk_limit() {
        let limits = Limits::builder().max_bulk_len(100).build();
        assert_eq!(limits.max_buffered, 100 + BUFFER_HEADROOM);

        let limits = Limits::builder()
            .max_bulk_len(100)
            .max_buffered(256)
            .build();
        assert_eq!(limits.max_buffered, 256);
    }

    #[test]
    fn test_read_chunk_never_zero() {
        assert_eq!(Limits::builder().read_chunk(0).build().read_chunk, 1);
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig::builder().host("127.0.0.1").port(7000).build();
        assert_eq!(config.bind_address(), "127.0.0.1:7000");
        assert_eq!(ServerConfig::default().bind_address(), "0.0.0.0:6379");
    }
}
