//! PollKV - A Poll-Driven In-Memory Key-Value Server
//!
//! This is the main entry point for the PollKV server.
//! It parses flags, sets up logging and runs the reactor on the main thread.

use anyhow::Context;
use clap::Parser;
use pollkv::config::{
    Limits, ServerConfig, DEFAULT_HOST, DEFAULT_MAX_ARGS, DEFAULT_MAX_BULK_LEN, DEFAULT_PORT,
};
use pollkv::server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A single-threaded, poll-driven in-memory key-value server
#[derive(Parser, Debug)]
#[command(name = "pollkv", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// The port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Largest bulk string a client may send, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BULK_LEN)]
    max_bulk_len: usize,

    /// Largest number of arguments in one request
    #[arg(long, default_value_t = DEFAULT_MAX_ARGS)]
    max_args: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let limits = Limits::builder()
            .max_bulk_len(self.max_bulk_len)
            .max_args(self.max_args)
            .build();

        ServerConfig::builder()
            .host(self.host)
            .port(self.port)
            .limits(limits)
            .build()
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
PollKV v{} - Poll-Driven In-Memory Key-Value Server
──────────────────────────────────────────────────────
Listening on {}
Max bulk length: {} bytes, max arguments: {}

Connect with: redis-cli -p {}
"#,
        pollkv::VERSION,
        config.bind_address(),
        config.limits.max_bulk_len,
        config.limits.max_args,
        config.port,
    );
}

fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();

    // Set up logging (RUST_LOG overrides the default level)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let mut server = Server::bind(config.clone())
        .with_context(|| format!("failed to start server on {}", config.bind_address()))?;

    print_banner(&config);
    info!("Listening on {}", server.local_addr()?);

    if let Err(e) = server.run() {
        error!(error = %e, "Server stopped unexpectedly");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
