//! mcpkit - a bidirectional Model Context Protocol framework
//!
//! Two symmetric peers exchange newline-delimited JSON-RPC 2.0 packets over
//! an arbitrary duplex byte stream. The server routes inbound requests to
//! registered tool/resource/prompt primitives, running each request on its
//! own task with per-request cancellation, and multiplexes event-bus
//! notifications onto the same stream. The client correlates responses back
//! to waiters by monotonic request id and serves the small set of
//! server-initiated methods (ping, roots, sampling).
//!
//! # Layers
//!
//! - **protocol**: the wire data model (packets, capabilities, primitives)
//! - **codec**: one JSON object per line over async byte halves
//! - **transport**: stdio, child-process and in-memory byte streams
//! - **server**: dispatch router, event bus, built-in handlers, primitives
//! - **client**: correlator, lifecycle handshake, typed request surface

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Client, ClientConfig, ClientStats, RootsProvider, RootsSet, SamplingHandler};
pub use error::{McpError, McpResult};
pub use server::{
    EventSink, LogSender, PromptSet, ResourceSet, Server, ServerConfig, ToolSet,
};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging for binaries and tests.
///
/// Level selection follows `RUST_LOG`; defaults to `mcpkit=info`.
pub fn initialize_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcpkit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
