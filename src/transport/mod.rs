//! Byte-stream transports.
//!
//! A transport's only job is to hand the session a pair of duplex byte
//! halves; framing and protocol live above it. Concrete transports: the
//! current process' stdio, a spawned child process (client side) and an
//! in-memory pipe pair for tests.

pub mod memory;
pub mod stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::McpResult;

pub use memory::MemoryTransport;
pub use stdio::{ChildProcessTransport, StdioTransport};

/// Boxed read half of a duplex byte stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a duplex byte stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A source of one duplex byte stream per session.
#[async_trait]
pub trait Transport: Send {
    /// Establish the stream and hand over its halves.
    ///
    /// A transport yields its halves once; a second call is an error.
    async fn connect(&mut self) -> McpResult<(BoxedReader, BoxedWriter)>;

    /// Release any resources behind the stream (child processes, sockets).
    async fn close(&mut self) -> McpResult<()> {
        Ok(())
    }
}
