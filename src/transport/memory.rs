//! In-memory transport: two connected peers over process-local pipes.
//!
//! Primarily for tests and embedding a server in the same process as its
//! client.

use async_trait::async_trait;
use tokio::io::{self, ReadHalf, WriteHalf};

use crate::error::{McpError, McpResult};
use crate::transport::{BoxedReader, BoxedWriter, Transport};

const PIPE_CAPACITY: usize = 64 * 1024;

type Halves = (ReadHalf<io::DuplexStream>, WriteHalf<io::DuplexStream>);

/// One end of an in-memory duplex pipe.
pub struct MemoryTransport {
    halves: Option<Halves>,
}

impl MemoryTransport {
    /// Create two connected transports; bytes written on one are read on the
    /// other.
    pub fn pair() -> (Self, Self) {
        let (left, right) = io::duplex(PIPE_CAPACITY);
        let (lr, lw) = io::split(left);
        let (rr, rw) = io::split(right);
        (
            Self {
                halves: Some((lr, lw)),
            },
            Self {
                halves: Some((rr, rw)),
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> McpResult<(BoxedReader, BoxedWriter)> {
        let (reader, writer) = self
            .halves
            .take()
            .ok_or_else(|| McpError::transport("memory transport already connected"))?;
        Ok((Box::new(reader), Box::new(writer)))
    }
}
