//! Frame codec: one JSON object per line over a duplex byte stream.
//!
//! The decoder tolerates blank lines between packets and stops cleanly on
//! EOF; malformed JSON is fatal to the read loop. The writer emits one
//! serialised packet followed by a single `\n` and flushes per packet.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::error::{McpError, McpResult};
use crate::protocol::jsonrpc::JsonrpcPacket;

/// Decodes a lazy sequence of packets from a byte reader.
pub struct FrameDecoder<R> {
    reader: BufReader<R>,
}

impl<R> FrameDecoder<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next packet.
    ///
    /// `Ok(None)` signals EOF. Malformed JSON returns `Err` and the caller
    /// must terminate the read loop.
    pub async fn read_packet(&mut self) -> McpResult<Option<JsonrpcPacket>> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                trace!("frame decoder reached EOF");
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            trace!(frame = %trimmed, "decoded frame");
            let packet: JsonrpcPacket = serde_json::from_str(trimmed)
                .map_err(|e| McpError::parse(format!("malformed packet: {}", e)))?;
            return Ok(Some(packet));
        }
    }
}

/// Writes newline-terminated packets to a byte writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialise and emit one packet. Write errors are fatal to the session.
    pub async fn write_packet(&mut self, packet: &JsonrpcPacket) -> McpResult<()> {
        let line = serde_json::to_string(packet)?;
        self.write_line(&line).await
    }

    /// Emit an already-serialised packet.
    pub async fn write_line(&mut self, line: &str) -> McpResult<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::McpMethod;
    use crate::protocol::jsonrpc::{JsonrpcRequest, RequestId};
    use serde_json::json;

    #[tokio::test]
    async fn test_decode_skips_blank_lines() {
        let input = b"\n\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n";
        let mut decoder = FrameDecoder::new(&input[..]);

        let packet = decoder.read_packet().await.unwrap().unwrap();
        assert!(packet.is_request());
        assert!(decoder.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decode_malformed_is_fatal() {
        let input = b"{not json}\n";
        let mut decoder = FrameDecoder::new(&input[..]);
        let err = decoder.read_packet().await.unwrap_err();
        assert_eq!(err.code(), Some(-32700));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let mut buf = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buf);
            let packet = JsonrpcPacket::Request(JsonrpcRequest::new(
                RequestId::Number(5),
                McpMethod::read_resource(),
                Some(json!({"uri": "weather:city/beijing"})),
            ));
            writer.write_packet(&packet).await.unwrap();
        }
        assert!(buf.ends_with(b"\n"));

        let mut decoder = FrameDecoder::new(&buf[..]);
        let packet = decoder.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.id(), Some(&RequestId::Number(5)));
        assert_eq!(packet.method(), Some(&McpMethod::read_resource()));
    }

    #[tokio::test]
    async fn test_decode_multiple_packets_in_order() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"b\"}\n";
        let mut decoder = FrameDecoder::new(&input[..]);
        let first = decoder.read_packet().await.unwrap().unwrap();
        let second = decoder.read_packet().await.unwrap().unwrap();
        assert_eq!(first.id(), Some(&RequestId::Number(1)));
        assert_eq!(second.id(), Some(&RequestId::Number(2)));
    }
}
