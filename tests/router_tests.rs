//! Router-level invariants, driven with raw frames over the memory
//! transport: exactly one response per request, silent notifications,
//! lifecycle gating, cancellation and event fan-out.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use mcpkit::codec::{FrameDecoder, FrameWriter};
use mcpkit::protocol::jsonrpc::{JsonrpcPacket, JsonrpcResponse, RequestId};
use mcpkit::protocol::resources::{Resource, ResourceContent};
use mcpkit::protocol::tools::Content;
use mcpkit::server::{FnTool, ResourceSet, Server, ServerConfig, StaticResources, StaticTools, ToolSet};
use mcpkit::transport::{BoxedReader, BoxedWriter, MemoryTransport, Transport};

#[derive(Deserialize)]
struct NoArgs {}

fn test_tools() -> StaticTools {
    StaticTools::new()
        .with_tool(FnTool::new(
            "fast",
            "returns immediately",
            json!({"type": "object"}),
            |_: NoArgs| async move { Ok(vec![Content::text("fast done")]) },
        ))
        .with_tool(FnTool::new(
            "slow",
            "sleeps before returning",
            json!({"type": "object"}),
            |_: NoArgs| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(vec![Content::text("slow done")])
            },
        ))
        .with_tool(FnTool::new(
            "stuck",
            "never returns on its own",
            json!({"type": "object"}),
            |_: NoArgs| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![Content::text("unreachable")])
            },
        ))
}

struct Peer {
    writer: FrameWriter<BoxedWriter>,
    decoder: FrameDecoder<BoxedReader>,
    shutdown: CancellationToken,
}

impl Peer {
    async fn send(&mut self, value: Value) {
        self.writer
            .write_line(&serde_json::to_string(&value).unwrap())
            .await
            .unwrap();
    }

    async fn next_packet(&mut self) -> JsonrpcPacket {
        tokio::time::timeout(Duration::from_secs(5), self.decoder.read_packet())
            .await
            .expect("timed out waiting for packet")
            .expect("decode failed")
            .expect("stream closed")
    }

    /// Read packets until the response with `id` arrives, skipping
    /// interleaved notifications.
    async fn response_for(&mut self, id: i64) -> JsonrpcResponse {
        loop {
            match self.next_packet().await {
                JsonrpcPacket::Response(resp) if resp.id == RequestId::Number(id) => return resp,
                JsonrpcPacket::Response(other) => {
                    panic!("unexpected response for id {:?}", other.id)
                }
                JsonrpcPacket::Notification(_) => continue,
                JsonrpcPacket::Request(req) => panic!("unexpected request {:?}", req.method),
            }
        }
    }

    async fn handshake(&mut self) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "c", "version": "0"}
            }
        }))
        .await;
        let resp = self.response_for(1).await;
        assert!(resp.is_success());
        assert_eq!(resp.result.as_ref().unwrap()["protocolVersion"], json!("2024-11-05"));
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {}
        }))
        .await;
    }
}

async fn start(server: Server) -> (Arc<Server>, Peer) {
    let server = Arc::new(server);
    let (mut server_side, mut peer_side) = MemoryTransport::pair();
    let (s_reader, s_writer) = server_side.connect().await.unwrap();
    let (p_reader, p_writer) = peer_side.connect().await.unwrap();

    let shutdown = CancellationToken::new();
    let running = Arc::clone(&server);
    let token = shutdown.clone();
    tokio::spawn(async move {
        let _ = running.serve(s_reader, s_writer, token).await;
    });

    (
        server,
        Peer {
            writer: FrameWriter::new(p_writer),
            decoder: FrameDecoder::new(p_reader),
            shutdown,
        },
    )
}

fn tool_server() -> Server {
    Server::new(ServerConfig::default()).with_tools(ToolSet::new(test_tools()))
}

#[tokio::test]
async fn test_handshake_scenario() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "c", "version": "0"}
        }
    }))
    .await;

    let resp = peer.response_for(1).await;
    let result = resp.result.unwrap();
    assert_eq!(result["protocolVersion"], json!("2024-11-05"));
    assert_eq!(result["serverInfo"]["name"], json!("mcpkit-server"));
    assert!(result["capabilities"]["tools"].is_object());
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_method_gets_method_not_found() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "does/not/exist",
        "params": {}
    }))
    .await;
    let resp = peer.response_for(2).await;
    assert_eq!(resp.error.unwrap().code, -32601);
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_requests_before_ready_are_rejected() {
    let (_server, mut peer) = start(tool_server()).await;

    // MCP method before the handshake: -32003.
    peer.send(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}}))
        .await;
    let resp = peer.response_for(1).await;
    assert_eq!(resp.error.unwrap().code, -32003);

    // ping passes in any non-closed state.
    peer.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping", "params": {}}))
        .await;
    let resp = peer.response_for(2).await;
    assert!(resp.is_success());
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "stuck", "arguments": {}}
    }))
    .await;
    // Cancel twice; the second is a no-op (idempotence).
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/canceled", "params": {"id": 3}}))
        .await;
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/canceled", "params": {"id": 3}}))
        .await;

    let resp = peer.response_for(3).await;
    assert_eq!(resp.error.unwrap().code, -32000);

    // Exactly one response: a follow-up ping answers next, not a duplicate.
    peer.send(json!({"jsonrpc": "2.0", "id": 4, "method": "ping", "params": {}}))
        .await;
    let resp = peer.response_for(4).await;
    assert!(resp.is_success());
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_concurrent_requests_complete_out_of_order() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({"jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": {"name": "fast", "arguments": {}}}))
        .await;
    peer.send(json!({"jsonrpc": "2.0", "id": 11, "method": "tools/call", "params": {"name": "slow", "arguments": {}}}))
        .await;
    peer.send(json!({"jsonrpc": "2.0", "id": 12, "method": "tools/call", "params": {"name": "fast", "arguments": {}}}))
        .await;

    let mut order = Vec::new();
    while order.len() < 3 {
        if let JsonrpcPacket::Response(resp) = peer.next_packet().await {
            assert!(resp.is_success());
            match resp.id {
                RequestId::Number(n) => order.push(n),
                other => panic!("unexpected id {:?}", other),
            }
        }
    }

    // Each id exactly once; the slow request finishes last.
    let mut seen = order.clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12]);
    assert_eq!(*order.last().unwrap(), 11);
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_notifications_never_get_responses() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    // An id-less packet, even for a routable method, must not be answered.
    peer.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized", "params": {}}))
        .await;
    peer.send(json!({"jsonrpc": "2.0", "method": "some/unknown", "params": {}}))
        .await;
    peer.send(json!({"jsonrpc": "2.0", "id": 7, "method": "ping", "params": {}}))
        .await;

    // The only packet that comes back is the ping response.
    let resp = peer.response_for(7).await;
    assert!(resp.is_success());
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_event_bus_fanout_emits_notification() {
    let (server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    server
        .event_sink()
        .tool_list_changed
        .send(Default::default())
        .await
        .unwrap();

    loop {
        match peer.next_packet().await {
            JsonrpcPacket::Notification(n) => {
                assert_eq!(n.method.as_str(), "notifications/tools/list_changed");
                assert_eq!(n.params.unwrap(), json!({}));
                break;
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_subscribe_without_capability_is_method_not_found() {
    let resources = StaticResources::new().with_resource(
        Resource::new("mem:doc", "doc"),
        vec![ResourceContent::text("mem:doc", "text/plain", "body")],
    );
    // subscribe flag deliberately left false
    let server = Server::new(ServerConfig::default())
        .with_resources(ResourceSet::new(resources));
    let (_server, mut peer) = start(server).await;
    peer.handshake().await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "resources/subscribe",
        "params": {"uri": "mem:doc"}
    }))
    .await;
    let resp = peer.response_for(5).await;
    assert_eq!(resp.error.unwrap().code, -32601);

    // Reads still work.
    peer.send(json!({"jsonrpc": "2.0", "id": 6, "method": "resources/read", "params": {"uri": "mem:doc"}}))
        .await;
    let resp = peer.response_for(6).await;
    let contents = &resp.result.unwrap()["contents"];
    assert_eq!(contents[0]["uri"], json!("mem:doc"));
    assert_eq!(contents[0]["text"], json!("body"));
    assert!(contents[0].get("blob").is_none());
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_handler_error_maps_to_wire_code() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 8,
        "method": "tools/call",
        "params": {"name": "no-such-tool", "arguments": {}}
    }))
    .await;
    let resp = peer.response_for(8).await;
    let error = resp.error.unwrap();
    assert_eq!(error.code, -32005);
    assert!(error.message.contains("no-such-tool"));
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_malformed_params_yield_invalid_params() {
    let (_server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({
        "jsonrpc": "2.0",
        "id": 9,
        "method": "tools/call",
        "params": {"arguments": {}}
    }))
    .await;
    let resp = peer.response_for(9).await;
    assert_eq!(resp.error.unwrap().code, -32602);
    peer.shutdown.cancel();
}

#[tokio::test]
async fn test_stats_reflect_traffic() {
    let (server, mut peer) = start(tool_server()).await;
    peer.handshake().await;

    peer.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping", "params": {}}))
        .await;
    peer.response_for(2).await;

    let stats = server.stats();
    assert!(stats.requests_dispatched >= 2);
    assert!(stats.responses_sent >= 2);
    assert!(stats.last_activity.is_some());
    peer.shutdown.cancel();
}
