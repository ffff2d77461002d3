//! Client-side inbound routing: responses to waiters, notifications to
//! registered handlers, server-initiated requests to the client's own
//! handler table (ping, roots, sampling).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::correlator::Correlator;
use crate::client::ClientStats;
use crate::codec::FrameDecoder;
use crate::error::{McpError, McpResult};
use crate::protocol::constants::{notifications, McpMethod};
use crate::protocol::jsonrpc::{
    JsonrpcNotification, JsonrpcPacket, JsonrpcRequest, JsonrpcResponse, RequestId,
};
use crate::protocol::lifecycle::CancelledNotification;
use crate::server::handlers::{RequestContext, RequestHandler};
use crate::transport::BoxedReader;

/// A typed notification callback the client runs on its receive task.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, params: Value) -> McpResult<()>;
}

/// Everything the client's read task needs to route inbound packets.
pub(crate) struct IncomingRouter {
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) notification_handlers:
        Arc<RwLock<HashMap<McpMethod, Arc<dyn NotificationHandler>>>>,
    pub(crate) request_handlers: HashMap<McpMethod, Arc<dyn RequestHandler>>,
    pub(crate) processing: Arc<DashMap<RequestId, CancellationToken>>,
    pub(crate) write_tx: mpsc::Sender<String>,
    pub(crate) stats: Arc<Mutex<ClientStats>>,
}

impl IncomingRouter {
    /// Drain the stream until EOF, decode failure or session cancellation.
    pub(crate) async fn run(self, reader: BoxedReader, session: CancellationToken) {
        let mut decoder = FrameDecoder::new(reader);
        loop {
            tokio::select! {
                _ = session.cancelled() => break,
                packet = decoder.read_packet() => match packet {
                    Ok(Some(packet)) => self.route(packet, &session).await,
                    Ok(None) => {
                        debug!("server closed the stream");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "client read loop terminated");
                        break;
                    }
                }
            }
        }

        // Transport gone: free every waiter so callers fail fast.
        session.cancel();
        self.correlator.abort_all();
    }

    async fn route(&self, packet: JsonrpcPacket, session: &CancellationToken) {
        match packet {
            JsonrpcPacket::Response(response) => self.route_response(response),
            JsonrpcPacket::Notification(notification) => {
                self.route_notification(notification).await
            }
            JsonrpcPacket::Request(request) => self.route_request(request, session).await,
        }
    }

    fn route_response(&self, response: JsonrpcResponse) {
        let id = response.id.clone();
        if !self.correlator.complete(response) {
            debug!(id = %id, "late response dropped; waiter already gave up");
        }
    }

    async fn route_notification(&self, mut notification: JsonrpcNotification) {
        if notification.method.as_str() == notifications::CANCELLED {
            let params = notification.take_params();
            match serde_json::from_value::<CancelledNotification>(params) {
                Ok(cancelled) => {
                    if let Some(entry) = self.processing.get(&cancelled.id) {
                        entry.value().cancel();
                    }
                }
                Err(e) => warn!(error = %e, "malformed cancel notification"),
            }
            return;
        }

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.notifications_received += 1;
            stats.touch();
        }

        let handler = {
            let handlers = self.notification_handlers.read().await;
            handlers.get(&notification.method).cloned()
        };
        match handler {
            Some(handler) => {
                let params = notification.take_params();
                if let Err(e) = handler.handle(params).await {
                    warn!(method = %notification.method, error = %e, "notification handler failed");
                }
            }
            None => debug!(method = %notification.method, "unhandled notification"),
        }
    }

    /// Server-initiated requests: the client acts as the serving peer here.
    async fn route_request(&self, mut request: JsonrpcRequest, session: &CancellationToken) {
        let Some(handler) = self.request_handlers.get(&request.method) else {
            let err = McpError::method_not_found(request.method.as_str());
            self.send_response(JsonrpcResponse::error(request.id.clone(), err.to_wire()))
                .await;
            return;
        };

        let id = request.id.clone();
        let method = request.method.clone();
        let params = request.take_params();
        let handler = Arc::clone(handler);
        let cancel = session.child_token();
        self.processing.insert(id.clone(), cancel.clone());

        let processing = Arc::clone(&self.processing);
        let write_tx = self.write_tx.clone();
        tokio::spawn(async move {
            let ctx = RequestContext {
                id: Some(id.clone()),
                cancel: cancel.clone(),
            };
            let mut invocation = tokio::spawn(async move { handler.handle(ctx, params).await });
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(McpError::RequestCancelled),
                joined = &mut invocation => match joined {
                    Ok(result) => result,
                    Err(join_err) if join_err.is_panic() => {
                        error!(method = %method, "client-side handler panicked");
                        Err(McpError::internal(format!("handler for {} panicked", method)))
                    }
                    Err(_) => Err(McpError::RequestCancelled),
                },
            };
            if matches!(outcome, Err(McpError::RequestCancelled)) {
                invocation.abort();
            }

            processing.remove(&id);
            let response = match outcome {
                Ok(result) => JsonrpcResponse::success(id, result),
                Err(e) => JsonrpcResponse::error(id, e.to_wire()),
            };
            match serde_json::to_string(&response) {
                Ok(line) => {
                    let _ = write_tx.send(line).await;
                }
                Err(e) => error!(error = %e, "failed to serialise client response"),
            }
        });
    }

    async fn send_response(&self, response: JsonrpcResponse) {
        match serde_json::to_string(&response) {
            Ok(line) => {
                let _ = self.write_tx.send(line).await;
            }
            Err(e) => error!(error = %e, "failed to serialise client response"),
        }
    }
}
