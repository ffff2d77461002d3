//! Dispatch router: decodes inbound packets, runs handlers concurrently with
//! per-request cancellation, fans event-bus notifications out and serialises
//! all outbound traffic through a single writer task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::{FrameDecoder, FrameWriter};
use crate::error::{McpError, McpResult};
use crate::protocol::constants::{notifications, McpMethod};
use crate::protocol::jsonrpc::{
    JsonrpcNotification, JsonrpcPacket, JsonrpcRequest, JsonrpcResponse, RequestId,
};
use crate::protocol::lifecycle::{CancelledNotification, SessionState};
use crate::server::event_bus::EventStreams;
use crate::server::handlers::{LifecycleGate, RequestContext, RequestHandler};
use crate::transport::{BoxedReader, BoxedWriter};

/// Capacity of the outbound write queue.
pub(crate) const WRITE_QUEUE_CAPACITY: usize = 2048;

/// Counters describing one session's traffic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterStats {
    pub requests_dispatched: u64,
    pub responses_sent: u64,
    pub notifications_sent: u64,
    pub cancellations: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl RouterStats {
    fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}

pub(crate) struct Router {
    handlers: HashMap<McpMethod, Arc<dyn RequestHandler>>,
    gate: Arc<LifecycleGate>,
    processing: Arc<DashMap<RequestId, CancellationToken>>,
    stats: Arc<Mutex<RouterStats>>,
}

impl Router {
    pub(crate) fn new(
        handler_list: Vec<Arc<dyn RequestHandler>>,
        gate: Arc<LifecycleGate>,
        stats: Arc<Mutex<RouterStats>>,
    ) -> Self {
        let mut handlers = HashMap::new();
        for handler in handler_list {
            let method = handler.method();
            if handlers.insert(method.clone(), handler).is_some() {
                warn!(method = %method, "duplicate handler registration; last one wins");
            }
        }
        Self {
            handlers,
            gate,
            processing: Arc::new(DashMap::new()),
            stats,
        }
    }

    /// Run the session until the peer disconnects, the decoder fails or the
    /// shutdown token fires.
    pub(crate) async fn run(
        self,
        reader: BoxedReader,
        writer: BoxedWriter,
        streams: EventStreams,
        shutdown: CancellationToken,
    ) -> McpResult<()> {
        let session = shutdown.child_token();
        let (write_tx, write_rx) = mpsc::channel::<String>(WRITE_QUEUE_CAPACITY);

        let writer_task = tokio::spawn(write_loop(writer, write_rx, session.clone()));
        let fanout_tasks = self.spawn_fanout_tasks(streams, &write_tx, &session);

        let mut decoder = FrameDecoder::new(reader);
        let result = loop {
            tokio::select! {
                _ = session.cancelled() => break Ok(()),
                packet = decoder.read_packet() => match packet {
                    Ok(Some(packet)) => self.dispatch(packet, &write_tx, &session).await,
                    Ok(None) => {
                        debug!("peer closed the stream");
                        break Ok(());
                    }
                    Err(e) => {
                        error!(error = %e, "read loop terminated");
                        break Err(e);
                    }
                }
            }
        };

        self.gate.advance(SessionState::Closing).await;
        session.cancel();
        drop(write_tx);

        for task in fanout_tasks {
            let _ = task.await;
        }
        let _ = writer_task.await;

        self.gate.advance(SessionState::Closed).await;
        result
    }

    fn spawn_fanout_tasks(
        &self,
        streams: EventStreams,
        write_tx: &mpsc::Sender<String>,
        session: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_fanout(
                streams.tool_list_changed,
                McpMethod::notification_tools_list_changed(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
            spawn_fanout(
                streams.resource_list_changed,
                McpMethod::notification_resources_list_changed(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
            spawn_fanout(
                streams.resource_updated,
                McpMethod::notification_resources_updated(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
            spawn_fanout(
                streams.prompt_list_changed,
                McpMethod::notification_prompts_list_changed(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
            spawn_fanout(
                streams.logging_message,
                McpMethod::notification_message(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
            spawn_fanout(
                streams.progress,
                McpMethod::notification_progress(),
                write_tx.clone(),
                session.clone(),
                Arc::clone(&self.stats),
            ),
        ]
    }

    async fn dispatch(
        &self,
        packet: JsonrpcPacket,
        write_tx: &mpsc::Sender<String>,
        session: &CancellationToken,
    ) {
        match packet {
            JsonrpcPacket::Notification(notification) => {
                self.dispatch_notification(notification, session).await
            }
            JsonrpcPacket::Request(request) => {
                self.dispatch_request(request, write_tx, session).await
            }
            JsonrpcPacket::Response(response) => {
                debug!(id = %response.id, "unexpected response packet; dropped");
            }
        }
    }

    async fn dispatch_notification(
        &self,
        mut notification: JsonrpcNotification,
        session: &CancellationToken,
    ) {
        // The cancel notification is privileged: handled here, never
        // resolvable through the handler table.
        if notification.method.as_str() == notifications::CANCELLED {
            let params = notification.take_params();
            match serde_json::from_value::<CancelledNotification>(params) {
                Ok(cancelled) => self.cancel_request(&cancelled.id),
                Err(e) => warn!(error = %e, "malformed cancel notification"),
            }
            return;
        }

        let ready = self.gate.state().await == SessionState::Ready;
        if notification.method.as_str() != notifications::INITIALIZED && !ready {
            debug!(method = %notification.method, "notification before ready; dropped");
            return;
        }

        let Some(handler) = self.handlers.get(&notification.method) else {
            debug!(method = %notification.method, "no handler for notification; dropped");
            return;
        };

        // Run inline on the read task: notification effects (notably the
        // initialized transition) must be ordered before later packets.
        let ctx = RequestContext {
            id: None,
            cancel: session.child_token(),
        };
        let params = notification.take_params();
        if let Err(e) = handler.handle(ctx, params).await {
            warn!(method = %notification.method, error = %e, "notification handler failed");
        }
    }

    fn cancel_request(&self, id: &RequestId) {
        match self.processing.get(id) {
            Some(entry) => {
                entry.value().cancel();
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.cancellations += 1;
                stats.touch();
                debug!(id = %id, "request cancelled by peer");
            }
            None => debug!(id = %id, "cancel for unknown or finished request"),
        }
    }

    async fn dispatch_request(
        &self,
        mut request: JsonrpcRequest,
        write_tx: &mpsc::Sender<String>,
        session: &CancellationToken,
    ) {
        if let Err(e) = request.validate() {
            enqueue_response(
                write_tx,
                JsonrpcResponse::error(request.id.clone(), e.to_wire()),
                &self.stats,
            )
            .await;
            return;
        }

        if let Err(e) = self.gate.check_request(&request.method).await {
            enqueue_response(
                write_tx,
                JsonrpcResponse::error(request.id.clone(), e.to_wire()),
                &self.stats,
            )
            .await;
            return;
        }

        let Some(handler) = self.handlers.get(&request.method) else {
            let err = McpError::method_not_found(request.method.as_str());
            enqueue_response(
                write_tx,
                JsonrpcResponse::error(request.id.clone(), err.to_wire()),
                &self.stats,
            )
            .await;
            return;
        };

        let id = request.id.clone();
        let method = request.method.clone();
        let params = request.take_params();
        let handler = Arc::clone(handler);
        let cancel = session.child_token();

        // Registered before the handler starts so a racing cancel cannot be
        // lost; removed when the dispatch task finishes.
        self.processing.insert(id.clone(), cancel.clone());
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.requests_dispatched += 1;
            stats.touch();
        }

        let processing = Arc::clone(&self.processing);
        let stats = Arc::clone(&self.stats);
        let write_tx = write_tx.clone();
        tokio::spawn(async move {
            let ctx = RequestContext {
                id: Some(id.clone()),
                cancel: cancel.clone(),
            };

            // The handler runs on its own task so a panic cannot take the
            // dispatch bookkeeping down with it.
            let mut invocation = tokio::spawn(async move { handler.handle(ctx, params).await });
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(McpError::RequestCancelled),
                joined = &mut invocation => match joined {
                    Ok(result) => result,
                    Err(join_err) if join_err.is_panic() => {
                        error!(method = %method, "handler panicked");
                        Err(McpError::internal(format!("handler for {} panicked", method)))
                    }
                    Err(_) => Err(McpError::RequestCancelled),
                },
            };
            // A cancelled dispatch abandons the handler at its next await
            // point; aborting a finished task is a no-op.
            if matches!(outcome, Err(McpError::RequestCancelled)) {
                invocation.abort();
            }

            processing.remove(&id);

            let response = match outcome {
                Ok(result) => JsonrpcResponse::success(id, result),
                Err(e) => {
                    if !matches!(e, McpError::RequestCancelled) {
                        warn!(method = %method, error = %e, "request failed");
                    }
                    JsonrpcResponse::error(id, e.to_wire())
                }
            };
            enqueue_response(&write_tx, response, &stats).await;
        });
    }
}

async fn enqueue_response(
    write_tx: &mpsc::Sender<String>,
    response: JsonrpcResponse,
    stats: &Arc<Mutex<RouterStats>>,
) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            if write_tx.send(line).await.is_ok() {
                let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.responses_sent += 1;
                stats.touch();
            }
        }
        Err(e) => error!(error = %e, "failed to serialise response"),
    }
}

fn spawn_fanout<T: Serialize + Send + 'static>(
    mut events: mpsc::Receiver<T>,
    method: McpMethod,
    write_tx: mpsc::Sender<String>,
    session: CancellationToken,
    stats: Arc<Mutex<RouterStats>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = session.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let params = match serde_json::to_value(&event) {
                        Ok(value) => value,
                        Err(e) => {
                            error!(method = %method, error = %e, "failed to serialise event");
                            continue;
                        }
                    };
                    let notification = JsonrpcNotification::new(method.clone(), Some(params));
                    let line = match serde_json::to_string(&notification) {
                        Ok(line) => line,
                        Err(e) => {
                            error!(method = %method, error = %e, "failed to serialise notification");
                            continue;
                        }
                    };
                    if write_tx.send(line).await.is_err() {
                        break;
                    }
                    let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.notifications_sent += 1;
                    stats.touch();
                }
            }
        }
    })
}

/// Single-writer drain of the outbound packet queue, shared by both peers.
pub(crate) async fn write_loop(
    writer: BoxedWriter,
    mut queue: mpsc::Receiver<String>,
    session: CancellationToken,
) {
    let mut framed = FrameWriter::new(writer);
    loop {
        tokio::select! {
            biased;
            line = queue.recv() => match line {
                Some(line) => {
                    if let Err(e) = framed.write_line(&line).await {
                        error!(error = %e, "write failed; ending session");
                        session.cancel();
                        break;
                    }
                }
                None => break,
            },
            _ = session.cancelled() => {
                // Flush what is already queued, discard the rest.
                while let Ok(line) = queue.try_recv() {
                    if framed.write_line(&line).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
}
