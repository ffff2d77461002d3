//! MCP client: connects a transport, runs the initialize handshake and
//! exposes the typed request surface. Inbound traffic is correlated back to
//! waiters; server-initiated requests (ping, roots, sampling) are served
//! from a small client-side handler table.

pub(crate) mod correlator;
pub mod incoming;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{McpError, McpResult};
use crate::protocol::constants::McpMethod;
use crate::protocol::initialize::{
    ClientCapabilities, ClientRoots, ClientSampling, Implementation, InitializeRequest,
    InitializeResult, InitializedNotification, ServerCapabilities,
};
use crate::protocol::jsonrpc::{JsonrpcNotification, JsonrpcRequest, RequestId};
use crate::protocol::lifecycle::{CancelledNotification, SessionState};
use crate::protocol::logging::{LoggingLevel, SetLevelRequest};
use crate::protocol::prompts::{GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult};
use crate::protocol::resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, SubscribeRequest,
    UnsubscribeRequest,
};
use crate::protocol::roots::{ListRootsResult, Root, RootsListChangedNotification};
use crate::protocol::sampling::{CreateMessageRequest, CreateMessageResult};
use crate::protocol::tools::{CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult};
use crate::server::handlers::{PingHandler, RequestContext, RequestHandler};
use crate::server::router::{write_loop, WRITE_QUEUE_CAPACITY};
use crate::transport::Transport;

use correlator::Correlator;
use incoming::{IncomingRouter, NotificationHandler};

/// Supplies the filesystem roots served to `roots/list`.
#[async_trait]
pub trait RootsProvider: Send + Sync {
    async fn list(&self) -> McpResult<Vec<Root>>;
}

/// Serves `sampling/createMessage` on behalf of the server.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, request: CreateMessageRequest)
        -> McpResult<CreateMessageResult>;
}

/// A roots provider plus the `listChanged` flag it advertises.
#[derive(Clone)]
pub struct RootsSet {
    provider: Arc<dyn RootsProvider>,
    list_changed: bool,
}

impl RootsSet {
    pub fn new<P: RootsProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            list_changed: false,
        }
    }

    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }
}

/// Client identity, protocol settings and the optional client-served
/// primitives; one value, no option layering.
#[derive(Clone)]
pub struct ClientConfig {
    pub client_info: Implementation,
    pub protocol_version: String,
    pub request_timeout: Duration,
    pub roots: Option<RootsSet>,
    pub sampling: Option<Arc<dyn SamplingHandler>>,
    pub experimental: Option<Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("mcpkit-client", env!("CARGO_PKG_VERSION")),
            protocol_version: crate::protocol::PROTOCOL_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
            roots: None,
            sampling: None,
            experimental: None,
        }
    }
}

/// Counters describing one client session's traffic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub notifications_received: u64,
    pub timeouts: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl ClientStats {
    pub(crate) fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }
}

struct ClientInner {
    config: ClientConfig,
    correlator: Arc<Correlator>,
    write_tx: RwLock<Option<mpsc::Sender<String>>>,
    root: CancellationToken,
    state: RwLock<SessionState>,
    initialized: AtomicBool,
    server_info: RwLock<Option<Implementation>>,
    server_capabilities: RwLock<Option<ServerCapabilities>>,
    instructions: RwLock<Option<String>>,
    notification_handlers: Arc<RwLock<HashMap<McpMethod, Arc<dyn NotificationHandler>>>>,
    processing: Arc<DashMap<RequestId, CancellationToken>>,
    stats: Arc<Mutex<ClientStats>>,
}

/// An MCP client. Cheap to clone; all clones share the session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                correlator: Arc::new(Correlator::new()),
                write_tx: RwLock::new(None),
                root: CancellationToken::new(),
                state: RwLock::new(SessionState::Connecting),
                initialized: AtomicBool::new(false),
                server_info: RwLock::new(None),
                server_capabilities: RwLock::new(None),
                instructions: RwLock::new(None),
                notification_handlers: Arc::new(RwLock::new(HashMap::new())),
                processing: Arc::new(DashMap::new()),
                stats: Arc::new(Mutex::new(ClientStats::default())),
            }),
        }
    }

    /// Register a notification handler for a method. May be called before or
    /// after connect; later registrations replace earlier ones.
    pub async fn on_notification<H: NotificationHandler + 'static>(
        &self,
        method: McpMethod,
        handler: H,
    ) {
        self.inner
            .notification_handlers
            .write()
            .await
            .insert(method, Arc::new(handler));
    }

    /// Connect the transport, start the session tasks and run the initialize
    /// handshake.
    pub async fn connect(&self, transport: &mut dyn Transport) -> McpResult<()> {
        let (reader, writer) = transport.connect().await?;

        let (write_tx, write_rx) = mpsc::channel::<String>(WRITE_QUEUE_CAPACITY);
        {
            let mut slot = self.inner.write_tx.write().await;
            if slot.is_some() {
                return Err(McpError::invalid_request("client already connected"));
            }
            *slot = Some(write_tx.clone());
        }

        // The session token is the client root itself: transport death ends
        // the whole client, and close() ends the session.
        let session = self.inner.root.clone();
        tokio::spawn(write_loop(writer, write_rx, session.clone()));

        let incoming = IncomingRouter {
            correlator: Arc::clone(&self.inner.correlator),
            notification_handlers: Arc::clone(&self.inner.notification_handlers),
            request_handlers: self.request_handlers(),
            processing: Arc::clone(&self.inner.processing),
            write_tx,
            stats: Arc::clone(&self.inner.stats),
        };
        tokio::spawn(incoming.run(reader, session));

        match self.initialize().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "initialize handshake failed");
                self.close().await;
                Err(e)
            }
        }
    }

    /// The handler table for server-initiated requests.
    fn request_handlers(&self) -> HashMap<McpMethod, Arc<dyn RequestHandler>> {
        let mut handlers: HashMap<McpMethod, Arc<dyn RequestHandler>> = HashMap::new();
        handlers.insert(McpMethod::ping(), Arc::new(PingHandler));
        if let Some(roots) = &self.inner.config.roots {
            handlers.insert(
                McpMethod::list_roots(),
                Arc::new(RootsHandler {
                    provider: Arc::clone(&roots.provider),
                }),
            );
        }
        if let Some(sampling) = &self.inner.config.sampling {
            handlers.insert(
                McpMethod::create_message(),
                Arc::new(CreateMessageHandler {
                    handler: Arc::clone(sampling),
                }),
            );
        }
        handlers
    }

    fn assemble_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: self.inner.config.roots.as_ref().map(|r| ClientRoots {
                list_changed: r.list_changed,
            }),
            sampling: self
                .inner
                .config
                .sampling
                .as_ref()
                .map(|_| ClientSampling {}),
            experimental: self.inner.config.experimental.clone(),
        }
    }

    async fn initialize(&self) -> McpResult<()> {
        {
            let mut state = self.inner.state.write().await;
            *state = SessionState::Initializing;
        }

        let params = serde_json::to_value(InitializeRequest {
            protocol_version: self.inner.config.protocol_version.clone(),
            capabilities: self.assemble_capabilities(),
            client_info: self.inner.config.client_info.clone(),
        })?;

        let result = self
            .send_request_raw(
                McpMethod::initialize(),
                Some(params),
                self.inner.config.request_timeout,
            )
            .await?;
        let result: InitializeResult = serde_json::from_value(result)?;

        if result.protocol_version != self.inner.config.protocol_version {
            warn!(
                client = %self.inner.config.protocol_version,
                server = %result.protocol_version,
                "protocol version mismatch; proceeding"
            );
        }
        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "initialize handshake complete"
        );

        *self.inner.server_info.write().await = Some(result.server_info);
        *self.inner.server_capabilities.write().await = Some(result.capabilities);
        *self.inner.instructions.write().await = result.instructions;

        self.send_notification(
            McpMethod::notification_initialized(),
            Some(serde_json::to_value(InitializedNotification::default())?),
        )
        .await?;

        *self.inner.state.write().await = SessionState::Ready;
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// True between a successful handshake and close/disconnect.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst) && !self.inner.root.is_cancelled()
    }

    pub async fn state(&self) -> SessionState {
        if self.inner.root.is_cancelled() {
            return SessionState::Closed;
        }
        *self.inner.state.read().await
    }

    pub async fn server_info(&self) -> Option<Implementation> {
        self.inner.server_info.read().await.clone()
    }

    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.inner.server_capabilities.read().await.clone()
    }

    pub async fn instructions(&self) -> Option<String> {
        self.inner.instructions.read().await.clone()
    }

    pub fn stats(&self) -> ClientStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// End the session: cancel every task and free all waiters.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.write().await;
            *state = SessionState::Closing;
        }
        self.inner.root.cancel();
        self.inner.correlator.abort_all();
        self.inner.initialized.store(false, Ordering::SeqCst);
        let mut state = self.inner.state.write().await;
        *state = SessionState::Closed;
    }

    async fn send_request(&self, method: McpMethod, params: Option<Value>) -> McpResult<Value> {
        if !self.is_initialized() {
            return Err(McpError::request_failed("session not ready"));
        }
        self.send_request_raw(method, params, self.inner.config.request_timeout)
            .await
    }

    async fn send_request_raw(
        &self,
        method: McpMethod,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        let id = self.inner.correlator.next_id();
        let waiter = self.inner.correlator.register(id.clone());

        let request = JsonrpcRequest::new(id.clone(), method, params);
        let line = serde_json::to_string(&request)?;

        let write_tx = {
            let slot = self.inner.write_tx.read().await;
            slot.clone().ok_or(McpError::ConnectionClosed)?
        };
        if write_tx.send(line).await.is_err() {
            self.inner.correlator.forget(&id);
            return Err(McpError::ConnectionClosed);
        }
        {
            let mut stats = self.inner.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.requests_sent += 1;
            stats.touch();
        }

        tokio::select! {
            delivered = waiter => match delivered {
                Ok(response) => {
                    {
                        let mut stats = self.inner.stats.lock().unwrap_or_else(|e| e.into_inner());
                        stats.responses_received += 1;
                        stats.touch();
                    }
                    match response.error {
                        Some(err) => Err(McpError::from_wire(err)),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    }
                }
                Err(_) => Err(McpError::ConnectionClosed),
            },
            _ = tokio::time::sleep(timeout) => {
                self.inner.correlator.forget(&id);
                {
                    let mut stats = self.inner.stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.timeouts += 1;
                    stats.touch();
                }
                self.try_send_cancel(&write_tx, id);
                Err(McpError::timeout(timeout.as_millis() as u64))
            }
            _ = self.inner.root.cancelled() => {
                self.inner.correlator.forget(&id);
                Err(McpError::ConnectionClosed)
            }
        }
    }

    /// Best-effort `notifications/canceled`; its absence is not an error.
    fn try_send_cancel(&self, write_tx: &mpsc::Sender<String>, id: RequestId) {
        let params = match serde_json::to_value(CancelledNotification::new(id)) {
            Ok(v) => v,
            Err(_) => return,
        };
        let notification =
            JsonrpcNotification::new(McpMethod::notification_cancelled(), Some(params));
        if let Ok(line) = serde_json::to_string(&notification) {
            if write_tx.try_send(line).is_err() {
                debug!("cancel notification dropped; write queue saturated");
            }
        }
    }

    /// Send a notification packet. Notifications never elicit a response.
    pub async fn send_notification(
        &self,
        method: McpMethod,
        params: Option<Value>,
    ) -> McpResult<()> {
        let notification = JsonrpcNotification::new(method, params);
        let line = serde_json::to_string(&notification)?;
        let write_tx = {
            let slot = self.inner.write_tx.read().await;
            slot.clone().ok_or(McpError::ConnectionClosed)?
        };
        write_tx
            .send(line)
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    /// Liveness probe; returns the round-trip time.
    pub async fn ping(&self) -> McpResult<Duration> {
        let start = std::time::Instant::now();
        // Allowed in any non-closed state.
        self.send_request_raw(
            McpMethod::ping(),
            Some(Value::Object(serde_json::Map::new())),
            self.inner.config.request_timeout,
        )
        .await?;
        Ok(start.elapsed())
    }

    pub async fn list_tools(&self, cursor: Option<String>) -> McpResult<ListToolsResult> {
        let result = self
            .send_request(
                McpMethod::list_tools(),
                Some(serde_json::to_value(ListToolsRequest { cursor })?),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn call_tool(&self, request: CallToolRequest) -> McpResult<CallToolResult> {
        let result = self
            .send_request(McpMethod::call_tool(), Some(serde_json::to_value(request)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn list_resources(&self, cursor: Option<String>) -> McpResult<ListResourcesResult> {
        let result = self
            .send_request(
                McpMethod::list_resources(),
                Some(serde_json::to_value(ListResourcesRequest { cursor })?),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        let result = self
            .send_request(
                McpMethod::read_resource(),
                Some(serde_json::to_value(ReadResourceRequest { uri: uri.into() })?),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        self.send_request(
            McpMethod::subscribe_resource(),
            Some(serde_json::to_value(SubscribeRequest { uri: uri.into() })?),
        )
        .await?;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        self.send_request(
            McpMethod::unsubscribe_resource(),
            Some(serde_json::to_value(UnsubscribeRequest { uri: uri.into() })?),
        )
        .await?;
        Ok(())
    }

    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> McpResult<ListResourceTemplatesResult> {
        let result = self
            .send_request(
                McpMethod::list_resource_templates(),
                Some(serde_json::to_value(ListResourceTemplatesRequest { cursor })?),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn list_prompts(&self, cursor: Option<String>) -> McpResult<ListPromptsResult> {
        let result = self
            .send_request(
                McpMethod::list_prompts(),
                Some(serde_json::to_value(ListPromptsRequest { cursor })?),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_prompt(&self, request: GetPromptRequest) -> McpResult<GetPromptResult> {
        let result = self
            .send_request(McpMethod::get_prompt(), Some(serde_json::to_value(request)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Ask the server to only emit log notifications at `level` or above.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        self.send_request(
            McpMethod::set_level(),
            Some(serde_json::to_value(SetLevelRequest { level })?),
        )
        .await?;
        Ok(())
    }

    /// Tell the server the roots list changed.
    pub async fn notify_roots_list_changed(&self) -> McpResult<()> {
        self.send_notification(
            McpMethod::notification_roots_list_changed(),
            Some(serde_json::to_value(RootsListChangedNotification::default())?),
        )
        .await
    }
}

/// Serves `roots/list` from the configured provider.
struct RootsHandler {
    provider: Arc<dyn RootsProvider>,
}

#[async_trait]
impl RequestHandler for RootsHandler {
    fn method(&self) -> McpMethod {
        McpMethod::list_roots()
    }

    async fn handle(&self, _ctx: RequestContext, _params: Value) -> McpResult<Value> {
        let roots = self.provider.list().await?;
        Ok(serde_json::to_value(ListRootsResult { roots, meta: None })?)
    }
}

/// Serves `sampling/createMessage` from the configured handler.
struct CreateMessageHandler {
    handler: Arc<dyn SamplingHandler>,
}

#[async_trait]
impl RequestHandler for CreateMessageHandler {
    fn method(&self) -> McpMethod {
        McpMethod::create_message()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: CreateMessageRequest = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(e.to_string()))?;
        let result = self.handler.create_message(request).await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.client_info.name, "mcpkit-client");
        assert_eq!(config.protocol_version, "2024-11-05");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.roots.is_none());
    }

    #[test]
    fn test_capability_assembly() {
        struct NoRoots;
        #[async_trait]
        impl RootsProvider for NoRoots {
            async fn list(&self) -> McpResult<Vec<Root>> {
                Ok(Vec::new())
            }
        }

        let bare = Client::new(ClientConfig::default());
        let caps = bare.assemble_capabilities();
        assert!(caps.roots.is_none());
        assert!(caps.sampling.is_none());

        let config = ClientConfig {
            roots: Some(RootsSet::new(NoRoots).with_list_changed(true)),
            ..ClientConfig::default()
        };
        let client = Client::new(config);
        let caps = client.assemble_capabilities();
        assert!(caps.roots.unwrap().list_changed);
    }

    #[tokio::test]
    async fn test_request_before_connect_fails() {
        let client = Client::new(ClientConfig::default());
        let err = client.list_tools(None).await.unwrap_err();
        assert!(err.to_string().contains("not ready"));
        assert!(!client.is_initialized());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = Client::new(ClientConfig::default());
        client.close().await;
        client.close().await;
        assert_eq!(client.state().await, SessionState::Closed);
    }
}
