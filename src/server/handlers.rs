//! Built-in method handlers and the handler seam the router dispatches into.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{McpError, McpResult};
use crate::protocol::constants::McpMethod;
use crate::protocol::initialize::{
    Implementation, InitializeRequest, InitializeResult, ServerCapabilities,
};
use crate::protocol::jsonrpc::RequestId;
use crate::protocol::lifecycle::SessionState;
use crate::protocol::logging::{SetLevelRequest, SetLevelResult};
use crate::protocol::prompts::{GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult};
use crate::protocol::resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, ResourceUpdatedNotification,
    SubscribeRequest, SubscribeResult, UnsubscribeRequest, UnsubscribeResult,
};
use crate::protocol::tools::{CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult};
use crate::server::event_bus::EventSender;
use crate::server::primitives::{PromptProvider, ResourceProvider, ToolProvider};

/// Per-request context handed to a handler: the request id (absent for
/// notifications) and the cancellation token for this dispatch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Option<RequestId>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn detached() -> Self {
        Self {
            id: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// A method handler the router can dispatch to.
///
/// Handlers decode their own params exactly once and return the result
/// payload; the router owns response framing and error mapping.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn method(&self) -> McpMethod;

    async fn handle(&self, ctx: RequestContext, params: Value) -> McpResult<Value>;
}

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> McpResult<T> {
    serde_json::from_value(params).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(McpError::from)
}

/// Tracks the session lifecycle state and gates inbound requests on it.
pub struct LifecycleGate {
    state: RwLock<SessionState>,
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Connecting),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn advance(&self, to: SessionState) {
        let mut state = self.state.write().await;
        info!(from = %state, to = %to, "session state change");
        *state = to;
    }

    /// Check whether a request method is allowed in the current state.
    ///
    /// `ping` passes in any non-closed state; `initialize` only before the
    /// handshake completed; everything else requires `Ready`.
    pub async fn check_request(&self, method: &McpMethod) -> McpResult<()> {
        let state = self.state().await;
        match method.as_str() {
            "ping" => {
                if state == SessionState::Closed {
                    Err(McpError::ConnectionClosed)
                } else {
                    Ok(())
                }
            }
            "initialize" => match state {
                SessionState::Connecting | SessionState::Initializing => Ok(()),
                _ => Err(McpError::invalid_request("session already initialized")),
            },
            _ => match state {
                SessionState::Ready => Ok(()),
                _ => Err(McpError::ServerNotInitialized),
            },
        }
    }
}

/// Handles `initialize`.
pub struct InitializeHandler {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: Implementation,
    instructions: Option<String>,
    gate: Arc<LifecycleGate>,
}

impl InitializeHandler {
    pub fn new(
        protocol_version: String,
        capabilities: ServerCapabilities,
        server_info: Implementation,
        instructions: Option<String>,
        gate: Arc<LifecycleGate>,
    ) -> Self {
        Self {
            protocol_version,
            capabilities,
            server_info,
            instructions,
            gate,
        }
    }
}

#[async_trait]
impl RequestHandler for InitializeHandler {
    fn method(&self) -> McpMethod {
        McpMethod::initialize()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: InitializeRequest = decode(params)?;

        if request.protocol_version != self.protocol_version {
            warn!(
                client = %request.protocol_version,
                server = %self.protocol_version,
                "protocol version mismatch; proceeding"
            );
        }
        info!(
            client = %request.client_info.name,
            version = %request.client_info.version,
            "initialize received"
        );

        self.gate.advance(SessionState::Initializing).await;

        encode(&InitializeResult {
            protocol_version: self.protocol_version.clone(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        })
    }
}

/// Handles the `notifications/initialized` notification.
pub struct InitializedHandler {
    gate: Arc<LifecycleGate>,
}

impl InitializedHandler {
    pub fn new(gate: Arc<LifecycleGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl RequestHandler for InitializedHandler {
    fn method(&self) -> McpMethod {
        McpMethod::notification_initialized()
    }

    async fn handle(&self, _ctx: RequestContext, _params: Value) -> McpResult<Value> {
        self.gate.advance(SessionState::Ready).await;
        Ok(Value::Null)
    }
}

/// Handles `ping` with an empty result.
pub struct PingHandler;

#[async_trait]
impl RequestHandler for PingHandler {
    fn method(&self) -> McpMethod {
        McpMethod::ping()
    }

    async fn handle(&self, _ctx: RequestContext, _params: Value) -> McpResult<Value> {
        Ok(Value::Object(serde_json::Map::new()))
    }
}

/// Handles `logging/setLevel`, adjusting the shared threshold.
pub struct SetLevelHandler {
    min_severity: Arc<AtomicU8>,
}

impl SetLevelHandler {
    pub fn new(min_severity: Arc<AtomicU8>) -> Self {
        Self { min_severity }
    }
}

#[async_trait]
impl RequestHandler for SetLevelHandler {
    fn method(&self) -> McpMethod {
        McpMethod::set_level()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: SetLevelRequest = decode(params)?;
        self.min_severity
            .store(request.level.severity(), Ordering::Relaxed);
        encode(&SetLevelResult::default())
    }
}

/// Handles `tools/list`.
pub struct ListToolsHandler {
    provider: Arc<dyn ToolProvider>,
}

impl ListToolsHandler {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for ListToolsHandler {
    fn method(&self) -> McpMethod {
        McpMethod::list_tools()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: ListToolsRequest = decode(params)?;
        let (tools, next_cursor) = self.provider.list(request.cursor).await?;
        encode(&ListToolsResult {
            tools,
            next_cursor,
            meta: None,
        })
    }
}

/// Handles `tools/call`.
pub struct CallToolHandler {
    provider: Arc<dyn ToolProvider>,
}

impl CallToolHandler {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for CallToolHandler {
    fn method(&self) -> McpMethod {
        McpMethod::call_tool()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: CallToolRequest = decode(params)?;
        let args = request
            .arguments
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let outcome = self.provider.call(&request.name, args).await?;
        encode(&CallToolResult {
            is_error: outcome.is_error,
            content: outcome.content,
            meta: None,
        })
    }
}

/// Handles `resources/list`.
pub struct ListResourcesHandler {
    provider: Arc<dyn ResourceProvider>,
}

impl ListResourcesHandler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for ListResourcesHandler {
    fn method(&self) -> McpMethod {
        McpMethod::list_resources()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: ListResourcesRequest = decode(params)?;
        let (resources, next_cursor) = self.provider.list(request.cursor).await?;
        encode(&ListResourcesResult {
            resources,
            next_cursor,
            meta: None,
        })
    }
}

/// Handles `resources/read`.
pub struct ReadResourceHandler {
    provider: Arc<dyn ResourceProvider>,
}

impl ReadResourceHandler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for ReadResourceHandler {
    fn method(&self) -> McpMethod {
        McpMethod::read_resource()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: ReadResourceRequest = decode(params)?;
        let contents = self.provider.read(&request.uri).await?;
        encode(&ReadResourceResult {
            contents,
            meta: None,
        })
    }
}

/// Handles `resources/templates/list`.
pub struct ListResourceTemplatesHandler {
    provider: Arc<dyn ResourceProvider>,
}

impl ListResourceTemplatesHandler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for ListResourceTemplatesHandler {
    fn method(&self) -> McpMethod {
        McpMethod::list_resource_templates()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let _request: ListResourceTemplatesRequest = decode(params)?;
        encode(&ListResourceTemplatesResult {
            resource_templates: self.provider.templates(),
            next_cursor: None,
            meta: None,
        })
    }
}

/// Handles `resources/subscribe`, wiring the provider to the update channel.
pub struct SubscribeHandler {
    provider: Arc<dyn ResourceProvider>,
    updates: EventSender<ResourceUpdatedNotification>,
}

impl SubscribeHandler {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        updates: EventSender<ResourceUpdatedNotification>,
    ) -> Self {
        Self { provider, updates }
    }
}

#[async_trait]
impl RequestHandler for SubscribeHandler {
    fn method(&self) -> McpMethod {
        McpMethod::subscribe_resource()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: SubscribeRequest = decode(params)?;
        self.provider
            .subscribe(&request.uri, self.updates.clone())
            .await?;
        encode(&SubscribeResult::default())
    }
}

/// Handles `resources/unsubscribe`.
pub struct UnsubscribeHandler {
    provider: Arc<dyn ResourceProvider>,
}

impl UnsubscribeHandler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for UnsubscribeHandler {
    fn method(&self) -> McpMethod {
        McpMethod::unsubscribe_resource()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: UnsubscribeRequest = decode(params)?;
        self.provider.unsubscribe(&request.uri).await?;
        encode(&UnsubscribeResult::default())
    }
}

/// Handles `prompts/list`.
pub struct ListPromptsHandler {
    provider: Arc<dyn PromptProvider>,
}

impl ListPromptsHandler {
    pub fn new(provider: Arc<dyn PromptProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for ListPromptsHandler {
    fn method(&self) -> McpMethod {
        McpMethod::list_prompts()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: ListPromptsRequest = decode(params)?;
        let (prompts, next_cursor) = self.provider.list(request.cursor).await?;
        encode(&ListPromptsResult {
            prompts,
            next_cursor,
            meta: None,
        })
    }
}

/// Handles `prompts/get`.
pub struct GetPromptHandler {
    provider: Arc<dyn PromptProvider>,
}

impl GetPromptHandler {
    pub fn new(provider: Arc<dyn PromptProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestHandler for GetPromptHandler {
    fn method(&self) -> McpMethod {
        McpMethod::get_prompt()
    }

    async fn handle(&self, _ctx: RequestContext, params: Value) -> McpResult<Value> {
        let request: GetPromptRequest = decode(params)?;
        let (description, messages) = self.provider.get(&request.name, request.arguments).await?;
        encode(&GetPromptResult {
            description,
            messages,
            meta: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::initialize::ClientCapabilities;
    use serde_json::json;

    fn init_request_params() -> Value {
        serde_json::to_value(InitializeRequest {
            protocol_version: crate::protocol::PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new("test-client", "0.0.1"),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_advances_state_and_reports_capabilities() {
        let gate = Arc::new(LifecycleGate::new());
        let handler = InitializeHandler::new(
            crate::protocol::PROTOCOL_VERSION.to_string(),
            ServerCapabilities::default(),
            Implementation::new("test-server", "0.0.1"),
            Some("be gentle".to_string()),
            Arc::clone(&gate),
        );

        let result = handler
            .handle(RequestContext::detached(), init_request_params())
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert_eq!(result["serverInfo"]["name"], json!("test-server"));
        assert_eq!(result["instructions"], json!("be gentle"));
        assert_eq!(gate.state().await, SessionState::Initializing);
    }

    #[tokio::test]
    async fn test_initialized_notification_reaches_ready() {
        let gate = Arc::new(LifecycleGate::new());
        gate.advance(SessionState::Initializing).await;
        let handler = InitializedHandler::new(Arc::clone(&gate));
        handler
            .handle(RequestContext::detached(), json!({}))
            .await
            .unwrap();
        assert_eq!(gate.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn test_gate_blocks_before_ready() {
        let gate = LifecycleGate::new();
        assert!(gate.check_request(&McpMethod::initialize()).await.is_ok());
        assert!(gate.check_request(&McpMethod::ping()).await.is_ok());

        let err = gate
            .check_request(&McpMethod::list_tools())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(-32003));

        gate.advance(SessionState::Ready).await;
        assert!(gate.check_request(&McpMethod::list_tools()).await.is_ok());
        assert!(gate.check_request(&McpMethod::initialize()).await.is_err());
    }

    #[tokio::test]
    async fn test_ping_returns_empty_object() {
        let result = PingHandler
            .handle(RequestContext::detached(), json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn test_set_level_updates_shared_threshold() {
        let severity = Arc::new(AtomicU8::new(1));
        let handler = SetLevelHandler::new(Arc::clone(&severity));
        handler
            .handle(RequestContext::detached(), json!({"level": "error"}))
            .await
            .unwrap();
        assert_eq!(severity.load(Ordering::Relaxed), 4);

        let err = handler
            .handle(RequestContext::detached(), json!({"level": "loud"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(-32602));
    }
}
