//! MCP server: wires primitives, the event bus and the router into one
//! session over a byte-stream transport.

pub mod event_bus;
pub mod handlers;
pub mod primitives;
pub(crate) mod router;

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{McpError, McpResult};
use crate::protocol::initialize::{
    Implementation, ServerCapabilities, ServerLogging, ServerPrompts, ServerResources, ServerTools,
};
use crate::protocol::logging::LoggingLevel;
use crate::transport::{BoxedReader, BoxedWriter, Transport};

pub use event_bus::{event_bus, EventSender, EventSink, EventStreams, LogSender};
pub use handlers::{LifecycleGate, RequestContext, RequestHandler};
pub use primitives::{
    FnTool, Page, PromptProvider, PromptSet, ResourceProvider, ResourceSet, StaticPrompts,
    StaticResources, StaticTools, ToolProvider, ToolSet, ToolUnit,
};
pub use router::RouterStats;

use handlers::{
    CallToolHandler, GetPromptHandler, InitializeHandler, InitializedHandler,
    ListPromptsHandler, ListResourceTemplatesHandler, ListResourcesHandler, ListToolsHandler,
    PingHandler, ReadResourceHandler, SetLevelHandler, SubscribeHandler, UnsubscribeHandler,
};
use router::Router;

/// Server identity and protocol settings; one value, no option layering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub protocol_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation::new("mcpkit-server", env!("CARGO_PKG_VERSION")),
            instructions: None,
            protocol_version: crate::protocol::PROTOCOL_VERSION.to_string(),
        }
    }
}

/// An MCP server hosting tool, resource and prompt primitives.
///
/// One `Server` value drives one session: the event bus is created with the
/// server and consumed by [`Server::serve`].
pub struct Server {
    config: ServerConfig,
    tools: Option<ToolSet>,
    resources: Option<ResourceSet>,
    prompts: Option<PromptSet>,
    min_log_severity: Arc<AtomicU8>,
    sink: EventSink,
    streams: Mutex<Option<EventStreams>>,
    stats: Arc<Mutex<RouterStats>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (sink, streams) = event_bus();
        Self {
            config,
            tools: None,
            resources: None,
            prompts: None,
            min_log_severity: Arc::new(AtomicU8::new(LoggingLevel::Info.severity())),
            sink,
            streams: Mutex::new(Some(streams)),
            stats: Arc::new(Mutex::new(RouterStats::default())),
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_resources(mut self, resources: ResourceSet) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Producer handles for the event bus, for plugin code that pushes
    /// notifications.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Handle for publishing `notifications/message` packets, filtered by the
    /// level the client configures via `logging/setLevel`.
    pub fn log_sender(&self) -> LogSender {
        LogSender::new(
            Arc::clone(&self.min_log_severity),
            self.sink.logging_message.clone(),
        )
    }

    /// Session traffic counters.
    pub fn stats(&self) -> RouterStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The capabilities this server advertises, derived from the registered
    /// primitive sets.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            logging: Some(ServerLogging {}),
            prompts: self.prompts.as_ref().map(|p| ServerPrompts {
                list_changed: p.list_changed(),
            }),
            resources: self.resources.as_ref().map(|r| ServerResources {
                subscribe: r.subscribe(),
                list_changed: r.list_changed(),
            }),
            tools: self.tools.as_ref().map(|t| ServerTools {
                list_changed: t.list_changed(),
            }),
            experimental: None,
        }
    }

    /// Connect the transport and serve the session until it ends.
    pub async fn run(
        &self,
        transport: &mut dyn Transport,
        shutdown: CancellationToken,
    ) -> McpResult<()> {
        let (reader, writer) = transport.connect().await?;
        self.serve(reader, writer, shutdown).await
    }

    /// Serve one session over pre-connected byte-stream halves.
    pub async fn serve(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
        shutdown: CancellationToken,
    ) -> McpResult<()> {
        let streams = self
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| McpError::internal("server session already consumed"))?;

        let gate = Arc::new(LifecycleGate::new());
        let mut handler_list: Vec<Arc<dyn RequestHandler>> = vec![
            Arc::new(InitializeHandler::new(
                self.config.protocol_version.clone(),
                self.capabilities(),
                self.config.server_info.clone(),
                self.config.instructions.clone(),
                Arc::clone(&gate),
            )),
            Arc::new(InitializedHandler::new(Arc::clone(&gate))),
            Arc::new(PingHandler),
            Arc::new(SetLevelHandler::new(Arc::clone(&self.min_log_severity))),
        ];

        if let Some(tools) = &self.tools {
            let provider = tools.provider();
            handler_list.push(Arc::new(ListToolsHandler::new(provider.clone())));
            handler_list.push(Arc::new(CallToolHandler::new(provider.clone())));
            if tools.list_changed() {
                provider
                    .watch_list_changed(self.sink.tool_list_changed.clone())
                    .await?;
            }
        }

        if let Some(resources) = &self.resources {
            let provider = resources.provider();
            handler_list.push(Arc::new(ListResourcesHandler::new(provider.clone())));
            handler_list.push(Arc::new(ReadResourceHandler::new(provider.clone())));
            handler_list.push(Arc::new(ListResourceTemplatesHandler::new(provider.clone())));
            // Subscribe handlers only exist when the capability is
            // advertised; otherwise the methods resolve to MethodNotFound.
            if resources.subscribe() {
                handler_list.push(Arc::new(SubscribeHandler::new(
                    provider.clone(),
                    self.sink.resource_updated.clone(),
                )));
                handler_list.push(Arc::new(UnsubscribeHandler::new(provider.clone())));
            }
            if resources.list_changed() {
                provider
                    .watch_list_changed(self.sink.resource_list_changed.clone())
                    .await?;
            }
        }

        if let Some(prompts) = &self.prompts {
            let provider = prompts.provider();
            handler_list.push(Arc::new(ListPromptsHandler::new(provider.clone())));
            handler_list.push(Arc::new(GetPromptHandler::new(provider.clone())));
            if prompts.list_changed() {
                provider
                    .watch_list_changed(self.sink.prompt_list_changed.clone())
                    .await?;
            }
        }

        info!(
            server = %self.config.server_info.name,
            "serving MCP session"
        );
        let router = Router::new(handler_list, gate, Arc::clone(&self.stats));
        router.run(reader, writer, streams, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_info.name, "mcpkit-server");
        assert_eq!(config.protocol_version, "2024-11-05");
        assert!(config.instructions.is_none());
    }

    #[test]
    fn test_capabilities_follow_registered_sets() {
        let bare = Server::new(ServerConfig::default());
        let caps = bare.capabilities();
        assert!(caps.logging.is_some());
        assert!(caps.tools.is_none());
        assert!(caps.resources.is_none());
        assert!(caps.prompts.is_none());

        let full = Server::new(ServerConfig::default())
            .with_tools(ToolSet::new(StaticTools::new()).with_list_changed(true))
            .with_resources(
                ResourceSet::new(StaticResources::new())
                    .with_subscribe(true)
                    .with_list_changed(true),
            )
            .with_prompts(PromptSet::new(StaticPrompts::new()));
        let caps = full.capabilities();
        assert!(caps.tools.unwrap().list_changed);
        let resources = caps.resources.unwrap();
        assert!(resources.subscribe);
        assert!(resources.list_changed);
        assert!(!caps.prompts.unwrap().list_changed);
    }

    #[tokio::test]
    async fn test_serve_consumes_session_once() {
        use crate::transport::MemoryTransport;

        let server = Server::new(ServerConfig::default());
        let (mut a, _b) = MemoryTransport::pair();
        let (reader, writer) = a.connect().await.unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        server
            .serve(reader, writer, shutdown.clone())
            .await
            .unwrap();

        let (mut c, _d) = MemoryTransport::pair();
        let err = server.run(&mut c, shutdown).await.unwrap_err();
        assert!(err.to_string().contains("already consumed"));
    }
}
