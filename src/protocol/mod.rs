//! MCP wire data model: JSON-RPC packets, lifecycle payloads and the
//! tool/resource/prompt/logging/roots/sampling type families.

pub mod constants;
pub mod initialize;
pub mod jsonrpc;
pub mod lifecycle;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use constants::{McpMethod, JSONRPC_VERSION, PROTOCOL_VERSION};
pub use initialize::{
    ClientCapabilities, ClientRoots, ClientSampling, Implementation, InitializeRequest,
    InitializeResult, InitializedNotification, ServerCapabilities, ServerLogging, ServerPrompts,
    ServerResources, ServerTools,
};
pub use jsonrpc::{
    JsonrpcError, JsonrpcNotification, JsonrpcPacket, JsonrpcRequest, JsonrpcResponse, RequestId,
};
pub use lifecycle::{CancelledNotification, ProgressNotification, ProgressToken, SessionState};
pub use logging::{LoggingLevel, LoggingMessageNotification, SetLevelRequest, SetLevelResult};
pub use prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult, Prompt,
    PromptArgument, PromptListChangedNotification, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource,
    ResourceContent, ResourceListChangedNotification, ResourceTemplate,
    ResourceUpdatedNotification, SubscribeRequest, SubscribeResult, UnsubscribeRequest,
    UnsubscribeResult,
};
pub use roots::{ListRootsRequest, ListRootsResult, Root, RootsListChangedNotification};
pub use sampling::{
    Annotations, ContextInclusion, CreateMessageRequest, CreateMessageResult, ModelHint,
    ModelPreferences, Role, SamplingMessage,
};
pub use tools::{
    CallToolRequest, CallToolResult, Content, ListToolsRequest, ListToolsResult, Tool,
    ToolListChangedNotification, ToolOutcome,
};
