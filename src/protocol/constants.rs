//! Protocol constants: version strings, method names and error codes.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The MCP protocol revision this crate speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version carried by every packet.
pub const JSONRPC_VERSION: &str = "2.0";

/// A namespaced MCP method name (`area/verb`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct McpMethod(String);

impl McpMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Lifecycle
    pub fn initialize() -> Self {
        Self::new(methods::INITIALIZE)
    }

    pub fn ping() -> Self {
        Self::new(methods::PING)
    }

    // Tools
    pub fn list_tools() -> Self {
        Self::new(methods::LIST_TOOLS)
    }

    pub fn call_tool() -> Self {
        Self::new(methods::CALL_TOOL)
    }

    // Resources
    pub fn list_resources() -> Self {
        Self::new(methods::LIST_RESOURCES)
    }

    pub fn read_resource() -> Self {
        Self::new(methods::READ_RESOURCE)
    }

    pub fn subscribe_resource() -> Self {
        Self::new(methods::SUBSCRIBE_RESOURCE)
    }

    pub fn unsubscribe_resource() -> Self {
        Self::new(methods::UNSUBSCRIBE_RESOURCE)
    }

    pub fn list_resource_templates() -> Self {
        Self::new(methods::LIST_RESOURCE_TEMPLATES)
    }

    // Prompts
    pub fn list_prompts() -> Self {
        Self::new(methods::LIST_PROMPTS)
    }

    pub fn get_prompt() -> Self {
        Self::new(methods::GET_PROMPT)
    }

    // Roots and sampling (server -> client)
    pub fn list_roots() -> Self {
        Self::new(methods::LIST_ROOTS)
    }

    pub fn create_message() -> Self {
        Self::new(methods::CREATE_MESSAGE)
    }

    // Logging
    pub fn set_level() -> Self {
        Self::new(methods::SET_LEVEL)
    }

    // Notifications
    pub fn notification_initialized() -> Self {
        Self::new(notifications::INITIALIZED)
    }

    pub fn notification_cancelled() -> Self {
        Self::new(notifications::CANCELLED)
    }

    pub fn notification_progress() -> Self {
        Self::new(notifications::PROGRESS)
    }

    pub fn notification_tools_list_changed() -> Self {
        Self::new(notifications::TOOLS_LIST_CHANGED)
    }

    pub fn notification_resources_list_changed() -> Self {
        Self::new(notifications::RESOURCES_LIST_CHANGED)
    }

    pub fn notification_resources_updated() -> Self {
        Self::new(notifications::RESOURCES_UPDATED)
    }

    pub fn notification_prompts_list_changed() -> Self {
        Self::new(notifications::PROMPTS_LIST_CHANGED)
    }

    pub fn notification_roots_list_changed() -> Self {
        Self::new(notifications::ROOTS_LIST_CHANGED)
    }

    pub fn notification_message() -> Self {
        Self::new(notifications::MESSAGE)
    }
}

impl Display for McpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for McpMethod {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for McpMethod {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Request method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";

    pub const LIST_TOOLS: &str = "tools/list";
    pub const CALL_TOOL: &str = "tools/call";

    pub const LIST_RESOURCES: &str = "resources/list";
    pub const READ_RESOURCE: &str = "resources/read";
    pub const SUBSCRIBE_RESOURCE: &str = "resources/subscribe";
    pub const UNSUBSCRIBE_RESOURCE: &str = "resources/unsubscribe";
    pub const LIST_RESOURCE_TEMPLATES: &str = "resources/templates/list";

    pub const LIST_PROMPTS: &str = "prompts/list";
    pub const GET_PROMPT: &str = "prompts/get";

    pub const LIST_ROOTS: &str = "roots/list";
    pub const CREATE_MESSAGE: &str = "sampling/createMessage";

    pub const SET_LEVEL: &str = "logging/setLevel";
}

/// Notification method names.
pub mod notifications {
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/canceled";
    pub const PROGRESS: &str = "notifications/progress";

    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

    pub const MESSAGE: &str = "notifications/message";
}

/// JSON-RPC and MCP error codes.
pub mod error_codes {
    // Standard JSON-RPC codes
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // MCP-specific codes start at -32000
    pub const REQUEST_CANCELLED: i64 = -32000;
    pub const CONTENT_MODIFIED: i64 = -32001;
    pub const REQUEST_FAILED: i64 = -32002;
    pub const SERVER_NOT_INITIALIZED: i64 = -32003;
    pub const RESOURCE_NOT_FOUND: i64 = -32004;
    pub const TOOL_NOT_FOUND: i64 = -32005;
    pub const PROMPT_NOT_FOUND: i64 = -32006;
    pub const RESOURCE_READ_ERROR: i64 = -32007;
    pub const TOOL_EXECUTION_ERROR: i64 = -32008;
    pub const PROMPT_EXECUTION_ERROR: i64 = -32009;
    pub const RESOURCE_SUBSCRIBE_ERROR: i64 = -32010;
    pub const RESOURCE_UNSUBSCRIBE_ERROR: i64 = -32011;
}
