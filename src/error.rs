//! Error handling for the MCP framework
//!
//! A single crate-wide error enum built with thiserror. Protocol-visible
//! variants carry the JSON-RPC error code they map to; everything else is
//! reported with code -1 when it has to cross the wire.

use thiserror::Error;

use crate::protocol::constants::error_codes;
use crate::protocol::jsonrpc::JsonrpcError;

/// Result type alias for MCP operations
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Error enumeration covering protocol, application, lifecycle, cancellation
/// and transport failures.
#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed JSON on the wire
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Structurally invalid JSON-RPC packet
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// No handler registered for the method
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    /// Parameters failed to decode or validate
    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    /// Handler fault or other internal failure
    #[error("internal error: {message}")]
    Internal { message: String },

    /// The request was cancelled before completion
    #[error("request cancelled")]
    RequestCancelled,

    /// A request failed for an application-level reason
    #[error("request failed: {message}")]
    RequestFailed { message: String },

    /// An MCP method arrived before the initialize handshake finished
    #[error("server not initialized")]
    ServerNotInitialized,

    /// No resource exists for the URI
    #[error("resource not found: {uri}")]
    ResourceNotFound { uri: String },

    /// No tool registered under the name
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// No prompt registered under the name
    #[error("prompt not found: {name}")]
    PromptNotFound { name: String },

    /// Reading a resource failed
    #[error("resource read error: {message}")]
    ResourceRead { message: String },

    /// A tool invocation failed out-of-band
    #[error("tool execution error: {message}")]
    ToolExecution { message: String },

    /// Rendering a prompt failed
    #[error("prompt execution error: {message}")]
    PromptExecution { message: String },

    /// Establishing a resource watch failed
    #[error("resource subscribe error: {message}")]
    ResourceSubscribe { message: String },

    /// Tearing down a resource watch failed
    #[error("resource unsubscribe error: {message}")]
    ResourceUnsubscribe { message: String },

    /// An error response received from the remote peer
    #[error("remote error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    /// Transport-level failure, fatal to the session
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure outside the frame codec
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request did not complete within its deadline
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The session's write queue or a waiter slot is gone
    #[error("connection closed")]
    ConnectionClosed,
}

impl McpError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }

    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::ResourceNotFound { uri: uri.into() }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn prompt_not_found(name: impl Into<String>) -> Self {
        Self::PromptNotFound { name: name.into() }
    }

    pub fn resource_read(message: impl Into<String>) -> Self {
        Self::ResourceRead {
            message: message.into(),
        }
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::ToolExecution {
            message: message.into(),
        }
    }

    pub fn prompt_execution(message: impl Into<String>) -> Self {
        Self::PromptExecution {
            message: message.into(),
        }
    }

    pub fn resource_subscribe(message: impl Into<String>) -> Self {
        Self::ResourceSubscribe {
            message: message.into(),
        }
    }

    pub fn resource_unsubscribe(message: impl Into<String>) -> Self {
        Self::ResourceUnsubscribe {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// The JSON-RPC code for protocol-visible variants.
    ///
    /// Returns `None` for errors with no defined wire code; those are
    /// reported as -1 by [`McpError::to_wire`].
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Parse { .. } => Some(error_codes::PARSE_ERROR),
            Self::InvalidRequest { .. } => Some(error_codes::INVALID_REQUEST),
            Self::MethodNotFound { .. } => Some(error_codes::METHOD_NOT_FOUND),
            Self::InvalidParams { .. } => Some(error_codes::INVALID_PARAMS),
            Self::Internal { .. } => Some(error_codes::INTERNAL_ERROR),
            Self::RequestCancelled => Some(error_codes::REQUEST_CANCELLED),
            Self::RequestFailed { .. } => Some(error_codes::REQUEST_FAILED),
            Self::ServerNotInitialized => Some(error_codes::SERVER_NOT_INITIALIZED),
            Self::ResourceNotFound { .. } => Some(error_codes::RESOURCE_NOT_FOUND),
            Self::ToolNotFound { .. } => Some(error_codes::TOOL_NOT_FOUND),
            Self::PromptNotFound { .. } => Some(error_codes::PROMPT_NOT_FOUND),
            Self::ResourceRead { .. } => Some(error_codes::RESOURCE_READ_ERROR),
            Self::ToolExecution { .. } => Some(error_codes::TOOL_EXECUTION_ERROR),
            Self::PromptExecution { .. } => Some(error_codes::PROMPT_EXECUTION_ERROR),
            Self::ResourceSubscribe { .. } => Some(error_codes::RESOURCE_SUBSCRIBE_ERROR),
            Self::ResourceUnsubscribe { .. } => Some(error_codes::RESOURCE_UNSUBSCRIBE_ERROR),
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Convert into the wire-level error object for a JSON-RPC response.
    pub fn to_wire(&self) -> JsonrpcError {
        JsonrpcError {
            code: self.code().unwrap_or(-1),
            message: self.to_string(),
            data: None,
        }
    }

    /// Reconstruct from a wire-level error object received from the peer.
    pub fn from_wire(err: JsonrpcError) -> Self {
        Self::Rpc {
            code: err.code,
            message: err.message,
        }
    }

    /// Whether this error ends the session rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Io(_) | Self::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_code_mapping() {
        assert_eq!(McpError::parse("x").code(), Some(-32700));
        assert_eq!(McpError::method_not_found("y").code(), Some(-32601));
        assert_eq!(McpError::RequestCancelled.code(), Some(-32000));
        assert_eq!(McpError::ServerNotInitialized.code(), Some(-32003));
        assert_eq!(McpError::resource_unsubscribe("z").code(), Some(-32011));
        assert_eq!(McpError::transport("down").code(), None);
    }

    #[test]
    fn test_to_wire_defaults_to_minus_one() {
        let wire = McpError::transport("broken pipe").to_wire();
        assert_eq!(wire.code, -1);
        assert!(wire.message.contains("broken pipe"));
        assert!(wire.data.is_none());
    }

    #[test]
    fn test_from_wire_round_trip() {
        let original = JsonrpcError {
            code: -32005,
            message: "tool not found: frobnicate".to_string(),
            data: None,
        };
        let err = McpError::from_wire(original);
        assert_eq!(err.code(), Some(-32005));
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(McpError::transport("x").is_fatal());
        assert!(McpError::ConnectionClosed.is_fatal());
        assert!(!McpError::RequestCancelled.is_fatal());
        assert!(!McpError::tool_not_found("t").is_fatal());
    }
}
