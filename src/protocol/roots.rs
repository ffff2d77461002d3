//! Roots data model: filesystem boundaries the client exposes to the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A root directory or file the server may operate within.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Must be a `file://` URI.
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// `roots/list` request payload (server -> client).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRootsRequest {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// `roots/list` result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Payload of `notifications/roots/list_changed` (client -> server).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsListChangedNotification {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}
