//! JSON-RPC 2.0 packet model.
//!
//! Three packet shapes share the wire fields `{jsonrpc, id?, method?,
//! params?, result?, error?}`: requests carry `id` + `method`, notifications
//! carry `method` only, responses carry `id` and exactly one of `result` or
//! `error`. Payloads stay as [`serde_json::Value`] and are decoded once per
//! handler invocation.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{McpError, McpResult};
use crate::protocol::constants::{McpMethod, JSONRPC_VERSION};

/// A request identifier: an integer or a string, opaque to the peer.
///
/// This crate issues monotonically increasing integers; both forms are
/// accepted on the wire. Any other JSON type fails packet decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Str(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::Str(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Str(s.to_string())
    }
}

/// A request expecting exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonrpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: McpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonrpcRequest {
    pub fn new(id: RequestId, method: McpMethod, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params,
        }
    }

    /// The params payload, with `{}` standing in for an absent field.
    pub fn take_params(&mut self) -> Value {
        self.params
            .take()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::invalid_request("jsonrpc version must be 2.0"));
        }
        if self.method.as_str().is_empty() {
            return Err(McpError::invalid_request("method must not be empty"));
        }
        Ok(())
    }
}

/// A notification: fire-and-forget, never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonrpcNotification {
    pub jsonrpc: String,
    pub method: McpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonrpcNotification {
    pub fn new(method: McpMethod, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params,
        }
    }

    pub fn take_params(&mut self) -> Value {
        self.params
            .take()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}

/// The error member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonrpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response to a prior request, carrying `result` xor `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonrpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonrpcError>,
}

impl JsonrpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: JsonrpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::invalid_request("jsonrpc version must be 2.0"));
        }
        match (&self.result, &self.error) {
            (Some(_), Some(_)) => Err(McpError::invalid_request(
                "response must not carry both result and error",
            )),
            (None, None) => Err(McpError::invalid_request(
                "response must carry result or error",
            )),
            _ => Ok(()),
        }
    }
}

/// Discriminated view over the three packet shapes.
///
/// Deserialization tries request, then response, then notification; the
/// mandatory `id`/`method` fields make the shapes mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonrpcPacket {
    Request(JsonrpcRequest),
    Response(JsonrpcResponse),
    Notification(JsonrpcNotification),
}

impl JsonrpcPacket {
    pub fn method(&self) -> Option<&McpMethod> {
        match self {
            JsonrpcPacket::Request(r) => Some(&r.method),
            JsonrpcPacket::Notification(n) => Some(&n.method),
            JsonrpcPacket::Response(_) => None,
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonrpcPacket::Request(r) => Some(&r.id),
            JsonrpcPacket::Response(r) => Some(&r.id),
            JsonrpcPacket::Notification(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, JsonrpcPacket::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonrpcPacket::Notification(_))
    }

    pub fn validate(&self) -> McpResult<()> {
        match self {
            JsonrpcPacket::Request(r) => r.validate(),
            JsonrpcPacket::Response(r) => r.validate(),
            JsonrpcPacket::Notification(n) => {
                if n.jsonrpc != JSONRPC_VERSION {
                    return Err(McpError::invalid_request("jsonrpc version must be 2.0"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_forms() {
        let num: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(num, RequestId::Number(7));
        let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, RequestId::Str("abc".to_string()));
        assert!(serde_json::from_str::<RequestId>("true").is_err());
        assert!(serde_json::from_str::<RequestId>("[1]").is_err());
    }

    #[test]
    fn test_packet_discrimination() {
        let req: JsonrpcPacket = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#,
        )
        .unwrap();
        assert!(req.is_request());
        assert_eq!(req.id(), Some(&RequestId::Number(1)));

        let notif: JsonrpcPacket = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized","params":{}}"#,
        )
        .unwrap();
        assert!(notif.is_notification());
        assert!(notif.id().is_none());

        let resp: JsonrpcPacket =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(resp, JsonrpcPacket::Response(_)));

        let err_resp: JsonrpcPacket = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        match err_resp {
            JsonrpcPacket::Response(r) => {
                assert!(!r.is_success());
                assert_eq!(r.error.unwrap().code, -32601);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_round_trip() {
        let original = JsonrpcPacket::Request(JsonrpcRequest::new(
            RequestId::Number(3),
            McpMethod::call_tool(),
            Some(json!({"name": "slow", "arguments": {}})),
        ));
        let bytes = serde_json::to_string(&original).unwrap();
        let decoded: JsonrpcPacket = serde_json::from_str(&bytes).unwrap();
        let reencoded = serde_json::to_string(&decoded).unwrap();
        assert_eq!(bytes, reencoded);
    }

    #[test]
    fn test_response_validation() {
        let ok = JsonrpcResponse::success(RequestId::Number(1), json!({}));
        assert!(ok.validate().is_ok());

        let both = JsonrpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(1),
            result: Some(json!({})),
            error: Some(JsonrpcError {
                code: -1,
                message: "x".to_string(),
                data: None,
            }),
        };
        assert!(both.validate().is_err());

        let neither = JsonrpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(1),
            result: None,
            error: None,
        };
        assert!(neither.validate().is_err());
    }

    #[test]
    fn test_take_params_defaults_to_empty_object() {
        let mut req = JsonrpcRequest::new(RequestId::Number(1), McpMethod::ping(), None);
        assert_eq!(req.take_params(), json!({}));
    }

    #[test]
    fn test_notification_serializes_without_id() {
        let notif = JsonrpcNotification::new(
            McpMethod::notification_tools_list_changed(),
            Some(json!({})),
        );
        let json = serde_json::to_string(&notif).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("notifications/tools/list_changed"));
    }
}
