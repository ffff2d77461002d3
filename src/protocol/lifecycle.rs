//! Session lifecycle: state machine, cancellation and progress payloads.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::protocol::jsonrpc::RequestId;

/// The lifecycle states a peer moves through over a session.
///
/// `initialize` is the only method accepted before `Ready`; `ping` is
/// accepted in any non-`Closed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Initializing,
    Ready,
    Closing,
    Closed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Payload of `notifications/canceled`: the id of the in-flight request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledNotification {
    pub id: RequestId,
}

impl CancelledNotification {
    pub fn new(id: RequestId) -> Self {
        Self { id }
    }
}

/// Token correlating progress notifications with an ongoing operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressToken(pub String);

/// Payload of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNotification {
    pub token: ProgressToken,
    /// Completion percentage, 0-100.
    pub value: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cancelled_payload_shape() {
        let n = CancelledNotification::new(RequestId::Number(3));
        assert_eq!(serde_json::to_value(&n).unwrap(), json!({"id": 3}));

        let parsed: CancelledNotification =
            serde_json::from_value(json!({"id": "req-9"})).unwrap();
        assert_eq!(parsed.id, RequestId::Str("req-9".to_string()));
    }

    #[test]
    fn test_progress_round_trip() {
        let n = ProgressNotification {
            token: ProgressToken("op-1".to_string()),
            value: 40,
            message: Some("indexing".to_string()),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["token"], json!("op-1"));
        assert_eq!(value["value"], json!(40));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Ready.to_string(), "ready");
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
    }
}
