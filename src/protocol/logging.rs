//! Protocol-level logging: RFC-5424 levels, `logging/setLevel` and the
//! `notifications/message` payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log message severity, RFC-5424 ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    /// Numeric severity for threshold comparisons; higher is more severe.
    pub fn severity(self) -> u8 {
        match self {
            LoggingLevel::Debug => 0,
            LoggingLevel::Info => 1,
            LoggingLevel::Notice => 2,
            LoggingLevel::Warning => 3,
            LoggingLevel::Error => 4,
            LoggingLevel::Critical => 5,
            LoggingLevel::Alert => 6,
            LoggingLevel::Emergency => 7,
        }
    }

    pub fn from_severity(severity: u8) -> Option<Self> {
        match severity {
            0 => Some(LoggingLevel::Debug),
            1 => Some(LoggingLevel::Info),
            2 => Some(LoggingLevel::Notice),
            3 => Some(LoggingLevel::Warning),
            4 => Some(LoggingLevel::Error),
            5 => Some(LoggingLevel::Critical),
            6 => Some(LoggingLevel::Alert),
            7 => Some(LoggingLevel::Emergency),
            _ => None,
        }
    }
}

/// `logging/setLevel` request payload: the minimum level the server will emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    pub level: LoggingLevel,
}

/// `logging/setLevel` result payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetLevelResult {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Payload of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageNotification {
    pub level: LoggingLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_wire_names() {
        assert_eq!(
            serde_json::to_string(&LoggingLevel::Warning).unwrap(),
            "\"warning\""
        );
        let level: LoggingLevel = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(level, LoggingLevel::Emergency);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(LoggingLevel::Debug.severity() < LoggingLevel::Info.severity());
        assert!(LoggingLevel::Error.severity() < LoggingLevel::Emergency.severity());
        for severity in 0..=7 {
            let level = LoggingLevel::from_severity(severity).unwrap();
            assert_eq!(level.severity(), severity);
        }
        assert!(LoggingLevel::from_severity(8).is_none());
    }

    #[test]
    fn test_message_notification_shape() {
        let n = LoggingMessageNotification {
            level: LoggingLevel::Info,
            logger: Some("indexer".to_string()),
            data: json!("scan complete"),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["level"], json!("info"));
        assert_eq!(value["logger"], json!("indexer"));
    }
}
