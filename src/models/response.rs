use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// Response envelope returned to the tool-invocation host.
///
/// Every catalog operation wraps its payload in this shape; the query
/// execution pipeline ships its own richer envelope and is passed through
/// without re-wrapping.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    pub timestamp: String,
}

impl ToolResponse {
    pub fn ok<T: Serialize>(result: T, message: impl Into<String>) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                success: true,
                result: Some(value),
                error: None,
                message: message.into(),
                timestamp: now(),
            },
            // A payload that cannot be converted is reported as its own
            // failure rather than crashing the whole response.
            Err(e) => {
                error!("Result serialization failed: {}", e);
                Self::err(
                    format!("Result serialization error: {}", e),
                    "Operation produced an unserializable result",
                )
            }
        }
    }

    pub fn err(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            message: message.into(),
            timestamp: now(),
        }
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
