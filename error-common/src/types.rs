use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error body returned by every failing API call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Unique error ID for correlating the response with server logs
    pub error_id: String,
    /// Stable machine-readable code, see [`crate::codes`]
    pub code: String,
    /// Coarse error category (e.g. `validation_error`)
    pub error_type: String,
    /// Human-readable message
    pub message: String,
    /// Structured details, e.g. validation issues or the current sequence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ApiErrorBody {
    pub fn new(code: &str, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            code: code.to_string(),
            error_type: error_type.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Log an error body together with the HTTP status it is sent with
///
/// `cause` is the internal error, which for server failures is richer than
/// the sanitized message in the body.
pub fn log_error(status: u16, body: &ApiErrorBody, cause: &dyn std::fmt::Display) {
    if status >= 500 {
        tracing::error!(
            error_id = %body.error_id,
            code = %body.code,
            error_type = %body.error_type,
            status,
            message = %body.message,
            cause = %cause,
            "API error occurred"
        );
    } else {
        tracing::warn!(
            error_id = %body.error_id,
            code = %body.code,
            error_type = %body.error_type,
            status,
            message = %body.message,
            "API request rejected"
        );
    }
}
