use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use error_common::{codes, log_error, ApiErrorBody};
use serde::{Deserialize, Serialize};
use stagedoor_sync::{SyncError, TicketCheckInError, TicketCheckInErrorCode, ValidationIssue};
use thiserror::Error;

/// Standard API success response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn api_success<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
    }
}

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Bad request: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Authentication error: {message}")]
    Authentication { code: &'static str, message: String },

    #[error("Stale sequence: scope is at {server_seq}")]
    StaleSequence { server_seq: i64 },

    #[error(transparent)]
    CheckIn(TicketCheckInError),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn authentication(code: &'static str, message: impl Into<String>) -> Self {
        Self::Authentication {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            ApiError::StaleSequence { .. } => StatusCode::CONFLICT,
            ApiError::CheckIn(err) => {
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_REQUEST)
            }
            ApiError::Database { .. } | ApiError::Configuration { .. } | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable code from `error_common::codes`
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => codes::validation::INVALID_EVENT,
            ApiError::BadRequest { code, .. } | ApiError::Authentication { code, .. } => *code,
            ApiError::StaleSequence { .. } => codes::sync::STALE_SEQUENCE,
            ApiError::CheckIn(err) => match err.code {
                TicketCheckInErrorCode::NotFound => codes::checkin::NOT_FOUND,
                TicketCheckInErrorCode::InvalidState => codes::checkin::INVALID_STATE,
                TicketCheckInErrorCode::InvalidInput => codes::checkin::INVALID_INPUT,
            },
            ApiError::Database { .. } => codes::database::QUERY_FAILED,
            ApiError::Configuration { .. } => codes::system::CONFIGURATION,
            ApiError::Internal { .. } => codes::system::INTERNAL,
        }
    }

    /// Get the error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::BadRequest { .. } => "bad_request",
            ApiError::Authentication { .. } => "authentication_error",
            ApiError::StaleSequence { .. } => "conflict",
            ApiError::CheckIn(err) => match err.code {
                TicketCheckInErrorCode::NotFound => "not_found",
                TicketCheckInErrorCode::InvalidState => "conflict",
                TicketCheckInErrorCode::InvalidInput => "bad_request",
            },
            ApiError::Database { .. } => "database_error",
            ApiError::Configuration { .. } => "configuration_error",
            ApiError::Internal { .. } => "internal_error",
        }
    }

    /// Message sent to the client; server-side failures are not detailed
    fn public_message(&self) -> String {
        match self {
            ApiError::Database { .. } => "Database operation failed. Please try again.".to_string(),
            ApiError::Configuration { .. } | ApiError::Internal { .. } => {
                "Internal server error".to_string()
            }
            ApiError::CheckIn(err) => err.message.clone(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation { issues, .. } => Some(serde_json::json!({ "issues": issues })),
            ApiError::StaleSequence { server_seq } => {
                Some(serde_json::json!({ "status": "stale", "serverSeq": server_seq }))
            }
            ApiError::CheckIn(err) => Some(serde_json::json!({ "code": err.code })),
            _ => None,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(err) => ApiError::Validation {
                message: err.to_string(),
                issues: err.issues,
            },
            SyncError::CheckIn(err) => ApiError::CheckIn(err),
            SyncError::InvalidOperation(message) => ApiError::BadRequest {
                code: codes::sync::UNKNOWN_SCOPE,
                message,
            },
            SyncError::Database(err) => ApiError::Database {
                message: err.to_string(),
            },
            SyncError::Configuration(message) => ApiError::Configuration { message },
            SyncError::Serialization(message) | SyncError::Internal(message) => {
                ApiError::Internal { message }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            code: codes::validation::INVALID_FORMAT,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest {
            code: codes::validation::INVALID_FORMAT,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let mut body = ApiErrorBody::new(self.code(), self.error_type(), self.public_message());
        if let Some(details) = self.details() {
            body = body.with_details(details);
        }

        log_error(status_code.as_u16(), &body, &self);

        (status_code, Json(body)).into_response()
    }
}
