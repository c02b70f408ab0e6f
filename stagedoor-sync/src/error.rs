//! Error types for the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Validation(#[from] SyncEventValidationError),

    #[error(transparent)]
    CheckIn(#[from] TicketCheckInError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// True when the underlying database rejected a write on a unique constraint
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SyncError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<crypto::CryptoError> for SyncError {
    fn from(err: crypto::CryptoError) -> Self {
        match err {
            crypto::CryptoError::InvalidKey(msg) => SyncError::Configuration(msg),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// A single problem found while validating an incoming batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Position of the offending event in the batch, `None` for batch-level fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_index: Option<usize>,
    /// Field path, e.g. `payload.quantity`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn batch(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_index: None,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn event(index: usize, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_index: Some(index),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The whole batch was rejected before anything was written
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Invalid sync event batch: {} issue(s)", .issues.len())]
pub struct SyncEventValidationError {
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketCheckInErrorCode {
    NotFound,
    InvalidState,
    InvalidInput,
}

impl TicketCheckInErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketCheckInErrorCode::NotFound => "NOT_FOUND",
            TicketCheckInErrorCode::InvalidState => "INVALID_STATE",
            TicketCheckInErrorCode::InvalidInput => "INVALID_INPUT",
        }
    }

    /// HTTP status the error is reported with
    pub fn status(self) -> u16 {
        match self {
            TicketCheckInErrorCode::NotFound => 404,
            TicketCheckInErrorCode::InvalidState => 409,
            TicketCheckInErrorCode::InvalidInput => 400,
        }
    }
}

/// Domain failure of a ticket check-in, surfaced to the scanning device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TicketCheckInError {
    pub code: TicketCheckInErrorCode,
    pub message: String,
}

impl TicketCheckInError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: TicketCheckInErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self {
            code: TicketCheckInErrorCode::InvalidState,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: TicketCheckInErrorCode::InvalidInput,
            message: message.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.code.status()
    }
}
