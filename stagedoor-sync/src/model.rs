//! Persisted records and their wire shapes

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::scope::Scope;

/// Stock record, the backing table of the `inventory` scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub sku: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

/// Ticket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Unused,
    CheckedIn,
    Invalid,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Unused => "unused",
            TicketStatus::CheckedIn => "checked_in",
            TicketStatus::Invalid => "invalid",
        }
    }

    /// `None` for a status string no variant maps to
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "unused" => Some(TicketStatus::Unused),
            "checked_in" => Some(TicketStatus::CheckedIn),
            "invalid" => Some(TicketStatus::Invalid),
            _ => None,
        }
    }

    pub(crate) fn parse_stored(s: &str) -> SyncResult<Self> {
        Self::from_db_str(s)
            .ok_or_else(|| SyncError::Internal(format!("Unknown ticket status: {s}")))
    }
}

/// Ticket, the backing table of the `tickets` scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub code: String,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
    pub event_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single check-in attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketScanEvent {
    pub id: String,
    pub ticket_id: String,
    pub code: String,
    pub status_before: TicketStatus,
    pub status_after: TicketStatus,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
    pub dedupe_key: String,
    /// Set once the paired sync event is written
    pub server_seq: Option<i64>,
    pub processed_at: DateTime<Utc>,
    pub provisional: bool,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_mutation_id: Option<String>,
}

/// Immutable entry of a scope's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub id: String,
    pub scope: Scope,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub server_seq: i64,
    pub client_id: String,
    #[serde(skip)]
    pub client_mutation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
}

/// Record of one submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMutation {
    pub client_mutation_id: String,
    pub client_id: String,
    pub scope: Scope,
    pub event_count: i64,
    pub first_server_seq: Option<i64>,
    pub last_server_seq: Option<i64>,
    pub acknowledged_seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Format a timestamp for storage
///
/// Fixed-width microsecond precision in UTC, so stored values sort
/// chronologically as text.
pub(crate) fn db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at storage precision
///
/// Values handed back to callers must equal what a later read returns.
pub(crate) fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Parse a timestamp column written by [`db_timestamp`]
pub(crate) fn parse_db_timestamp(s: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SyncError::Internal(format!("Invalid timestamp {s:?}: {e}")))
}

/// Parse a client-supplied ISO 8601 timestamp
///
/// Accepts RFC 3339 with an offset, or a naive date-time which is taken
/// as UTC. Sub-microsecond digits are dropped to match storage.
pub fn parse_client_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let ts = match DateTime::parse_from_rfc3339(s) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc(),
    };
    Some(ts.trunc_subsecs(6))
}
