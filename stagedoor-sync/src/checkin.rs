//! Ticket check-in
//!
//! A check-in moves a ticket from `unused` to `checked_in` exactly once.
//! The ticket row is locked for the whole decision, each accepted scan is
//! recorded as a [`TicketScanEvent`] and published to the `tickets` event
//! log in the same transaction. Replays (same dedupe key, or a ticket that
//! is already checked in) return the recorded outcome without writing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult, TicketCheckInError};
use crate::event_schema::TICKET_CHECKIN;
use crate::model::{db_now, parse_client_timestamp, Ticket, TicketScanEvent, TicketStatus};
use crate::scope::Scope;
use crate::store::events::{self, PendingEvent};
use crate::store::tickets::{self, TicketLookup};
use crate::store::SyncDatabase;

pub const DEFAULT_SOURCE: &str = "scanner";
pub const DEFAULT_CLIENT_ID: &str = "server";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCheckInInput {
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    /// ISO 8601; defaults to the time of processing
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_mutation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCheckInResult {
    pub ticket: Ticket,
    /// `None` only for a ticket checked in before scan events were recorded
    pub scan_event: Option<TicketScanEvent>,
    pub status: TicketStatus,
    pub provisional: bool,
    pub server_seq: Option<i64>,
    pub already_checked_in: bool,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build the answer for a scan that was already recorded
async fn replay_outcome(
    conn: &mut SqliteConnection,
    scan_event: TicketScanEvent,
) -> SyncResult<TicketCheckInResult> {
    let ticket = tickets::find_ticket(conn, &scan_event.ticket_id)
        .await?
        .ok_or_else(|| TicketCheckInError::not_found("Ticket not found"))?;

    tracing::debug!(
        ticket_id = %ticket.id,
        scan_event_id = %scan_event.id,
        "Replayed recorded check-in"
    );

    Ok(TicketCheckInResult {
        status: ticket.status,
        provisional: scan_event.provisional,
        server_seq: scan_event.server_seq,
        scan_event: Some(scan_event),
        ticket,
        already_checked_in: true,
    })
}

/// Normalized check-in request
struct CheckInRequest<'a> {
    /// `None` when neither id nor code was given
    lookup: Option<TicketLookup<'a>>,
    ticket_id: Option<&'a str>,
    code: Option<&'a str>,
    dedupe_key: Option<&'a str>,
    occurred_at: DateTime<Utc>,
    source: &'a str,
    client_id: &'a str,
    client_mutation_id: Option<&'a str>,
}

impl<'a> CheckInRequest<'a> {
    fn parse(input: &'a TicketCheckInInput) -> Result<Self, TicketCheckInError> {
        let ticket_id = non_blank(input.ticket_id.as_ref());
        let code = non_blank(input.code.as_ref());

        let occurred_at = match non_blank(input.occurred_at.as_ref()) {
            Some(raw) => parse_client_timestamp(raw).ok_or_else(|| {
                TicketCheckInError::invalid_input("occurredAt must be an ISO 8601 timestamp")
            })?,
            None => db_now(),
        };

        let lookup = match (ticket_id, code) {
            (Some(id), _) => Some(TicketLookup::Id(id)),
            (None, Some(code)) => Some(TicketLookup::Code(code)),
            (None, None) => None,
        };

        Ok(Self {
            lookup,
            ticket_id,
            code,
            dedupe_key: non_blank(input.dedupe_key.as_ref()),
            occurred_at,
            source: non_blank(input.source.as_ref()).unwrap_or(DEFAULT_SOURCE),
            client_id: non_blank(input.client_id.as_ref()).unwrap_or(DEFAULT_CLIENT_ID),
            client_mutation_id: non_blank(input.client_mutation_id.as_ref()),
        })
    }
}

/// Check a ticket in by id or code
///
/// # Errors
///
/// `SyncError::CheckIn` with `NOT_FOUND`, `INVALID_STATE` or
/// `INVALID_INPUT` for domain failures. Storage failures are propagated
/// unchanged.
pub async fn check_in_ticket(
    db: &SyncDatabase,
    input: TicketCheckInInput,
) -> SyncResult<TicketCheckInResult> {
    let request = CheckInRequest::parse(&input)?;

    if let Some(key) = request.dedupe_key {
        let mut conn = db.pool().acquire().await?;
        if let Some(recorded) = tickets::find_scan_event_by_dedupe_key(&mut conn, key).await? {
            return replay_outcome(&mut conn, recorded).await;
        }
    }

    check_in_locked(db, &request).await
}

/// The state transition under the ticket row lock
///
/// A scan recorded under the same dedupe key between the caller's lookup
/// and the insert is answered as a replay.
async fn check_in_locked(
    db: &SyncDatabase,
    request: &CheckInRequest<'_>,
) -> SyncResult<TicketCheckInResult> {
    let CheckInRequest {
        lookup,
        ticket_id,
        code,
        dedupe_key,
        occurred_at,
        source,
        client_id,
        client_mutation_id,
    } = *request;
    let lookup = lookup
        .ok_or_else(|| TicketCheckInError::invalid_input("ticketId or code is required"))?;

    let mut tx = db.pool().begin().await?;

    let Some(row) = tickets::lock_ticket(&mut tx, lookup).await? else {
        tx.rollback().await?;
        return Err(TicketCheckInError::not_found("Ticket not found").into());
    };

    if let (Some(_), Some(code)) = (ticket_id, code) {
        if row.code != code {
            tx.rollback().await?;
            return Err(
                TicketCheckInError::invalid_input("ticketId and code refer to different tickets")
                    .into(),
            );
        }
    }

    match TicketStatus::from_db_str(&row.status) {
        Some(TicketStatus::Unused) => {}
        Some(TicketStatus::Invalid) => {
            tx.rollback().await?;
            tracing::warn!(ticket_id = %row.id, "Check-in refused for invalid ticket");
            return Err(TicketCheckInError::invalid_state("Ticket is invalid").into());
        }
        Some(TicketStatus::CheckedIn) => {
            let latest = tickets::latest_scan_event(&mut tx, &row.id).await?;
            tx.rollback().await?;
            tracing::warn!(ticket_id = %row.id, "Ticket already checked in");
            return Ok(TicketCheckInResult {
                provisional: latest.as_ref().is_some_and(|e| e.provisional),
                server_seq: latest.as_ref().and_then(|e| e.server_seq),
                scan_event: latest,
                status: TicketStatus::CheckedIn,
                ticket: row.into_ticket()?,
                already_checked_in: true,
            });
        }
        None => {
            tx.rollback().await?;
            return Err(TicketCheckInError::invalid_state(format!(
                "Ticket has unexpected status '{}'",
                row.status
            ))
            .into());
        }
    }

    let now = db_now();
    tickets::set_status(&mut tx, &row.id, TicketStatus::CheckedIn, now).await?;
    let ticket = Ticket {
        id: row.id,
        code: row.code,
        status: TicketStatus::CheckedIn,
        holder_name: row.holder_name,
        event_id: row.event_id,
        updated_at: now,
    };

    let effective_dedupe_key = dedupe_key.map_or_else(|| format!("ticket:{}", ticket.id), str::to_string);

    let mut scan_event = TicketScanEvent {
        id: Uuid::new_v4().to_string(),
        ticket_id: ticket.id.clone(),
        code: ticket.code.clone(),
        status_before: TicketStatus::Unused,
        status_after: TicketStatus::CheckedIn,
        source: source.to_string(),
        occurred_at,
        dedupe_key: effective_dedupe_key,
        server_seq: None,
        processed_at: now,
        provisional: false,
        client_id: client_id.to_string(),
        client_mutation_id: client_mutation_id.map(str::to_string),
    };

    if let Err(err) = tickets::insert_scan_event(&mut tx, &scan_event).await {
        tx.rollback().await?;
        if !err.is_unique_violation() {
            return Err(err);
        }
        // Lost a race on the dedupe key; answer with the winner
        let mut conn = db.pool().acquire().await?;
        return match tickets::find_scan_event_by_dedupe_key(&mut conn, &scan_event.dedupe_key).await? {
            Some(recorded) => replay_outcome(&mut conn, recorded).await,
            None => Err(err),
        };
    }

    let head = events::lock_head(&mut tx, Scope::Tickets).await?;
    let mutation_id =
        client_mutation_id.map_or_else(|| format!("checkin:{}", scan_event.id), str::to_string);
    let envelope = PendingEvent {
        id: Uuid::new_v4().to_string(),
        event_type: TICKET_CHECKIN.to_string(),
        payload: serde_json::json!({
            "ticket": ticket,
            "scanEvent": scan_event,
        }),
        occurred_at: scan_event.occurred_at,
        dedupe_key: None,
    };
    let (_, published) =
        events::append_batch(&mut tx, Scope::Tickets, head, client_id, &mutation_id, vec![envelope])
            .await?;
    let server_seq = published
        .first()
        .map(|e| e.server_seq)
        .ok_or_else(|| SyncError::Internal("Check-in envelope was not sequenced".to_string()))?;

    tickets::set_scan_event_server_seq(&mut tx, &scan_event.id, server_seq).await?;
    scan_event.server_seq = Some(server_seq);

    tx.commit().await?;

    tracing::info!(
        ticket_id = %ticket.id,
        scan_event_id = %scan_event.id,
        server_seq,
        source = %scan_event.source,
        "Ticket checked in"
    );

    Ok(TicketCheckInResult {
        ticket,
        status: TicketStatus::CheckedIn,
        provisional: scan_event.provisional,
        server_seq: Some(server_seq),
        scan_event: Some(scan_event),
        already_checked_in: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{create_test_db, ticket};

    fn by_id(id: &str) -> TicketCheckInInput {
        TicketCheckInInput {
            ticket_id: Some(id.to_string()),
            ..TicketCheckInInput::default()
        }
    }

    #[tokio::test]
    async fn test_check_in_defaults() {
        let t = create_test_db().await;
        t.db.insert_ticket(ticket("t-1", "ABC123")).await.unwrap();

        let result = check_in_ticket(&t.db, by_id("t-1")).await.unwrap();
        assert!(!result.already_checked_in);
        assert_eq!(result.status, TicketStatus::CheckedIn);
        assert_eq!(result.server_seq, Some(1));
        assert!(!result.provisional);

        let scan = result.scan_event.unwrap();
        assert_eq!(scan.dedupe_key, "ticket:t-1");
        assert_eq!(scan.source, "scanner");
        assert_eq!(scan.client_id, "server");
        assert_eq!(scan.server_seq, Some(1));
    }

    #[tokio::test]
    async fn test_missing_identifiers_rejected() {
        let t = create_test_db().await;
        let err = check_in_ticket(&t.db, TicketCheckInInput::default())
            .await
            .unwrap_err();
        let SyncError::CheckIn(err) = err else {
            panic!("expected a check-in error");
        };
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_mismatched_id_and_code_rejected() {
        let t = create_test_db().await;
        t.db.insert_ticket(ticket("t-1", "ABC123")).await.unwrap();
        t.db.insert_ticket(ticket("t-2", "XYZ789")).await.unwrap();

        let input = TicketCheckInInput {
            ticket_id: Some("t-1".to_string()),
            code: Some("XYZ789".to_string()),
            ..TicketCheckInInput::default()
        };
        let err = check_in_ticket(&t.db, input).await.unwrap_err();
        assert!(matches!(err, SyncError::CheckIn(ref e) if e.status() == 400));

        let untouched = t.db.find_ticket("t-1").await.unwrap().unwrap();
        assert_eq!(untouched.status, TicketStatus::Unused);
    }

    #[tokio::test]
    async fn test_bad_occurred_at_rejected() {
        let t = create_test_db().await;
        t.db.insert_ticket(ticket("t-1", "ABC123")).await.unwrap();
        let input = TicketCheckInInput {
            occurred_at: Some("at curtain".to_string()),
            ..by_id("t-1")
        };
        let err = check_in_ticket(&t.db, input).await.unwrap_err();
        assert!(matches!(err, SyncError::CheckIn(ref e) if e.status() == 400));
    }

    #[tokio::test]
    async fn test_unknown_status_is_invalid_state() {
        let t = create_test_db().await;
        t.db.insert_ticket(ticket("t-1", "ABC123")).await.unwrap();
        sqlx::query("UPDATE tickets SET status = 'refunded' WHERE id = 't-1'")
            .execute(t.db.pool())
            .await
            .unwrap();

        let err = check_in_ticket(&t.db, by_id("t-1")).await.unwrap_err();
        assert!(matches!(err, SyncError::CheckIn(ref e) if e.status() == 409));
    }

    #[tokio::test]
    async fn test_dedupe_key_taken_after_lookup_replays_recorded_scan() {
        let t = create_test_db().await;
        t.db.insert_ticket(ticket("t-1", "ABC123")).await.unwrap();
        t.db.insert_ticket(ticket("t-2", "XYZ789")).await.unwrap();

        // Another device recorded the scan under the same key after our lookup
        let now = db_now();
        let recorded = TicketScanEvent {
            id: "scan-other".to_string(),
            ticket_id: "t-2".to_string(),
            code: "XYZ789".to_string(),
            status_before: TicketStatus::Unused,
            status_after: TicketStatus::CheckedIn,
            source: "gate-b".to_string(),
            occurred_at: now,
            dedupe_key: "door-7:0001".to_string(),
            server_seq: None,
            processed_at: now,
            provisional: false,
            client_id: "scanner-2".to_string(),
            client_mutation_id: None,
        };
        let mut conn = t.db.pool().acquire().await.unwrap();
        tickets::insert_scan_event(&mut conn, &recorded).await.unwrap();
        drop(conn);

        let input = TicketCheckInInput {
            dedupe_key: Some("door-7:0001".to_string()),
            ..by_id("t-1")
        };
        let request = CheckInRequest::parse(&input).unwrap();
        let result = check_in_locked(&t.db, &request).await.unwrap();

        assert!(result.already_checked_in);
        assert_eq!(result.scan_event, Some(recorded));
        assert_eq!(result.ticket.id, "t-2");

        let untouched = t.db.find_ticket("t-1").await.unwrap().unwrap();
        assert_eq!(untouched.status, TicketStatus::Unused);
        assert_eq!(t.db.current_server_seq(Scope::Tickets).await.unwrap(), 0);
        assert!(t.db.ticket_scan_history("t-1").await.unwrap().is_empty());
    }
}
