//! Tickets and their scan events

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use uuid::Uuid;

use crate::error::SyncResult;
use crate::event_schema::TicketCheckinPayload;
use crate::model::{
    db_now, db_timestamp, parse_client_timestamp, parse_db_timestamp, SyncEvent, Ticket,
    TicketScanEvent, TicketStatus,
};
use crate::store::NewTicket;

const TICKET_COLUMNS: &str = "id, code, status, event_id, holder_name, updated_at";

const SCAN_EVENT_COLUMNS: &str = "id, ticket_id, code, status_before, status_after, source, \
     occurred_at, dedupe_key, server_seq, processed_at, provisional, client_id, client_mutation_id";

/// How a check-in identifies its ticket
#[derive(Debug, Clone, Copy)]
pub(crate) enum TicketLookup<'a> {
    Id(&'a str),
    Code(&'a str),
}

/// A ticket row with its status left as stored
///
/// Check-in has to tell an unknown status apart from the known ones, so
/// the status is not parsed here.
#[derive(Debug, Clone)]
pub(crate) struct TicketRow {
    pub id: String,
    pub code: String,
    pub status: String,
    pub event_id: String,
    pub holder_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TicketRow {
    pub fn into_ticket(self) -> SyncResult<Ticket> {
        Ok(Ticket {
            status: TicketStatus::parse_stored(&self.status)?,
            id: self.id,
            code: self.code,
            holder_name: self.holder_name,
            event_id: self.event_id,
            updated_at: self.updated_at,
        })
    }
}

fn row_to_ticket_row(row: &SqliteRow) -> SyncResult<TicketRow> {
    let updated_at: String = row.try_get("updated_at")?;
    Ok(TicketRow {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        status: row.try_get("status")?,
        event_id: row.try_get("event_id")?,
        holder_name: row.try_get("holder_name")?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

fn row_to_scan_event(row: &SqliteRow) -> SyncResult<TicketScanEvent> {
    let status_before: String = row.try_get("status_before")?;
    let status_after: String = row.try_get("status_after")?;
    let occurred_at: String = row.try_get("occurred_at")?;
    let processed_at: String = row.try_get("processed_at")?;

    Ok(TicketScanEvent {
        id: row.try_get("id")?,
        ticket_id: row.try_get("ticket_id")?,
        code: row.try_get("code")?,
        status_before: TicketStatus::parse_stored(&status_before)?,
        status_after: TicketStatus::parse_stored(&status_after)?,
        source: row.try_get("source")?,
        occurred_at: parse_db_timestamp(&occurred_at)?,
        dedupe_key: row.try_get("dedupe_key")?,
        server_seq: row.try_get("server_seq")?,
        processed_at: parse_db_timestamp(&processed_at)?,
        provisional: row.try_get("provisional")?,
        client_id: row.try_get("client_id")?,
        client_mutation_id: row.try_get("client_mutation_id")?,
    })
}

pub(crate) async fn insert_ticket(
    conn: &mut SqliteConnection,
    ticket: NewTicket,
) -> SyncResult<Ticket> {
    let now = db_now();
    sqlx::query(
        r#"
        INSERT INTO tickets (id, code, status, event_id, holder_name, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ticket.id)
    .bind(&ticket.code)
    .bind(TicketStatus::Unused.as_str())
    .bind(&ticket.event_id)
    .bind(&ticket.holder_name)
    .bind(db_timestamp(now))
    .execute(&mut *conn)
    .await?;

    tracing::debug!(ticket_id = %ticket.id, "Ticket registered");

    Ok(Ticket {
        id: ticket.id,
        code: ticket.code,
        status: TicketStatus::Unused,
        holder_name: ticket.holder_name,
        event_id: ticket.event_id,
        updated_at: now,
    })
}

pub(crate) async fn find_ticket(
    conn: &mut SqliteConnection,
    ticket_id: &str,
) -> SyncResult<Option<Ticket>> {
    let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref()
        .map(|r| row_to_ticket_row(r).and_then(TicketRow::into_ticket))
        .transpose()
}

/// Take the write lock on a ticket row and read it
///
/// The no-op update is what acquires the lock, so this must be the first
/// statement of the transaction.
pub(crate) async fn lock_ticket(
    conn: &mut SqliteConnection,
    lookup: TicketLookup<'_>,
) -> SyncResult<Option<TicketRow>> {
    let (column, value) = match lookup {
        TicketLookup::Id(id) => ("id", id),
        TicketLookup::Code(code) => ("code", code),
    };

    sqlx::query(&format!("UPDATE tickets SET status = status WHERE {column} = ?"))
        .bind(value)
        .execute(&mut *conn)
        .await?;

    let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE {column} = ?");
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_ticket_row).transpose()
}

pub(crate) async fn set_status(
    conn: &mut SqliteConnection,
    ticket_id: &str,
    status: TicketStatus,
    updated_at: DateTime<Utc>,
) -> SyncResult<()> {
    sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(db_timestamp(updated_at))
        .bind(ticket_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Tickets ordered by id, after `cursor`, at most `limit`
pub(crate) async fn list_page(
    conn: &mut SqliteConnection,
    cursor: Option<&str>,
    limit: i64,
) -> SyncResult<Vec<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE (?1 IS NULL OR id > ?1) ORDER BY id ASC LIMIT ?2"
    );
    let rows = sqlx::query(&sql)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|r| row_to_ticket_row(r).and_then(TicketRow::into_ticket))
        .collect()
}

pub(crate) async fn insert_scan_event(
    conn: &mut SqliteConnection,
    event: &TicketScanEvent,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ticket_scan_events (id, ticket_id, code, status_before, status_after, source,
                                        occurred_at, dedupe_key, server_seq, processed_at,
                                        provisional, client_id, client_mutation_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(&event.ticket_id)
    .bind(&event.code)
    .bind(event.status_before.as_str())
    .bind(event.status_after.as_str())
    .bind(&event.source)
    .bind(db_timestamp(event.occurred_at))
    .bind(&event.dedupe_key)
    .bind(event.server_seq)
    .bind(db_timestamp(event.processed_at))
    .bind(event.provisional)
    .bind(&event.client_id)
    .bind(&event.client_mutation_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn set_scan_event_server_seq(
    conn: &mut SqliteConnection,
    scan_event_id: &str,
    server_seq: i64,
) -> SyncResult<()> {
    sqlx::query("UPDATE ticket_scan_events SET server_seq = ? WHERE id = ?")
        .bind(server_seq)
        .bind(scan_event_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn find_scan_event_by_dedupe_key(
    conn: &mut SqliteConnection,
    dedupe_key: &str,
) -> SyncResult<Option<TicketScanEvent>> {
    let sql = format!("SELECT {SCAN_EVENT_COLUMNS} FROM ticket_scan_events WHERE dedupe_key = ?");
    let row = sqlx::query(&sql)
        .bind(dedupe_key)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_scan_event).transpose()
}

/// Most recently processed scan event of a ticket
pub(crate) async fn latest_scan_event(
    conn: &mut SqliteConnection,
    ticket_id: &str,
) -> SyncResult<Option<TicketScanEvent>> {
    let sql = format!(
        "SELECT {SCAN_EVENT_COLUMNS} FROM ticket_scan_events \
         WHERE ticket_id = ? ORDER BY processed_at DESC, rowid DESC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_scan_event).transpose()
}

pub(crate) async fn scan_events_for_ticket(
    conn: &mut SqliteConnection,
    ticket_id: &str,
) -> SyncResult<Vec<TicketScanEvent>> {
    let sql = format!(
        "SELECT {SCAN_EVENT_COLUMNS} FROM ticket_scan_events \
         WHERE ticket_id = ? ORDER BY processed_at DESC, rowid DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_scan_event).collect()
}

/// Apply a device-side check-in that arrived through a synced batch
///
/// Only an `unused` ticket whose code matches moves to `checked_in`; the
/// scan is recorded as provisional and carries the event's `serverSeq`.
/// Anything else leaves the ticket alone and the event stays in the log
/// as history. The caller must already hold the write lock.
pub(crate) async fn project_checkin(
    conn: &mut SqliteConnection,
    payload: &TicketCheckinPayload,
    event: &SyncEvent,
    processed_at: DateTime<Utc>,
) -> SyncResult<bool> {
    let Some(row) = lock_ticket(conn, TicketLookup::Id(&payload.ticket_id)).await? else {
        return Ok(false);
    };
    if row.code != payload.code || TicketStatus::from_db_str(&row.status) != Some(TicketStatus::Unused) {
        return Ok(false);
    }

    let dedupe_key = event
        .dedupe_key
        .clone()
        .unwrap_or_else(|| format!("ticket:{}", row.id));
    if find_scan_event_by_dedupe_key(conn, &dedupe_key).await?.is_some() {
        return Ok(false);
    }

    set_status(conn, &row.id, TicketStatus::CheckedIn, processed_at).await?;
    insert_scan_event(
        conn,
        &TicketScanEvent {
            id: Uuid::new_v4().to_string(),
            ticket_id: row.id,
            code: row.code,
            status_before: TicketStatus::Unused,
            status_after: TicketStatus::CheckedIn,
            source: payload.source.clone(),
            occurred_at: parse_client_timestamp(&payload.attempted_at).unwrap_or(event.occurred_at),
            dedupe_key,
            server_seq: Some(event.server_seq),
            processed_at,
            provisional: true,
            client_id: event.client_id.clone(),
            client_mutation_id: Some(event.client_mutation_id.clone()),
        },
    )
    .await?;
    Ok(true)
}
