//! Scope heads, mutations and the event log

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row};

use crate::error::{SyncError, SyncResult};
use crate::model::{db_now, db_timestamp, parse_db_timestamp, SyncEvent, SyncMutation};
use crate::scope::{Scope, StoredScope};

/// An event accepted for a batch that has not been sequenced yet
#[derive(Debug, Clone)]
pub(crate) struct PendingEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub dedupe_key: Option<String>,
}

const EVENT_COLUMNS: &str = "id, scope, event_type, payload, occurred_at, server_seq, \
     client_id, client_mutation_id, dedupe_key";

const MUTATION_COLUMNS: &str = "client_mutation_id, client_id, scope, event_count, \
     first_server_seq, last_server_seq, acknowledged_seq, created_at, updated_at";

pub(crate) async fn read_head(conn: &mut SqliteConnection, scope: Scope) -> SyncResult<i64> {
    let head: Option<i64> =
        sqlx::query_scalar("SELECT server_seq FROM sync_scope_heads WHERE scope = ?")
            .bind(scope.db_tag())
            .fetch_optional(&mut *conn)
            .await?;
    Ok(head.unwrap_or(0))
}

/// Take the write lock on a scope head and return its value
///
/// Must be the first statement of a write transaction.
pub(crate) async fn lock_head(conn: &mut SqliteConnection, scope: Scope) -> SyncResult<i64> {
    let head: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_scope_heads (scope, server_seq, updated_at)
        VALUES (?, 0, ?)
        ON CONFLICT(scope) DO UPDATE SET server_seq = sync_scope_heads.server_seq
        RETURNING server_seq
        "#,
    )
    .bind(scope.db_tag())
    .bind(db_timestamp(Utc::now()))
    .fetch_one(&mut *conn)
    .await?;
    Ok(head)
}

async fn advance_head(
    conn: &mut SqliteConnection,
    scope: Scope,
    server_seq: i64,
    now: DateTime<Utc>,
) -> SyncResult<()> {
    sqlx::query("UPDATE sync_scope_heads SET server_seq = ?, updated_at = ? WHERE scope = ?")
        .bind(server_seq)
        .bind(db_timestamp(now))
        .bind(scope.db_tag())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn row_to_event(row: &SqliteRow) -> SyncResult<SyncEvent> {
    let scope: String = row.try_get("scope")?;
    let payload: String = row.try_get("payload")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(SyncEvent {
        id: row.try_get("id")?,
        scope: StoredScope::from_db_str(&scope)?.into(),
        event_type: row.try_get("event_type")?,
        payload: serde_json::from_str(&payload)?,
        occurred_at: parse_db_timestamp(&occurred_at)?,
        server_seq: row.try_get("server_seq")?,
        client_id: row.try_get("client_id")?,
        client_mutation_id: row.try_get("client_mutation_id")?,
        dedupe_key: row.try_get("dedupe_key")?,
    })
}

fn row_to_mutation(row: &SqliteRow) -> SyncResult<SyncMutation> {
    let scope: String = row.try_get("scope")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(SyncMutation {
        client_mutation_id: row.try_get("client_mutation_id")?,
        client_id: row.try_get("client_id")?,
        scope: StoredScope::from_db_str(&scope)?.into(),
        event_count: row.try_get("event_count")?,
        first_server_seq: row.try_get("first_server_seq")?,
        last_server_seq: row.try_get("last_server_seq")?,
        acknowledged_seq: row.try_get("acknowledged_seq")?,
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

async fn insert_event(
    conn: &mut SqliteConnection,
    event: &SyncEvent,
    created_at: DateTime<Utc>,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_events (id, scope, event_type, payload, occurred_at, server_seq,
                                 client_id, client_mutation_id, dedupe_key, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(event.scope.db_tag())
    .bind(&event.event_type)
    .bind(serde_json::to_string(&event.payload)?)
    .bind(db_timestamp(event.occurred_at))
    .bind(event.server_seq)
    .bind(&event.client_id)
    .bind(&event.client_mutation_id)
    .bind(&event.dedupe_key)
    .bind(db_timestamp(created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Events of a scope with `server_seq > after`, ascending, at most `limit`
pub(crate) async fn events_after(
    conn: &mut SqliteConnection,
    scope: Scope,
    after: i64,
    limit: i64,
) -> SyncResult<Vec<SyncEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM sync_events \
         WHERE scope = ? AND server_seq > ? ORDER BY server_seq ASC LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(scope.db_tag())
        .bind(after)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_event).collect()
}

pub(crate) async fn events_for_mutation(
    conn: &mut SqliteConnection,
    client_mutation_id: &str,
) -> SyncResult<Vec<SyncEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM sync_events \
         WHERE client_mutation_id = ? ORDER BY server_seq ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(client_mutation_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_event).collect()
}

pub(crate) async fn find_mutation(
    conn: &mut SqliteConnection,
    client_mutation_id: &str,
) -> SyncResult<Option<SyncMutation>> {
    let sql = format!("SELECT {MUTATION_COLUMNS} FROM sync_mutations WHERE client_mutation_id = ?");
    let row = sqlx::query(&sql)
        .bind(client_mutation_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_mutation).transpose()
}

async fn insert_mutation(conn: &mut SqliteConnection, mutation: &SyncMutation) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_mutations (client_mutation_id, client_id, scope, event_count,
                                    first_server_seq, last_server_seq, acknowledged_seq,
                                    created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&mutation.client_mutation_id)
    .bind(&mutation.client_id)
    .bind(mutation.scope.db_tag())
    .bind(mutation.event_count)
    .bind(mutation.first_server_seq)
    .bind(mutation.last_server_seq)
    .bind(mutation.acknowledged_seq)
    .bind(db_timestamp(mutation.created_at))
    .bind(db_timestamp(mutation.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_mutation(conn: &mut SqliteConnection, mutation: &SyncMutation) -> SyncResult<()> {
    sqlx::query(
        r#"
        UPDATE sync_mutations
        SET event_count = ?, first_server_seq = ?, last_server_seq = ?,
            acknowledged_seq = ?, updated_at = ?
        WHERE client_mutation_id = ?
        "#,
    )
    .bind(mutation.event_count)
    .bind(mutation.first_server_seq)
    .bind(mutation.last_server_seq)
    .bind(mutation.acknowledged_seq)
    .bind(db_timestamp(mutation.updated_at))
    .bind(&mutation.client_mutation_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The subset of `ids` already present in the log (any scope)
pub(crate) async fn existing_event_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> SyncResult<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id FROM sync_events WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let found: Vec<String> = builder.build_query_scalar().fetch_all(&mut *conn).await?;
    Ok(found.into_iter().collect())
}

/// The subset of `keys` already used as dedupe keys within `scope`
pub(crate) async fn existing_dedupe_keys(
    conn: &mut SqliteConnection,
    scope: Scope,
    keys: &[String],
) -> SyncResult<HashSet<String>> {
    if keys.is_empty() {
        return Ok(HashSet::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT dedupe_key FROM sync_events WHERE scope = ");
    builder.push_bind(scope.db_tag());
    builder.push(" AND dedupe_key IN (");
    let mut separated = builder.separated(", ");
    for key in keys {
        separated.push_bind(key);
    }
    separated.push_unseparated(")");

    let found: Vec<String> = builder.build_query_scalar().fetch_all(&mut *conn).await?;
    Ok(found.into_iter().collect())
}

/// Record a mutation and sequence its events after `head`
///
/// The caller must hold the scope head lock (see [`lock_head`]) and pass
/// the value it returned.
pub(crate) async fn append_batch(
    conn: &mut SqliteConnection,
    scope: Scope,
    head: i64,
    client_id: &str,
    client_mutation_id: &str,
    pending: Vec<PendingEvent>,
) -> SyncResult<(SyncMutation, Vec<SyncEvent>)> {
    let now = db_now();
    let mut mutation = SyncMutation {
        client_mutation_id: client_mutation_id.to_string(),
        client_id: client_id.to_string(),
        scope,
        event_count: 0,
        first_server_seq: None,
        last_server_seq: None,
        acknowledged_seq: head,
        created_at: now,
        updated_at: now,
    };
    insert_mutation(conn, &mutation).await?;

    let mut events = Vec::with_capacity(pending.len());
    let mut server_seq = head;
    for event in pending {
        server_seq += 1;
        let event = SyncEvent {
            id: event.id,
            scope,
            event_type: event.event_type,
            payload: event.payload,
            occurred_at: event.occurred_at,
            server_seq,
            client_id: client_id.to_string(),
            client_mutation_id: client_mutation_id.to_string(),
            dedupe_key: event.dedupe_key,
        };
        insert_event(conn, &event, now).await?;
        events.push(event);
    }

    if server_seq != head {
        advance_head(conn, scope, server_seq, now).await?;
    }

    mutation.event_count = i64::try_from(events.len())
        .map_err(|_| SyncError::Internal("Event batch too large".to_string()))?;
    mutation.first_server_seq = events.first().map(|e| e.server_seq);
    mutation.last_server_seq = events.last().map(|e| e.server_seq);
    mutation.acknowledged_seq = server_seq;
    update_mutation(conn, &mutation).await?;

    tracing::debug!(
        scope = %scope,
        client_mutation_id,
        head,
        new_head = server_seq,
        "Appended batch to event log"
    );

    Ok((mutation, events))
}
