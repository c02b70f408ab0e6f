//! Baseline and delta retrieval
//!
//! A baseline pages through the current state of a scope by primary key
//! and reports the head it was captured at. Deltas page through the event
//! log after a known sequence. Each page is read in its own transaction,
//! so a page and the sequence reported with it are a consistent snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::model::{InventoryItem, SyncEvent, Ticket};
use crate::scope::Scope;
use crate::store::{events, inventory, tickets, SyncDatabase};

pub const DEFAULT_PAGE_LIMIT: i64 = 500;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Clamp a requested page size into `[1, MAX_PAGE_LIMIT]`
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineOptions {
    /// Primary key of the last record of the previous page
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaOptions {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselinePage<R> {
    pub records: Vec<R>,
    /// Scope head at capture time
    pub server_seq: i64,
    pub captured_at: DateTime<Utc>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// One page of a scope's current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum BaselineResult {
    Inventory(BaselinePage<InventoryItem>),
    Tickets(BaselinePage<Ticket>),
}

impl BaselineResult {
    pub fn scope(&self) -> Scope {
        match self {
            BaselineResult::Inventory(_) => Scope::Inventory,
            BaselineResult::Tickets(_) => Scope::Tickets,
        }
    }

    pub fn server_seq(&self) -> i64 {
        match self {
            BaselineResult::Inventory(page) => page.server_seq,
            BaselineResult::Tickets(page) => page.server_seq,
        }
    }

    pub fn has_more(&self) -> bool {
        match self {
            BaselineResult::Inventory(page) => page.has_more,
            BaselineResult::Tickets(page) => page.has_more,
        }
    }

    pub fn next_cursor(&self) -> Option<&str> {
        match self {
            BaselineResult::Inventory(page) => page.next_cursor.as_deref(),
            BaselineResult::Tickets(page) => page.next_cursor.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaResult {
    pub scope: Scope,
    pub events: Vec<SyncEvent>,
    /// Scope head at read time
    pub server_seq: i64,
    pub has_more: bool,
    /// `serverSeq` to pass as `since` for the next page
    pub next_cursor: Option<i64>,
}

/// Trim an overfetched page and report whether more rows exist
fn finish_page<R, K>(
    mut records: Vec<R>,
    limit: i64,
    key: impl Fn(&R) -> K,
) -> (Vec<R>, bool, Option<K>) {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    if records.len() > limit {
        records.truncate(limit);
        let next_cursor = records.last().map(key);
        (records, true, next_cursor)
    } else {
        (records, false, None)
    }
}

/// Read one baseline page of `scope`
pub async fn select_baseline(
    db: &SyncDatabase,
    scope: Scope,
    options: BaselineOptions,
) -> SyncResult<BaselineResult> {
    let limit = clamp_limit(options.limit);
    let cursor = options.cursor.as_deref();
    let mut tx = db.pool().begin().await?;

    let server_seq = events::read_head(&mut tx, scope).await?;
    let captured_at = Utc::now();

    let result = match scope {
        Scope::Inventory => {
            let rows = inventory::list_page(&mut tx, cursor, limit + 1).await?;
            let (records, has_more, next_cursor) = finish_page(rows, limit, |r| r.id.clone());
            BaselineResult::Inventory(BaselinePage {
                records,
                server_seq,
                captured_at,
                has_more,
                next_cursor,
            })
        }
        Scope::Tickets => {
            let rows = tickets::list_page(&mut tx, cursor, limit + 1).await?;
            let (records, has_more, next_cursor) = finish_page(rows, limit, |r| r.id.clone());
            BaselineResult::Tickets(BaselinePage {
                records,
                server_seq,
                captured_at,
                has_more,
                next_cursor,
            })
        }
    };
    tx.commit().await?;

    tracing::debug!(
        scope = %scope,
        server_seq,
        cursor = ?cursor,
        has_more = result.has_more(),
        "Served baseline page"
    );

    Ok(result)
}

/// Read the events of `scope` after `last_server_seq`
pub async fn select_deltas(
    db: &SyncDatabase,
    scope: Scope,
    last_server_seq: i64,
    options: DeltaOptions,
) -> SyncResult<DeltaResult> {
    let limit = clamp_limit(options.limit);
    let mut tx = db.pool().begin().await?;

    let server_seq = events::read_head(&mut tx, scope).await?;
    if last_server_seq >= server_seq {
        tx.commit().await?;
        return Ok(DeltaResult {
            scope,
            events: Vec::new(),
            server_seq,
            has_more: false,
            next_cursor: None,
        });
    }

    let rows = events::events_after(&mut tx, scope, last_server_seq, limit + 1).await?;
    tx.commit().await?;

    let (events, has_more, next_cursor) = finish_page(rows, limit, |e| e.server_seq);

    tracing::debug!(
        scope = %scope,
        since = last_server_seq,
        server_seq,
        count = events.len(),
        has_more,
        "Served deltas"
    );

    Ok(DeltaResult {
        scope,
        events,
        server_seq,
        has_more,
        next_cursor,
    })
}
