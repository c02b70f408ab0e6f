//! SQLite-backed store for the sync engine
//!
//! Owns the connection pool and the schema. Query helpers live in the
//! submodules and take a `&mut SqliteConnection` so they run equally on a
//! pooled connection or inside a transaction.
//!
//! # Locking
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Every write transaction starts
//! with a write statement against the row it is about to depend on (the
//! scope head, or the ticket being checked in). That statement takes the
//! database write lock before any read happens, so the rest of the
//! transaction sees state no other writer can change until commit.

pub(crate) mod events;
pub(crate) mod inventory;
pub(crate) mod tickets;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::SyncResult;
use crate::model::{db_now, db_timestamp, InventoryItem, Ticket, TicketScanEvent, TicketStatus};
use crate::scope::Scope;

/// Configuration for the sync database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDbConfig {
    /// sqlx connection URL, e.g. `sqlite:stagedoor.db`
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long a writer waits for the database write lock
    pub busy_timeout: Duration,
    /// Whether to enable WAL mode
    pub enable_wal: bool,
}

impl Default for SyncDbConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:stagedoor.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

/// A ticket as delivered by the box office import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub id: String,
    pub code: String,
    pub event_id: String,
    #[serde(default)]
    pub holder_name: Option<String>,
}

/// Handle to the sync database
#[derive(Debug, Clone)]
pub struct SyncDatabase {
    pool: SqlitePool,
}

impl SyncDatabase {
    /// Open (creating if needed) the database and initialise the schema
    pub async fn connect(config: &SyncDbConfig) -> SyncResult<Self> {
        let journal_mode = if config.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(journal_mode)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize_schema().await?;

        tracing::info!(
            database_url = %config.database_url,
            max_connections = config.max_connections,
            "Sync database ready"
        );

        Ok(db)
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> SyncResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_scope_heads (
                scope TEXT PRIMARY KEY,
                server_seq INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_mutations (
                client_mutation_id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                event_count INTEGER NOT NULL DEFAULT 0,
                first_server_seq INTEGER,
                last_server_seq INTEGER,
                acknowledged_seq INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_events (
                id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                server_seq INTEGER NOT NULL,
                client_id TEXT NOT NULL,
                client_mutation_id TEXT NOT NULL
                    REFERENCES sync_mutations(client_mutation_id),
                dedupe_key TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (scope, server_seq),
                UNIQUE (scope, dedupe_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_events_mutation ON sync_events(client_mutation_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_items (
                id TEXT PRIMARY KEY,
                sku TEXT,
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'unused',
                event_id TEXT NOT NULL,
                holder_name TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ticket_scan_events (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                code TEXT NOT NULL,
                status_before TEXT NOT NULL,
                status_after TEXT NOT NULL,
                source TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                dedupe_key TEXT NOT NULL UNIQUE,
                server_seq INTEGER,
                processed_at TEXT NOT NULL,
                provisional INTEGER NOT NULL DEFAULT 0,
                client_id TEXT NOT NULL,
                client_mutation_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scan_events_ticket ON ticket_scan_events(ticket_id, processed_at)",
        )
        .execute(&self.pool)
        .await?;

        // Every scope starts at head 0
        for scope in Scope::ALL {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO sync_scope_heads (scope, server_seq, updated_at)
                VALUES (?, 0, ?)
                "#,
            )
            .bind(scope.db_tag())
            .bind(db_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Get database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database answers queries
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Sync database health check failed");
                false
            }
        }
    }

    /// Current head of a scope
    pub async fn current_server_seq(&self, scope: Scope) -> SyncResult<i64> {
        let mut conn = self.pool.acquire().await?;
        events::read_head(&mut conn, scope).await
    }

    /// Insert or replace an inventory item (stock import, manual correction)
    pub async fn upsert_inventory_item(&self, item: &InventoryItem) -> SyncResult<()> {
        let mut conn = self.pool.acquire().await?;
        inventory::upsert_item(&mut conn, item).await
    }

    /// Register a new, unused ticket
    pub async fn insert_ticket(&self, ticket: NewTicket) -> SyncResult<Ticket> {
        let mut conn = self.pool.acquire().await?;
        tickets::insert_ticket(&mut conn, ticket).await
    }

    pub async fn find_ticket(&self, ticket_id: &str) -> SyncResult<Option<Ticket>> {
        let mut conn = self.pool.acquire().await?;
        tickets::find_ticket(&mut conn, ticket_id).await
    }

    /// Void a ticket; it can never be checked in afterwards
    ///
    /// Returns `None` when no ticket has that id.
    pub async fn mark_ticket_invalid(&self, ticket_id: &str) -> SyncResult<Option<Ticket>> {
        let mut conn = self.pool.acquire().await?;
        tickets::set_status(&mut conn, ticket_id, TicketStatus::Invalid, db_now()).await?;
        tickets::find_ticket(&mut conn, ticket_id).await
    }

    /// All check-in attempts recorded for a ticket, newest first
    pub async fn ticket_scan_history(&self, ticket_id: &str) -> SyncResult<Vec<TicketScanEvent>> {
        let mut conn = self.pool.acquire().await?;
        tickets::scan_events_for_ticket(&mut conn, ticket_id).await
    }

    /// Close database connections
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A database in a temporary directory, removed on drop
    pub(crate) struct TestDb {
        pub db: SyncDatabase,
        _dir: TempDir,
    }

    pub(crate) async fn create_test_db() -> TestDb {
        let dir = TempDir::new().unwrap();
        let config = SyncDbConfig {
            database_url: format!("sqlite://{}", dir.path().join("sync.db").display()),
            ..SyncDbConfig::default()
        };
        let db = SyncDatabase::connect(&config).await.unwrap();
        TestDb { db, _dir: dir }
    }

    pub(crate) fn ticket(id: &str, code: &str) -> NewTicket {
        NewTicket {
            id: id.to_string(),
            code: code.to_string(),
            event_id: "premiere".to_string(),
            holder_name: None,
        }
    }
}
