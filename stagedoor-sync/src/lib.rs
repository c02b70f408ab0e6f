//! Offline synchronization engine for Stagedoor
//!
//! Provides:
//! - A scope-partitioned event log with contiguous per-scope `serverSeq`
//! - Baseline and delta retrieval with cursor pagination
//! - Idempotent batch ingestion with optimistic concurrency and dedupe
//! - Ticket check-in with row locking and scan event publication
//! - HMAC-signed stateless sync tokens

pub mod checkin;
pub mod config;
pub mod error;
pub mod event_schema;
pub mod ingest;
pub mod model;
pub mod reader;
pub mod scope;
pub mod store;
pub mod token;

use std::time::Duration;

pub use checkin::{check_in_ticket, TicketCheckInInput, TicketCheckInResult};
pub use config::SyncConfig;
pub use error::{
    SyncError, SyncEventValidationError, SyncResult, TicketCheckInError, TicketCheckInErrorCode,
    ValidationIssue,
};
pub use ingest::{
    apply_incoming_events, ApplyIncomingEventsInput, ApplyIncomingEventsResult, IncomingEvent,
    SkipReason, SkippedEvent,
};
pub use model::{InventoryItem, SyncEvent, SyncMutation, Ticket, TicketScanEvent, TicketStatus};
pub use reader::{
    select_baseline, select_deltas, BaselineOptions, BaselinePage, BaselineResult, DeltaOptions,
    DeltaResult,
};
pub use scope::Scope;
pub use store::{NewTicket, SyncDatabase, SyncDbConfig};
pub use token::{SyncTokenClaims, SyncTokenSigner};

/// The database and token signer behind the sync endpoints
#[derive(Debug)]
pub struct SyncEngine {
    db: SyncDatabase,
    signer: SyncTokenSigner,
    token_ttl: Duration,
}

impl SyncEngine {
    pub fn new(db: SyncDatabase, signer: SyncTokenSigner, token_ttl: Duration) -> Self {
        Self {
            db,
            signer,
            token_ttl,
        }
    }

    /// Open the configured database and build the signer
    pub async fn connect(config: &SyncConfig) -> SyncResult<Self> {
        let signer = config.token_signer()?;
        let db = SyncDatabase::connect(&config.database).await?;
        Ok(Self::new(db, signer, config.token_ttl))
    }

    pub fn db(&self) -> &SyncDatabase {
        &self.db
    }

    pub async fn baseline(&self, scope: Scope, options: BaselineOptions) -> SyncResult<BaselineResult> {
        select_baseline(&self.db, scope, options).await
    }

    pub async fn deltas(
        &self,
        scope: Scope,
        last_server_seq: i64,
        options: DeltaOptions,
    ) -> SyncResult<DeltaResult> {
        select_deltas(&self.db, scope, last_server_seq, options).await
    }

    pub async fn apply(&self, input: ApplyIncomingEventsInput) -> SyncResult<ApplyIncomingEventsResult> {
        apply_incoming_events(&self.db, input).await
    }

    pub async fn check_in(&self, input: TicketCheckInInput) -> SyncResult<TicketCheckInResult> {
        check_in_ticket(&self.db, input).await
    }

    /// Issue a token with the configured lifetime
    pub fn issue_token(&self, user_id: &str) -> SyncResult<String> {
        self.signer.create(user_id, self.token_ttl)
    }

    pub fn verify_token(&self, token: &str) -> Option<SyncTokenClaims> {
        self.signer.verify(token)
    }
}
