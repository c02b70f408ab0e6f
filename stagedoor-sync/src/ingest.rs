//! Batch ingestion into the event log
//!
//! A batch is validated as a whole before any write. The write side then
//! runs in one transaction holding the scope head lock:
//!
//! 1. a batch whose `client_mutation_id` was already recorded is answered
//!    with the recorded result (`Duplicate`);
//! 2. a batch built on a head other than the current one is refused
//!    (`Stale`);
//! 3. events whose id or `(scope, dedupe_key)` is already known, in the
//!    log or earlier in the same batch, are skipped;
//! 4. the rest are sequenced contiguously after the head.
//!
//! Applied inventory adjustments update their item, and applied ticket
//! check-ins move an unused ticket to `checked_in`, in the same transaction.
//!
//! The duplicate check runs first so a client retrying a batch whose
//! response it never received gets that response back instead of a stale
//! refusal.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SyncError, SyncEventValidationError, SyncResult, ValidationIssue};
use crate::event_schema::{parse_payload, EventPayload};
use crate::model::{parse_client_timestamp, SyncEvent, SyncMutation};
use crate::scope::Scope;
use crate::store::events::{self, PendingEvent};
use crate::store::{inventory, tickets, SyncDatabase};

/// An event as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyIncomingEventsInput {
    pub scope: Scope,
    pub client_id: String,
    pub client_mutation_id: String,
    pub events: Vec<IncomingEvent>,
    pub last_known_server_seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    DuplicateId,
    DuplicateDedupeKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEvent {
    /// Position in the submitted batch
    pub index: usize,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    pub reason: SkipReason,
}

/// Outcome of a batch; none of these is an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApplyIncomingEventsResult {
    #[serde(rename_all = "camelCase")]
    Applied {
        server_seq: i64,
        events: Vec<SyncEvent>,
        skipped: Vec<SkippedEvent>,
        mutation: SyncMutation,
    },
    #[serde(rename_all = "camelCase")]
    Duplicate {
        server_seq: i64,
        events: Vec<SyncEvent>,
        mutation: SyncMutation,
    },
    #[serde(rename_all = "camelCase")]
    Stale { server_seq: i64 },
}

impl ApplyIncomingEventsResult {
    pub fn server_seq(&self) -> i64 {
        match self {
            ApplyIncomingEventsResult::Applied { server_seq, .. }
            | ApplyIncomingEventsResult::Duplicate { server_seq, .. }
            | ApplyIncomingEventsResult::Stale { server_seq } => *server_seq,
        }
    }
}

#[derive(Debug)]
struct NormalizedEvent {
    pending: PendingEvent,
    payload: EventPayload,
}

fn check_not_blank(
    issues: &mut Vec<ValidationIssue>,
    index: Option<usize>,
    path: &str,
    value: Option<&str>,
) {
    if value.is_some_and(|v| v.trim().is_empty()) {
        issues.push(ValidationIssue {
            event_index: index,
            path: path.to_string(),
            message: "must not be empty".to_string(),
        });
    }
}

/// Assign ids, parse timestamps and check every payload
///
/// Collects all issues of the batch instead of stopping at the first.
fn normalize_batch(
    input: &ApplyIncomingEventsInput,
) -> Result<Vec<NormalizedEvent>, SyncEventValidationError> {
    let mut issues = Vec::new();
    check_not_blank(&mut issues, None, "clientId", Some(input.client_id.as_str()));
    check_not_blank(&mut issues, None, "clientMutationId", Some(input.client_mutation_id.as_str()));
    if input.last_known_server_seq < 0 {
        issues.push(ValidationIssue::batch(
            "lastKnownServerSeq",
            "must not be negative",
        ));
    }

    let mut normalized = Vec::with_capacity(input.events.len());
    for (index, event) in input.events.iter().enumerate() {
        check_not_blank(&mut issues, Some(index), "id", event.id.as_deref());
        check_not_blank(&mut issues, Some(index), "dedupeKey", event.dedupe_key.as_deref());

        let occurred_at = parse_client_timestamp(&event.occurred_at);
        if occurred_at.is_none() {
            issues.push(ValidationIssue::event(
                index,
                "occurredAt",
                "must be an ISO 8601 timestamp",
            ));
        }

        match parse_payload(index, input.scope, &event.event_type, &event.payload) {
            Ok(payload) => {
                if let Some(occurred_at) = occurred_at {
                    normalized.push(NormalizedEvent {
                        pending: PendingEvent {
                            id: event
                                .id
                                .clone()
                                .unwrap_or_else(|| Uuid::new_v4().to_string()),
                            event_type: event.event_type.clone(),
                            payload: event.payload.clone(),
                            occurred_at,
                            dedupe_key: event.dedupe_key.clone(),
                        },
                        payload,
                    });
                }
            }
            Err(payload_issues) => issues.extend(payload_issues),
        }
    }

    if issues.is_empty() {
        Ok(normalized)
    } else {
        Err(SyncEventValidationError { issues })
    }
}

/// Apply a client batch to the event log of its scope
///
/// # Errors
///
/// `SyncError::Validation` when any event fails normalization or its
/// schema; nothing is written in that case. Storage failures are
/// propagated unchanged.
pub async fn apply_incoming_events(
    db: &SyncDatabase,
    input: ApplyIncomingEventsInput,
) -> SyncResult<ApplyIncomingEventsResult> {
    let normalized = normalize_batch(&input).map_err(|err| {
        tracing::warn!(
            scope = %input.scope,
            client_mutation_id = %input.client_mutation_id,
            issues = err.issues.len(),
            "Rejected invalid sync batch"
        );
        SyncError::Validation(err)
    })?;

    let scope = input.scope;
    let mut tx = db.pool().begin().await?;
    let head = events::lock_head(&mut tx, scope).await?;

    if let Some(mutation) = events::find_mutation(&mut tx, &input.client_mutation_id).await? {
        let recorded = events::events_for_mutation(&mut tx, &input.client_mutation_id).await?;
        tx.rollback().await?;

        tracing::warn!(
            scope = %scope,
            client_mutation_id = %input.client_mutation_id,
            acknowledged_seq = mutation.acknowledged_seq,
            "Duplicate sync batch"
        );
        return Ok(ApplyIncomingEventsResult::Duplicate {
            server_seq: mutation.acknowledged_seq,
            events: recorded,
            mutation,
        });
    }

    if head != input.last_known_server_seq {
        tx.rollback().await?;

        tracing::warn!(
            scope = %scope,
            client_mutation_id = %input.client_mutation_id,
            last_known_server_seq = input.last_known_server_seq,
            server_seq = head,
            "Stale sync batch"
        );
        return Ok(ApplyIncomingEventsResult::Stale { server_seq: head });
    }

    let ids: Vec<String> = normalized.iter().map(|n| n.pending.id.clone()).collect();
    let keys: Vec<String> = normalized
        .iter()
        .filter_map(|n| n.pending.dedupe_key.clone())
        .collect();
    let existing_ids = events::existing_event_ids(&mut tx, &ids).await?;
    let existing_keys = events::existing_dedupe_keys(&mut tx, scope, &keys).await?;

    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut skipped = Vec::new();
    let mut accepted = Vec::new();
    let mut payloads = Vec::new();

    for (index, event) in normalized.into_iter().enumerate() {
        let NormalizedEvent { pending, payload } = event;
        let reason = if existing_ids.contains(&pending.id) || seen_ids.contains(&pending.id) {
            Some(SkipReason::DuplicateId)
        } else if pending
            .dedupe_key
            .as_ref()
            .is_some_and(|k| existing_keys.contains(k) || seen_keys.contains(k))
        {
            Some(SkipReason::DuplicateDedupeKey)
        } else {
            None
        };

        match reason {
            Some(reason) => skipped.push(SkippedEvent {
                index,
                id: pending.id,
                dedupe_key: pending.dedupe_key,
                reason,
            }),
            None => {
                seen_ids.insert(pending.id.clone());
                if let Some(key) = &pending.dedupe_key {
                    seen_keys.insert(key.clone());
                }
                accepted.push(pending);
                payloads.push(payload);
            }
        }
    }

    let (mutation, applied) = events::append_batch(
        &mut tx,
        scope,
        head,
        &input.client_id,
        &input.client_mutation_id,
        accepted,
    )
    .await?;

    let mut checked_in = 0usize;
    for (payload, event) in payloads.iter().zip(&applied) {
        match payload {
            EventPayload::InventoryAdjustment(adjustment) => {
                inventory::apply_adjustment(&mut tx, adjustment, mutation.updated_at).await?;
            }
            EventPayload::TicketCheckin(checkin) => {
                if tickets::project_checkin(&mut tx, checkin, event, mutation.updated_at).await? {
                    checked_in += 1;
                }
            }
        }
    }

    tx.commit().await?;

    tracing::info!(
        scope = %scope,
        client_id = %input.client_id,
        client_mutation_id = %input.client_mutation_id,
        applied = applied.len(),
        skipped = skipped.len(),
        checked_in,
        server_seq = mutation.acknowledged_seq,
        "Applied sync batch"
    );

    Ok(ApplyIncomingEventsResult::Applied {
        server_seq: mutation.acknowledged_seq,
        events: applied,
        skipped,
        mutation,
    })
}
