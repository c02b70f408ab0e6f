//! Sync handlers
//!
//! - `GET /api/v1/sync/:scope/baseline` - page through the current state
//! - `GET /api/v1/sync/:scope/deltas` - events after a known `serverSeq`
//! - `POST /api/v1/sync/:scope/events` - push a batch of offline events

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use stagedoor_sync::{
    ApplyIncomingEventsInput, ApplyIncomingEventsResult, BaselineOptions, BaselineResult,
    DeltaOptions, DeltaResult, IncomingEvent, Scope,
};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::SyncAuth;
use crate::server::StagedoorServer;

#[derive(Debug, Default, Deserialize)]
pub struct BaselineQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeltaQuery {
    /// Last `serverSeq` the client has applied
    #[serde(default)]
    pub since: i64,
    pub limit: Option<i64>,
}

/// Batch pushed by a device
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEventsRequest {
    pub client_mutation_id: String,
    pub last_known_server_seq: i64,
    #[serde(default)]
    pub events: Vec<IncomingEvent>,
}

fn parse_scope(raw: &str) -> Result<Scope, ApiError> {
    raw.parse::<Scope>().map_err(ApiError::from)
}

pub async fn baseline(
    State(server): State<StagedoorServer>,
    auth: SyncAuth,
    Path(scope): Path<String>,
    query: Result<Query<BaselineQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<BaselineResult>>, ApiError> {
    let scope = parse_scope(&scope)?;
    let Query(query) = query?;

    tracing::debug!(user_id = %auth.user_id(), scope = %scope, "Baseline requested");

    let page = server
        .engine()
        .baseline(
            scope,
            BaselineOptions {
                cursor: query.cursor,
                limit: query.limit,
            },
        )
        .await?;

    Ok(Json(api_success(page)))
}

pub async fn deltas(
    State(server): State<StagedoorServer>,
    auth: SyncAuth,
    Path(scope): Path<String>,
    query: Result<Query<DeltaQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<DeltaResult>>, ApiError> {
    let scope = parse_scope(&scope)?;
    let Query(query) = query?;

    tracing::debug!(
        user_id = %auth.user_id(),
        scope = %scope,
        since = query.since,
        "Deltas requested"
    );

    let deltas = server
        .engine()
        .deltas(scope, query.since, DeltaOptions { limit: query.limit })
        .await?;

    Ok(Json(api_success(deltas)))
}

/// Apply a pushed batch; the caller's token identifies the client
///
/// A stale batch is answered with 409 and the current `serverSeq`; the
/// device is expected to pull deltas and retry.
pub async fn push_events(
    State(server): State<StagedoorServer>,
    auth: SyncAuth,
    Path(scope): Path<String>,
    request: Result<Json<PushEventsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ApplyIncomingEventsResult>>, ApiError> {
    let scope = parse_scope(&scope)?;
    let Json(request) = request?;

    tracing::info!(
        user_id = %auth.user_id(),
        scope = %scope,
        client_mutation_id = %request.client_mutation_id,
        events_count = request.events.len(),
        "Push request received"
    );

    let result = server
        .engine()
        .apply(ApplyIncomingEventsInput {
            scope,
            client_id: auth.claims.user_id,
            client_mutation_id: request.client_mutation_id,
            events: request.events,
            last_known_server_seq: request.last_known_server_seq,
        })
        .await?;

    match result {
        ApplyIncomingEventsResult::Stale { server_seq } => {
            Err(ApiError::StaleSequence { server_seq })
        }
        other => Ok(Json(api_success(other))),
    }
}
