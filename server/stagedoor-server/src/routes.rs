pub mod paths;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    handlers::{health, sync, tickets},
    server::StagedoorServer,
};

/// Create health check routes
pub fn health_routes() -> Router<StagedoorServer> {
    Router::new().route(paths::health::HEALTH, get(health::health_check))
}

/// Create sync routes for offline replicas
pub fn sync_routes() -> Router<StagedoorServer> {
    Router::new()
        .route(paths::api_v1::SYNC_BASELINE, get(sync::baseline))
        .route(paths::api_v1::SYNC_DELTAS, get(sync::deltas))
        .route(paths::api_v1::SYNC_EVENTS, post(sync::push_events))
}

/// Create ticket routes
pub fn ticket_routes() -> Router<StagedoorServer> {
    Router::new().route(paths::api_v1::TICKET_CHECK_IN, post(tickets::check_in))
}
