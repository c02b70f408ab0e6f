//! Stagedoor sync HTTP server
//!
//! Exposes the sync engine over JSON:
//! - `GET /health`
//! - `GET /api/v1/sync/:scope/baseline` and `/deltas`
//! - `POST /api/v1/sync/:scope/events`
//! - `POST /api/v1/tickets/check-in`
//!
//! Every route except `/health` requires `Authorization: Bearer <sync token>`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{api_success, ApiError, ApiResponse};
pub use server::StagedoorServer;

/// Build the application router
pub fn create_app(server: StagedoorServer) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::sync_routes())
        .merge(routes::ticket_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(server)
}
