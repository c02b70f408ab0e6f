use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::server::StagedoorServer;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    /// Current timestamp in RFC3339 format
    pub timestamp: String,
    pub version: String,
    /// Individual dependency checks
    pub checks: HashMap<String, String>,
}

/// Liveness plus a database round trip
pub async fn health_check(State(server): State<StagedoorServer>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = server.engine().db().is_healthy().await;

    let mut checks = HashMap::new();
    checks.insert(
        "database".to_string(),
        if database_ok { "healthy" } else { "unhealthy" }.to_string(),
    );

    let (status_code, status) = if database_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }),
    )
}
