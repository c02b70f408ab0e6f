//! Bearer sync token extraction

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use error_common::codes;
use stagedoor_sync::SyncTokenClaims;

use crate::error::ApiError;
use crate::server::StagedoorServer;

/// The verified caller of a sync route
///
/// Usage:
/// ```rust,ignore
/// pub async fn handler(auth: SyncAuth) -> Result<..., ApiError> {
///     tracing::info!(user_id = %auth.user_id(), "...");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SyncAuth {
    pub claims: SyncTokenClaims,
}

impl SyncAuth {
    pub fn user_id(&self) -> &str {
        &self.claims.user_id
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<StagedoorServer> for SyncAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &StagedoorServer,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            ApiError::authentication(codes::authentication::TOKEN_MISSING, "Missing bearer token")
        })?;

        let claims = state.engine().verify_token(token).ok_or_else(|| {
            tracing::warn!(path = %parts.uri.path(), "Rejected sync token");
            ApiError::authentication(
                codes::authentication::TOKEN_INVALID,
                "Invalid or expired sync token",
            )
        })?;

        Ok(SyncAuth { claims })
    }
}
