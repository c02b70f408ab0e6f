use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use stagedoor_sync::{TicketCheckInInput, TicketCheckInResult};

use crate::error::{api_success, ApiError, ApiResponse};
use crate::middleware::SyncAuth;
use crate::server::StagedoorServer;

/// Check a ticket in
///
/// The scanner's token user becomes the client id unless the body names one.
pub async fn check_in(
    State(server): State<StagedoorServer>,
    auth: SyncAuth,
    input: Result<Json<TicketCheckInInput>, JsonRejection>,
) -> Result<Json<ApiResponse<TicketCheckInResult>>, ApiError> {
    let Json(mut input) = input?;
    if input.client_id.is_none() {
        input.client_id = Some(auth.claims.user_id);
    }

    let result = server.engine().check_in(input).await?;
    Ok(Json(api_success(result)))
}
