//! Blocklist read and manual unblock.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use shadow_defense::BlocklistEntry;

use super::ApiError;
use crate::state::AppState;

#[utoipa::path(get, path = "/v1/policy/blocked", tag = "Defense",
    responses((status = 200, description = "Active (non-expired) blocklist entries")))]
pub async fn blocked(State(state): State<Arc<AppState>>) -> Json<Vec<BlocklistEntry>> {
    Json(state.ctx.responses.list_blocked())
}

#[utoipa::path(post, path = "/v1/policy/unblock/{ip}", tag = "Defense",
    responses(
        (status = 204, description = "Entry removed"),
        (status = 400, description = "Malformed IP"),
        (status = 404, description = "No entry for this IP"),
    ))]
pub async fn unblock(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid IP: {ip}")))?;
    if state.ctx.responses.unblock(ip) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no block entry for {ip}")))
    }
}
