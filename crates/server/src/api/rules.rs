//! Policy rule CRUD.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use shadow_core::{PolicyRule, PolicyRuleDraft};
use shadow_detect::PolicyError;

use super::ApiError;
use crate::state::AppState;

impl From<PolicyError> for ApiError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::NotFound(id) => ApiError::NotFound(format!("rule not found: {id}")),
            PolicyError::Conflict(name) => {
                ApiError::Conflict(format!("rule already exists: {name}"))
            }
        }
    }
}

#[utoipa::path(get, path = "/v1/policy/rules", tag = "Rules",
    responses((status = 200, description = "All policy rules")))]
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<PolicyRule>> {
    Json(state.ctx.policies.snapshot().as_ref().clone())
}

#[utoipa::path(post, path = "/v1/policy/rules", tag = "Rules",
    responses(
        (status = 200, description = "Stored rule with assigned id"),
        (status = 409, description = "Duplicate name + service"),
    ))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<PolicyRuleDraft>,
) -> Result<Json<PolicyRule>, ApiError> {
    if draft.name.trim().is_empty() {
        return Err(ApiError::BadRequest("rule name must not be empty".into()));
    }
    Ok(Json(state.ctx.policies.create(draft)?))
}

#[utoipa::path(put, path = "/v1/policy/rules/{id}/toggle", tag = "Rules",
    responses(
        (status = 200, description = "Rule with flipped enabled flag"),
        (status = 404, description = "Unknown rule id"),
    ))]
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PolicyRule>, ApiError> {
    Ok(Json(state.ctx.policies.toggle(&id)?))
}

#[utoipa::path(delete, path = "/v1/policy/rules/{id}", tag = "Rules",
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Unknown rule id"),
    ))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.ctx.policies.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
