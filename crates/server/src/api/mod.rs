//! Domain-focused API endpoint modules.
//!
//! Shared error type and snapshot helpers live here in mod.rs; each
//! sub-module owns one responsibility area.

pub mod defense;
pub mod discovery;
pub(crate) mod doc;
pub mod policy;
pub mod rules;
pub mod status;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use shadow_core::Alert;
use shadow_graph::{Edge, Node};

use crate::state::AppState;

// ── Error model ──────────────────────────────────────────────────

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// 4xx are user-visible as `{error}`; 5xx carry a correlation id and the
/// full chain goes to the log only.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: msg, correlation_id: None },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody { error: msg, correlation_id: None },
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody { error: msg, correlation_id: None },
            ),
            ApiError::Internal(err) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                error!(correlation_id, "internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "internal error".to_string(),
                        correlation_id: Some(correlation_id),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ── Snapshot helpers ─────────────────────────────────────────────

/// Organization-local clock for working-hours analytics, from config.
pub(crate) fn local_offset(state: &AppState) -> chrono::FixedOffset {
    chrono::FixedOffset::east_opt(state.ctx.config.server.utc_offset_hours * 3_600)
        .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap())
}

/// Copy of the graph plus the alert history, taken once per request so
/// every derived view in the response describes the same instant.
pub(crate) struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub alerts: Vec<Alert>,
}

pub(crate) async fn snapshot(state: &AppState) -> Snapshot {
    let (nodes, edges) = {
        let graph = state.ctx.graph.read().await;
        (graph.list_nodes(None), graph.list_edges())
    };
    Snapshot {
        nodes,
        edges,
        alerts: state.ctx.alerts.snapshot(),
    }
}
