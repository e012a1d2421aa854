//! Server mode, uptime, and pipeline counters.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use shadow_analyzer::AnalyzerStatsSnapshot;
use shadow_bus::TopicStats;
use shadow_defense::InterrogatorStats;

use crate::state::{AppState, VERSION};

#[derive(Serialize)]
pub struct StatusResponse {
    pub mode: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub analyzer: AnalyzerStatsSnapshot,
    pub broker: Vec<TopicStats>,
    pub probes: InterrogatorStats,
    pub sessions_tracked: usize,
    pub blocked_count: usize,
    pub model_loaded: bool,
}

#[utoipa::path(get, path = "/v1/status", tag = "Status",
    responses((status = 200, description = "Runtime mode, uptime, and pipeline counters")))]
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let ctx = &state.ctx;
    Json(StatusResponse {
        mode: state.mode,
        uptime_seconds: state.uptime_seconds(),
        version: VERSION,
        analyzer: ctx.stats.snapshot(),
        broker: ctx.bus.stats(),
        probes: ctx.interrogator.stats(),
        sessions_tracked: ctx.intel.session_count(),
        blocked_count: ctx.responses.list_blocked().len(),
        model_loaded: ctx.intel.has_model(),
    })
}
