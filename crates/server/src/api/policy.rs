//! Policy-side read views: alerts, timeline, profiles, sessions, DLP,
//! kill-chain, compliance, briefing, and the aggregate report.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use shadow_analytics::briefing::Briefing;
use shadow_analytics::compliance::ComplianceReport;
use shadow_analytics::dlp::DlpReport;
use shadow_analytics::killchain::KillchainView;
use shadow_analytics::profiles::UserProfile;
use shadow_analytics::report::Report;
use shadow_analytics::sessions::Session;
use shadow_analytics::timeline::Timeline;
use shadow_core::Alert;

use super::{local_offset, snapshot};
use crate::state::AppState;

#[utoipa::path(get, path = "/v1/policy/alerts", tag = "Policy",
    responses((status = 200, description = "Last 1000 alerts, newest first")))]
pub async fn alerts(State(state): State<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.ctx.alerts.snapshot_newest_first())
}

#[utoipa::path(get, path = "/v1/policy/timeline", tag = "Policy",
    responses((status = 200, description = "Per-minute severity buckets for the last hour")))]
pub async fn timeline(State(state): State<Arc<AppState>>) -> Json<Timeline> {
    let alerts = state.ctx.alerts.snapshot();
    Json(shadow_analytics::timeline::timeline(&alerts, Utc::now()))
}

#[utoipa::path(get, path = "/v1/policy/profiles", tag = "Policy",
    responses((status = 200, description = "Behavioral profiles per alerting source")))]
pub async fn profiles(State(state): State<Arc<AppState>>) -> Json<Vec<UserProfile>> {
    let alerts = state.ctx.alerts.snapshot();
    Json(shadow_analytics::profiles::user_profiles(
        &alerts,
        local_offset(&state),
    ))
}

#[utoipa::path(get, path = "/v1/policy/sessions", tag = "Policy",
    responses((status = 200, description = "Reconstructed alert sessions")))]
pub async fn sessions(State(state): State<Arc<AppState>>) -> Json<Vec<Session>> {
    let alerts = state.ctx.alerts.snapshot();
    Json(shadow_analytics::sessions::sessions(&alerts))
}

#[utoipa::path(get, path = "/v1/policy/dlp", tag = "Policy",
    responses((status = 200, description = "Data-loss incidents and summary")))]
pub async fn dlp(State(state): State<Arc<AppState>>) -> Json<DlpReport> {
    let alerts = state.ctx.alerts.snapshot();
    Json(shadow_analytics::dlp::dlp_report(&alerts))
}

#[utoipa::path(get, path = "/v1/policy/killchain", tag = "Policy",
    responses((status = 200, description = "Kill-chain stage rollup")))]
pub async fn killchain(State(state): State<Arc<AppState>>) -> Json<KillchainView> {
    let alerts = state.ctx.alerts.snapshot();
    Json(shadow_analytics::killchain::killchain(&alerts))
}

#[utoipa::path(get, path = "/v1/policy/compliance", tag = "Policy",
    responses((status = 200, description = "Framework compliance scoring")))]
pub async fn compliance(State(state): State<Arc<AppState>>) -> Json<ComplianceReport> {
    let alerts = state.ctx.alerts.snapshot();
    let rules = state.ctx.policies.snapshot();
    Json(shadow_analytics::compliance::compliance(&alerts, &rules))
}

#[utoipa::path(get, path = "/v1/policy/briefing", tag = "Policy",
    responses((status = 200, description = "Executive briefing")))]
pub async fn briefing(State(state): State<Arc<AppState>>) -> Json<Briefing> {
    let alerts = state.ctx.alerts.snapshot();
    let rules = state.ctx.policies.snapshot();
    Json(shadow_analytics::briefing::briefing(
        &alerts,
        &rules,
        Utc::now(),
        local_offset(&state),
    ))
}

#[utoipa::path(get, path = "/v1/policy/report", tag = "Policy",
    responses((status = 200, description = "Aggregate report for PDF export")))]
pub async fn report(State(state): State<Arc<AppState>>) -> Json<Report> {
    let snap = snapshot(&state).await;
    let rules = state.ctx.policies.snapshot();
    Json(shadow_analytics::report::report(
        &snap.nodes,
        &snap.edges,
        &snap.alerts,
        &rules,
        Utc::now(),
        local_offset(&state),
    ))
}
