//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::live;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/status", get(api::status::status))
        .route("/discovery/nodes", get(api::discovery::nodes))
        .route("/discovery/edges", get(api::discovery::edges))
        .route("/discovery/risk-scores", get(api::discovery::risk_scores))
        .route("/discovery/traffic-stats", get(api::discovery::traffic_stats))
        .route("/policy/alerts", get(api::policy::alerts))
        .route("/policy/timeline", get(api::policy::timeline))
        .route("/policy/profiles", get(api::policy::profiles))
        .route("/policy/sessions", get(api::policy::sessions))
        .route("/policy/dlp", get(api::policy::dlp))
        .route("/policy/killchain", get(api::policy::killchain))
        .route("/policy/compliance", get(api::policy::compliance))
        .route("/policy/briefing", get(api::policy::briefing))
        .route("/policy/report", get(api::policy::report))
        .route(
            "/policy/rules",
            get(api::rules::list).post(api::rules::create),
        )
        .route("/policy/rules/{id}/toggle", put(api::rules::toggle))
        .route("/policy/rules/{id}", delete(api::rules::delete))
        .route("/policy/blocked", get(api::defense::blocked))
        .route("/policy/unblock/{ip}", post(api::defense::unblock));

    Router::new()
        .nest("/v1", v1)
        .route("/ws", get(live::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}
