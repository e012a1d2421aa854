//! Graph discovery: nodes, edges, risk scores, traffic stats.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use shadow_analytics::risk::RiskScore;
use shadow_analytics::traffic::TrafficStats;
use shadow_graph::{Edge, Node};

use super::snapshot;
use crate::state::AppState;

#[utoipa::path(get, path = "/v1/discovery/nodes", tag = "Discovery",
    responses((status = 200, description = "All graph nodes")))]
pub async fn nodes(State(state): State<Arc<AppState>>) -> Json<Vec<Node>> {
    let mut nodes = state.ctx.graph.read().await.list_nodes(None);
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    Json(nodes)
}

#[utoipa::path(get, path = "/v1/discovery/edges", tag = "Discovery",
    responses((status = 200, description = "All graph edges")))]
pub async fn edges(State(state): State<Arc<AppState>>) -> Json<Vec<Edge>> {
    let mut edges = state.ctx.graph.read().await.list_edges();
    edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    Json(edges)
}

#[utoipa::path(get, path = "/v1/discovery/risk-scores", tag = "Discovery",
    responses((status = 200, description = "Internal endpoints ranked by risk")))]
pub async fn risk_scores(State(state): State<Arc<AppState>>) -> Json<Vec<RiskScore>> {
    let snap = snapshot(&state).await;
    Json(shadow_analytics::risk::risk_scores(
        &snap.nodes,
        &snap.edges,
        &snap.alerts,
    ))
}

#[utoipa::path(get, path = "/v1/discovery/traffic-stats", tag = "Discovery",
    responses((status = 200, description = "Aggregate traffic statistics")))]
pub async fn traffic_stats(State(state): State<Arc<AppState>>) -> Json<TrafficStats> {
    let snap = snapshot(&state).await;
    Json(shadow_analytics::traffic::traffic_stats(
        &snap.nodes,
        &snap.edges,
        &snap.alerts,
    ))
}
