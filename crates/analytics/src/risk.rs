//! Per-internal-endpoint risk rollup.

use std::collections::HashMap;

use serde::Serialize;

use shadow_core::{Alert, NodeType};
use shadow_graph::{Edge, Node};

use crate::SeverityBreakdown;

#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub ip: String,
    pub risk_pct: f64,
    pub total_alerts: u64,
    pub breakdown: SeverityBreakdown,
}

/// `risk_pct = min(100, 5·high + 2·medium + low + 0.05·edge_count)`,
/// computed per internal node, sorted descending.
pub fn risk_scores(nodes: &[Node], edges: &[Edge], alerts: &[Alert]) -> Vec<RiskScore> {
    let mut by_source: HashMap<&str, SeverityBreakdown> = HashMap::new();
    for alert in alerts {
        by_source.entry(&alert.source).or_default().add(alert.severity);
    }

    let mut edge_counts: HashMap<&str, u64> = HashMap::new();
    for edge in edges {
        *edge_counts.entry(edge.source.as_str()).or_default() += 1;
    }

    let mut scores: Vec<RiskScore> = nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Internal)
        .map(|n| {
            let breakdown = by_source.get(n.id.as_str()).copied().unwrap_or_default();
            let edge_count = edge_counts.get(n.id.as_str()).copied().unwrap_or(0);
            let risk = 5.0 * breakdown.high as f64
                + 2.0 * breakdown.medium as f64
                + breakdown.low as f64
                + 0.05 * edge_count as f64;
            RiskScore {
                ip: n.id.clone(),
                risk_pct: risk.min(100.0),
                total_alerts: breakdown.total(),
                breakdown,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.risk_pct.total_cmp(&a.risk_pct).then(a.ip.cmp(&b.ip)));
    scores
}
