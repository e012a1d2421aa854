//! Aggregate traffic statistics for the discovery dashboard.

use std::collections::HashMap;

use serde::Serialize;

use shadow_core::Alert;
use shadow_graph::{Edge, Node};

use crate::SeverityBreakdown;

#[derive(Debug, Clone, Serialize)]
pub struct TrafficTotals {
    pub nodes: usize,
    pub edges: usize,
    pub flows: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopDestination {
    pub id: String,
    pub label: String,
    pub flow_count: u64,
    pub byte_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficStats {
    pub totals: TrafficTotals,
    pub node_types: HashMap<String, usize>,
    pub protocol_distribution: HashMap<String, u64>,
    pub severity_distribution: SeverityBreakdown,
    pub top_destinations: Vec<TopDestination>,
}

pub fn traffic_stats(nodes: &[Node], edges: &[Edge], alerts: &[Alert]) -> TrafficStats {
    let mut node_types: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        *node_types.entry(node.node_type.to_string()).or_default() += 1;
    }

    let mut protocol_distribution: HashMap<String, u64> = HashMap::new();
    let mut flows = 0u64;
    let mut bytes = 0u64;
    let mut per_target: HashMap<&str, (u64, u64)> = HashMap::new();
    for edge in edges {
        *protocol_distribution.entry(edge.protocol.to_string()).or_default() += edge.flow_count;
        flows += edge.flow_count;
        bytes += edge.byte_count;
        let entry = per_target.entry(edge.target.as_str()).or_default();
        entry.0 += edge.flow_count;
        entry.1 += edge.byte_count;
    }

    let mut severity_distribution = SeverityBreakdown::default();
    for alert in alerts {
        severity_distribution.add(alert.severity);
    }

    let labels: HashMap<&str, &str> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.label.as_str()))
        .collect();
    let mut top_destinations: Vec<TopDestination> = per_target
        .into_iter()
        .map(|(id, (flow_count, byte_count))| TopDestination {
            id: id.to_string(),
            label: labels.get(id).copied().unwrap_or(id).to_string(),
            flow_count,
            byte_count,
        })
        .collect();
    top_destinations.sort_by(|a, b| b.flow_count.cmp(&a.flow_count).then(a.id.cmp(&b.id)));
    top_destinations.truncate(10);

    TrafficStats {
        totals: TrafficTotals {
            nodes: nodes.len(),
            edges: edges.len(),
            flows,
            bytes,
        },
        node_types,
        protocol_distribution,
        severity_distribution,
        top_destinations,
    }
}
