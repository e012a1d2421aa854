use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use shadow_core::{NodeType, Protocol};

use crate::error::StoreError;
use crate::persist::{Container, Row, RowKind};

/// Graph vertex. Identity is the case-folded `id` (IP literal or domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub label: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub risk_score: f64,
    pub alert_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Directed edge, at most one per ordered `(source, target)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub protocol: Protocol,
    pub dst_port: u16,
    pub byte_count: u64,
    pub flow_count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Property merge for a node upsert.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub node_type: NodeType,
    pub label: Option<String>,
    pub seen: DateTime<Utc>,
    /// Overwrites the stored score when set.
    pub risk_score: Option<f64>,
    pub alert_increment: u64,
    pub department: Option<String>,
}

impl NodeUpsert {
    pub fn observed(node_type: NodeType, seen: DateTime<Utc>) -> Self {
        Self {
            node_type,
            label: None,
            seen,
            risk_score: None,
            alert_increment: 0,
            department: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_department(mut self, department: Option<String>) -> Self {
        self.department = department;
        self
    }
}

/// Property merge for an edge upsert.
#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub protocol: Protocol,
    pub dst_port: u16,
    pub byte_delta: u64,
    pub seen: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: HashMap<String, usize>,
}

/// Upsertable directed graph with optional on-disk persistence.
///
/// Writers are serialized by the surrounding lock; every acknowledged
/// upsert has been flushed to the container first. Reads hand out clones,
/// so a reader always sees a self-consistent row.
pub struct GraphStore {
    nodes: HashMap<String, Node>,
    edges: HashMap<(String, String), Edge>,
    container: Option<Container>,
}

impl GraphStore {
    /// Non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            container: None,
        }
    }

    /// Open (or create) the on-disk container and replay its rows.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (container, rows) = Container::open(path)?;
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();

        // Last-write-wins replay; rows are append-ordered.
        for row in rows {
            match row.kind {
                RowKind::Node => {
                    if let Ok(node) = serde_json::from_str::<Node>(&row.properties_json) {
                        nodes.insert(node.id.clone(), node);
                    }
                }
                RowKind::Edge => {
                    if let Ok(edge) = serde_json::from_str::<Edge>(&row.properties_json) {
                        edges.insert((edge.source.clone(), edge.target.clone()), edge);
                    }
                }
            }
        }

        info!(
            nodes = nodes.len(),
            edges = edges.len(),
            path = %path.display(),
            "graph store opened"
        );

        let mut store = Self {
            nodes,
            edges,
            container: Some(container),
        };
        store.maybe_compact()?;
        Ok(store)
    }

    fn canonical(id: &str) -> String {
        id.trim().to_ascii_lowercase()
    }

    /// Create the node if absent, else merge properties. Flushed before
    /// returning. Returns the stored row.
    pub fn upsert_node(&mut self, id: &str, up: &NodeUpsert) -> Result<Node, StoreError> {
        let id = Self::canonical(id);
        let node = match self.nodes.get_mut(&id) {
            Some(node) => {
                if up.seen > node.last_seen {
                    node.last_seen = up.seen;
                }
                // Sticky Shadow: the type only ever upgrades.
                if up.node_type == NodeType::Shadow {
                    node.node_type = NodeType::Shadow;
                }
                if let Some(label) = &up.label {
                    if !label.is_empty() {
                        node.label = label.clone();
                    }
                }
                if let Some(score) = up.risk_score {
                    node.risk_score = score.clamp(0.0, 100.0);
                }
                node.alert_count += up.alert_increment;
                if node.department.is_none() {
                    node.department = up.department.clone();
                }
                node.clone()
            }
            None => {
                let node = Node {
                    id: id.clone(),
                    node_type: up.node_type,
                    label: up.label.clone().unwrap_or_else(|| id.clone()),
                    first_seen: up.seen,
                    last_seen: up.seen,
                    risk_score: up.risk_score.unwrap_or(0.0).clamp(0.0, 100.0),
                    alert_count: up.alert_increment,
                    department: up.department.clone(),
                };
                self.nodes.insert(id.clone(), node.clone());
                node
            }
        };

        self.persist_node(&node)?;
        Ok(node)
    }

    /// Aggregate an edge observation. Both endpoints must exist.
    pub fn upsert_edge(
        &mut self,
        source: &str,
        target: &str,
        up: &EdgeUpsert,
    ) -> Result<Edge, StoreError> {
        let source = Self::canonical(source);
        let target = Self::canonical(target);
        if !self.nodes.contains_key(&source) {
            return Err(StoreError::MissingEndpoint(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(StoreError::MissingEndpoint(target));
        }

        let key = (source.clone(), target.clone());
        let edge = match self.edges.get_mut(&key) {
            Some(edge) => {
                edge.byte_count += up.byte_delta;
                edge.flow_count += 1;
                edge.protocol = up.protocol;
                edge.dst_port = up.dst_port;
                if up.seen > edge.last_seen {
                    edge.last_seen = up.seen;
                }
                edge.clone()
            }
            None => {
                let edge = Edge {
                    source,
                    target,
                    protocol: up.protocol,
                    dst_port: up.dst_port,
                    byte_count: up.byte_delta,
                    flow_count: 1,
                    last_seen: up.seen,
                };
                self.edges.insert(key, edge.clone());
                edge
            }
        };

        self.persist_edge(&edge)?;
        Ok(edge)
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(&Self::canonical(id)).cloned()
    }

    pub fn list_nodes(&self, node_type: Option<NodeType>) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| node_type.map_or(true, |t| n.node_type == t))
            .cloned()
            .collect()
    }

    pub fn list_edges(&self) -> Vec<Edge> {
        self.edges.values().cloned().collect()
    }

    /// Outgoing neighbors of a node.
    pub fn neighbors(&self, id: &str) -> Vec<(Edge, Node)> {
        let id = Self::canonical(id);
        self.edges
            .values()
            .filter(|e| e.source == id)
            .filter_map(|e| self.nodes.get(&e.target).map(|n| (e.clone(), n.clone())))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type: HashMap<String, usize> = HashMap::new();
        for node in self.nodes.values() {
            *nodes_by_type.entry(node.node_type.to_string()).or_default() += 1;
        }
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            nodes_by_type,
        }
    }

    /// Empty both collections and truncate the container.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.nodes.clear();
        self.edges.clear();
        if let Some(container) = &mut self.container {
            container.truncate()?;
        }
        Ok(())
    }

    fn persist_node(&mut self, node: &Node) -> Result<(), StoreError> {
        if let Some(container) = &mut self.container {
            container.append(&Row {
                kind: RowKind::Node,
                key: node.id.clone(),
                properties_json: serde_json::to_string(node)?,
                updated_at: node.last_seen,
            })?;
        }
        Ok(())
    }

    fn persist_edge(&mut self, edge: &Edge) -> Result<(), StoreError> {
        if let Some(container) = &mut self.container {
            container.append(&Row {
                kind: RowKind::Edge,
                key: format!("{}→{}", edge.source, edge.target),
                properties_json: serde_json::to_string(edge)?,
                updated_at: edge.last_seen,
            })?;
        }
        Ok(())
    }

    /// Rewrite the container when the append log has grown well past the
    /// live row set (replay stays idempotent either way).
    fn maybe_compact(&mut self) -> Result<(), StoreError> {
        let live = self.nodes.len() + self.edges.len();
        let Some(container) = &mut self.container else {
            return Ok(());
        };
        if container.rows_written() <= live as u64 * 4 + 1_024 {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(live);
        for node in self.nodes.values() {
            rows.push(Row {
                kind: RowKind::Node,
                key: node.id.clone(),
                properties_json: serde_json::to_string(node)?,
                updated_at: node.last_seen,
            });
        }
        for edge in self.edges.values() {
            rows.push(Row {
                kind: RowKind::Edge,
                key: format!("{}→{}", edge.source, edge.target),
                properties_json: serde_json::to_string(edge)?,
                updated_at: edge.last_seen,
            });
        }
        container.rewrite(&rows)?;
        info!(rows = rows.len(), "graph container compacted");
        Ok(())
    }
}
