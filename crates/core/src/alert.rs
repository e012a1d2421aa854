use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Protocol;

/// Alert severity. Declaration order gives `Low < Medium < High` so the
/// analyzer can take a plain `max` over rule hits and the ML bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// Classifier output of the intelligence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlClass {
    Normal,
    Suspicious,
    ShadowAi,
}

impl std::fmt::Display for MlClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MlClass::Normal => write!(f, "normal"),
            MlClass::Suspicious => write!(f, "suspicious"),
            MlClass::ShadowAi => write!(f, "shadow_ai"),
        }
    }
}

/// Attacker kill-chain stage a given alert is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillchainStage {
    Reconnaissance,
    InitialAccess,
    Execution,
    Exfiltration,
    Impact,
}

impl KillchainStage {
    pub const ALL: [KillchainStage; 5] = [
        KillchainStage::Reconnaissance,
        KillchainStage::InitialAccess,
        KillchainStage::Execution,
        KillchainStage::Exfiltration,
        KillchainStage::Impact,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            KillchainStage::Reconnaissance => "reconnaissance",
            KillchainStage::InitialAccess => "initial_access",
            KillchainStage::Execution => "execution",
            KillchainStage::Exfiltration => "exfiltration",
            KillchainStage::Impact => "impact",
        }
    }
}

/// A security alert emitted by the analyzer.
///
/// Immutable once emitted, with one exception: the active-probe outcome
/// annotation appended to `description` via [`AlertRing::annotate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Source node id (internal endpoint).
    pub source: String,
    /// Target node id (display label of the destination).
    pub target: String,
    pub protocol: Protocol,
    pub destination_port: u16,
    pub source_port: u16,
    pub destination_ip: IpAddr,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// AI category (e.g. "LLM") or policy kind.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_classification: Option<MlClass>,
    pub ml_confidence: f64,
    pub ml_risk_score: f64,
    pub killchain_stage: KillchainStage,
}

impl Alert {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Bounded in-memory alert history.
///
/// Single writer (the analyzer), many readers (API handlers, analytics).
/// Readers always receive a copied snapshot; they never hold the lock
/// across serialization.
pub struct AlertRing {
    inner: RwLock<VecDeque<Alert>>,
    capacity: usize,
}

impl AlertRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an alert, evicting the oldest when full.
    pub fn push(&self, alert: Alert) {
        let mut ring = self.inner.write().unwrap();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(alert);
    }

    /// Chronological copy of the buffered alerts (oldest first).
    pub fn snapshot(&self) -> Vec<Alert> {
        self.inner.read().unwrap().iter().cloned().collect()
    }

    /// Copy of the buffered alerts, newest first (API ordering).
    pub fn snapshot_newest_first(&self) -> Vec<Alert> {
        let mut alerts = self.snapshot();
        alerts.reverse();
        alerts
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Append a probe-outcome annotation to an alert's description.
    /// Returns false if the alert has already been evicted.
    pub fn annotate(&self, alert_id: &str, suffix: &str) -> bool {
        let mut ring = self.inner.write().unwrap();
        match ring.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.description.push_str(suffix);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            timestamp: Utc::now(),
            severity: Severity::Low,
            source: "10.0.0.5".into(),
            target: "example.com".into(),
            protocol: Protocol::Https,
            destination_port: 443,
            source_port: 50000,
            destination_ip: "203.0.113.5".parse().unwrap(),
            bytes_sent: 100,
            bytes_received: 200,
            description: "test".into(),
            matched_rule: None,
            category: "test".into(),
            ml_classification: None,
            ml_confidence: 0.0,
            ml_risk_score: 0.0,
            killchain_stage: KillchainStage::Reconnaissance,
        }
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(
            Severity::Medium.max(Severity::High),
            Severity::High
        );
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let ring = AlertRing::new(3);
        for i in 0..5 {
            ring.push(alert(&format!("a{i}")));
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].id, "a2");
        assert_eq!(snap[2].id, "a4");
    }

    #[test]
    fn annotate_appends_to_description() {
        let ring = AlertRing::new(4);
        ring.push(alert("x"));
        assert!(ring.annotate("x", " [Active probe: confirmed AI service]"));
        assert!(!ring.annotate("missing", " nope"));
        let snap = ring.snapshot();
        assert!(snap[0].description.ends_with("confirmed AI service]"));
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"HIGH\"");
        assert_eq!(
            serde_json::to_string(&MlClass::ShadowAi).unwrap(),
            "\"shadow_ai\""
        );
    }
}
