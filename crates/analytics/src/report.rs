//! Aggregate report for the PDF export endpoint.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use shadow_core::{Alert, PolicyRule};
use shadow_graph::{Edge, Node};

use crate::briefing::Briefing;
use crate::compliance::ComplianceReport;
use crate::dlp::DlpReport;
use crate::killchain::KillchainView;
use crate::profiles::UserProfile;
use crate::risk::RiskScore;
use crate::sessions::Session;
use crate::traffic::TrafficStats;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub traffic: TrafficStats,
    pub risk_scores: Vec<RiskScore>,
    pub profiles: Vec<UserProfile>,
    pub sessions: Vec<Session>,
    pub killchain: KillchainView,
    pub dlp: DlpReport,
    pub compliance: ComplianceReport,
    pub briefing: Briefing,
}

/// One-stop aggregation of every derived view over the same snapshot.
pub fn report(
    nodes: &[Node],
    edges: &[Edge],
    alerts: &[Alert],
    rules: &[PolicyRule],
    now: DateTime<Utc>,
    local_offset: FixedOffset,
) -> Report {
    Report {
        generated_at: now,
        traffic: crate::traffic::traffic_stats(nodes, edges, alerts),
        risk_scores: crate::risk::risk_scores(nodes, edges, alerts),
        profiles: crate::profiles::user_profiles(alerts, local_offset),
        sessions: crate::sessions::sessions(alerts),
        killchain: crate::killchain::killchain(alerts),
        dlp: crate::dlp::dlp_report(alerts),
        compliance: crate::compliance::compliance(alerts, rules),
        briefing: crate::briefing::briefing(alerts, rules, now, local_offset),
    }
}
