//! Data-loss-prevention incident extraction.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use shadow_core::{Alert, Severity};

/// Outbound volume above which any alert is a bulk-transfer incident.
const BULK_BYTES: u64 = 1_048_576;

#[derive(Debug, Clone, Serialize)]
pub struct DlpIncident {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub target: String,
    pub severity: Severity,
    pub bytes_sent: u64,
    #[serde(rename = "type")]
    pub incident_type: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlpSummary {
    pub total: usize,
    pub by_type: HashMap<&'static str, usize>,
    pub bytes_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlpReport {
    pub incidents: Vec<DlpIncident>,
    pub summary: DlpSummary,
}

struct Pattern {
    regex: Regex,
    incident_type: &'static str,
    label: &'static str,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"(?i)ssn|social security|passport|credit card|date of birth",
                "pii",
                "Possible PII disclosure",
            ),
            (
                r"(?i)password|api[_ ]?key|secret|token|credential",
                "secret",
                "Possible credential leak",
            ),
            (
                r"(?i)source code|repository|\.git\b|proprietary algorithm",
                "code",
                "Possible source code exposure",
            ),
            (
                r"(?i)confidential|internal document|\.docx\b|\.xlsx\b|\.pdf\b",
                "document",
                "Possible document exfiltration",
            ),
        ]
        .into_iter()
        .map(|(pattern, incident_type, label)| Pattern {
            regex: Regex::new(pattern).unwrap(),
            incident_type,
            label,
        })
        .collect()
    })
}

pub fn dlp_report(alerts: &[Alert]) -> DlpReport {
    let mut incidents = Vec::new();
    for alert in alerts {
        if let Some((incident_type, label)) = classify(alert) {
            incidents.push(DlpIncident {
                alert_id: alert.id.clone(),
                timestamp: alert.timestamp,
                source: alert.source.clone(),
                target: alert.target.clone(),
                severity: alert.severity,
                bytes_sent: alert.bytes_sent,
                incident_type,
                label,
            });
        }
    }

    let mut by_type: HashMap<&'static str, usize> = HashMap::new();
    let mut bytes_total = 0u64;
    for incident in &incidents {
        *by_type.entry(incident.incident_type).or_default() += 1;
        bytes_total += incident.bytes_sent;
    }

    DlpReport {
        summary: DlpSummary {
            total: incidents.len(),
            by_type,
            bytes_total,
        },
        incidents,
    }
}

fn classify(alert: &Alert) -> Option<(&'static str, &'static str)> {
    for pattern in patterns() {
        if pattern.regex.is_match(&alert.description) {
            return Some((pattern.incident_type, pattern.label));
        }
    }
    (alert.bytes_sent > BULK_BYTES).then_some(("bulk_upload", "Large outbound transfer"))
}
