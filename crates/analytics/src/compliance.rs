//! Compliance scoring against SOC2, GDPR, and HIPAA check sets.
//!
//! Each framework has a closed list of checks whose status is computed
//! from pipeline counters. Framework score is `100·pass/total`; overall
//! is the mean across frameworks.

use serde::Serialize;

use shadow_core::{Alert, PolicyAction, PolicyRule, Severity};

use crate::dlp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceCheck {
    pub id: &'static str,
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Framework {
    pub name: &'static str,
    pub score: f64,
    pub checks: Vec<ComplianceCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub frameworks: Vec<Framework>,
    pub overall_score: f64,
    pub total_checks: usize,
    pub violations: Vec<String>,
}

struct Counters {
    shadow_ai_alerts: u64,
    high_alerts: u64,
    total_alerts: u64,
    dlp_total: usize,
    pii_incidents: usize,
    enabled_block_rules: usize,
}

fn counters(alerts: &[Alert], rules: &[PolicyRule]) -> Counters {
    let dlp = dlp::dlp_report(alerts);
    Counters {
        shadow_ai_alerts: alerts
            .iter()
            .filter(|a| a.matched_rule.as_deref().is_some_and(|r| r.starts_with("ai_domain:")))
            .count() as u64,
        high_alerts: alerts.iter().filter(|a| a.severity == Severity::High).count() as u64,
        total_alerts: alerts.len() as u64,
        dlp_total: dlp.summary.total,
        pii_incidents: dlp.summary.by_type.get("pii").copied().unwrap_or(0),
        enabled_block_rules: rules
            .iter()
            .filter(|r| r.enabled && r.action == PolicyAction::Block)
            .count(),
    }
}

fn threshold(value: u64, warn_above: u64, fail_above: u64, what: &str) -> (CheckStatus, String) {
    if value > fail_above {
        (CheckStatus::Fail, format!("{value} {what} (limit {fail_above})"))
    } else if value > warn_above {
        (CheckStatus::Warn, format!("{value} {what}"))
    } else {
        (CheckStatus::Pass, format!("{value} {what}"))
    }
}

pub fn compliance(alerts: &[Alert], rules: &[PolicyRule]) -> ComplianceReport {
    let c = counters(alerts, rules);
    let frameworks = vec![soc2(&c), gdpr(&c), hipaa(&c)];

    let total_checks: usize = frameworks.iter().map(|f| f.checks.len()).sum();
    let overall_score =
        frameworks.iter().map(|f| f.score).sum::<f64>() / frameworks.len() as f64;
    let violations = frameworks
        .iter()
        .flat_map(|f| {
            f.checks
                .iter()
                .filter(|check| check.status == CheckStatus::Fail)
                .map(move |check| format!("{}: {}", f.name, check.name))
        })
        .collect();

    ComplianceReport {
        frameworks,
        overall_score,
        total_checks,
        violations,
    }
}

fn score(checks: &[ComplianceCheck]) -> f64 {
    let pass = checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
    100.0 * pass as f64 / checks.len() as f64
}

fn soc2(c: &Counters) -> Framework {
    // Shadow AI monitoring fails outright when usage is rampant and no
    // block rule exists to contain it.
    let (shadow_status, shadow_detail) = if c.shadow_ai_alerts > 10 && c.enabled_block_rules == 0 {
        (
            CheckStatus::Fail,
            format!(
                "{} Shadow AI alerts with no enabled block rule",
                c.shadow_ai_alerts
            ),
        )
    } else if c.shadow_ai_alerts > 0 {
        (
            CheckStatus::Warn,
            format!("{} Shadow AI alerts observed", c.shadow_ai_alerts),
        )
    } else {
        (CheckStatus::Pass, "no Shadow AI usage observed".to_string())
    };

    let (access_status, access_detail) = threshold(c.high_alerts, 5, 20, "high-severity alerts");
    let checks = vec![
        ComplianceCheck {
            id: "soc2-cc6.7",
            name: "Shadow AI monitoring",
            status: shadow_status,
            detail: shadow_detail,
        },
        ComplianceCheck {
            id: "soc2-cc6.1",
            name: "Logical access restriction",
            status: access_status,
            detail: access_detail,
        },
        ComplianceCheck {
            id: "soc2-cc7.2",
            name: "Anomaly detection coverage",
            status: CheckStatus::Pass,
            detail: format!("{} alerts evaluated", c.total_alerts),
        },
    ];
    Framework {
        name: "SOC2",
        score: score(&checks),
        checks,
    }
}

fn gdpr(c: &Counters) -> Framework {
    let (transfer_status, transfer_detail) =
        threshold(c.dlp_total as u64, 0, 5, "potential data-transfer incidents");
    let (ai_status, ai_detail) =
        threshold(c.shadow_ai_alerts, 0, 25, "transfers to unsanctioned AI processors");
    let checks = vec![
        ComplianceCheck {
            id: "gdpr-art44",
            name: "Cross-border transfer control",
            status: transfer_status,
            detail: transfer_detail,
        },
        ComplianceCheck {
            id: "gdpr-art28",
            name: "Processor authorization",
            status: ai_status,
            detail: ai_detail,
        },
        ComplianceCheck {
            id: "gdpr-art32",
            name: "Security of processing",
            status: if c.enabled_block_rules > 0 {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            detail: format!("{} enabled block rules", c.enabled_block_rules),
        },
    ];
    Framework {
        name: "GDPR",
        score: score(&checks),
        checks,
    }
}

fn hipaa(c: &Counters) -> Framework {
    let (phi_status, phi_detail) =
        threshold(c.pii_incidents as u64, 0, 2, "possible PII/PHI disclosures");
    let (audit_status, audit_detail) = threshold(c.high_alerts, 10, 40, "high-severity alerts");
    let checks = vec![
        ComplianceCheck {
            id: "hipaa-164.312a",
            name: "PHI disclosure prevention",
            status: phi_status,
            detail: phi_detail,
        },
        ComplianceCheck {
            id: "hipaa-164.312b",
            name: "Audit controls",
            status: audit_status,
            detail: audit_detail,
        },
    ];
    Framework {
        name: "HIPAA",
        score: score(&checks),
        checks,
    }
}
