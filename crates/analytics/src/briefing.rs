//! Executive briefing: deterministic narrative filled from the derived
//! statistics.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use shadow_core::{Alert, PolicyRule, Severity};

use crate::{compliance, dlp, killchain, profiles, sessions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Elevated,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct BriefingParagraph {
    pub section: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Briefing {
    pub generated_at: DateTime<Utc>,
    pub threat_level: ThreatLevel,
    pub shadow_ai_alerts: u64,
    pub chain_completion: u64,
    pub paragraphs: Vec<BriefingParagraph>,
}

fn threat_level(chain_completion: u64, shadow_ai_alerts: u64) -> ThreatLevel {
    if chain_completion >= 80 || shadow_ai_alerts > 50 {
        ThreatLevel::Critical
    } else if chain_completion >= 60 || shadow_ai_alerts > 20 {
        ThreatLevel::High
    } else if chain_completion >= 40 || shadow_ai_alerts > 5 {
        ThreatLevel::Elevated
    } else {
        ThreatLevel::Low
    }
}

pub fn briefing(
    alerts: &[Alert],
    rules: &[PolicyRule],
    now: DateTime<Utc>,
    local_offset: FixedOffset,
) -> Briefing {
    let chain = killchain::killchain(alerts);
    let dlp = dlp::dlp_report(alerts);
    let compliance = compliance::compliance(alerts, rules);
    let profiles = profiles::user_profiles(alerts, local_offset);
    let sessions = sessions::sessions(alerts);

    let shadow_ai_alerts = alerts
        .iter()
        .filter(|a| a.matched_rule.as_deref().is_some_and(|r| r.starts_with("ai_domain:")))
        .count() as u64;
    let high = alerts.iter().filter(|a| a.severity == Severity::High).count();
    let level = threat_level(chain.chain_completion, shadow_ai_alerts);

    let overview = format!(
        "Monitoring evaluated {} alerts across {} distinct internal sources; \
         {} are high severity. Kill-chain completion stands at {}%.",
        alerts.len(),
        profiles.len(),
        high,
        chain.chain_completion
    );

    let shadow_ai = if shadow_ai_alerts == 0 {
        "No confirmed Shadow AI usage was observed in the current window.".to_string()
    } else {
        format!(
            "{} flows reached unsanctioned AI services. {} potential data-loss \
             incidents were associated with this activity.",
            shadow_ai_alerts, dlp.summary.total
        )
    };

    let actor = match profiles.first() {
        Some(top) => format!(
            "Most active source is {} with {} alerts ({} sessions reconstructed \
             across all sources). Behavioral flags: {}.",
            top.source,
            top.alert_count,
            sessions.len(),
            if top.anomalies.is_empty() {
                "none".to_string()
            } else {
                top.anomalies.join(", ")
            }
        ),
        None => "No alerting sources in the current window.".to_string(),
    };

    let recommendations = match level {
        ThreatLevel::Critical => {
            "Immediate action: quarantine the most active sources, enable block \
             rules for all confirmed AI services, and open an incident."
        }
        ThreatLevel::High => {
            "Enable block rules for the confirmed AI services and review the top \
             sources' sessions with their managers."
        }
        ThreatLevel::Elevated => {
            "Review policy coverage for the AI services observed and confirm the \
             flagged endpoints are sanctioned."
        }
        ThreatLevel::Low => "Continue monitoring; no intervention required.",
    }
    .to_string();

    let status = format!(
        "Overall compliance score {:.0}% across {} checks; {} violations open.",
        compliance.overall_score,
        compliance.total_checks,
        compliance.violations.len()
    );

    Briefing {
        generated_at: now,
        threat_level: level,
        shadow_ai_alerts,
        chain_completion: chain.chain_completion,
        paragraphs: vec![
            BriefingParagraph { section: "overview", text: overview },
            BriefingParagraph { section: "shadow_ai", text: shadow_ai },
            BriefingParagraph { section: "actor", text: actor },
            BriefingParagraph { section: "recommendations", text: recommendations },
            BriefingParagraph { section: "status", text: status },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_thresholds() {
        assert_eq!(threat_level(0, 0), ThreatLevel::Low);
        assert_eq!(threat_level(40, 0), ThreatLevel::Elevated);
        assert_eq!(threat_level(0, 6), ThreatLevel::Elevated);
        assert_eq!(threat_level(60, 0), ThreatLevel::High);
        assert_eq!(threat_level(0, 21), ThreatLevel::High);
        assert_eq!(threat_level(80, 0), ThreatLevel::Critical);
        assert_eq!(threat_level(0, 51), ThreatLevel::Critical);
    }

    #[test]
    fn paragraphs_are_ordered_and_complete() {
        let b = briefing(&[], &[], Utc::now(), FixedOffset::east_opt(0).unwrap());
        let sections: Vec<_> = b.paragraphs.iter().map(|p| p.section).collect();
        assert_eq!(
            sections,
            vec!["overview", "shadow_ai", "actor", "recommendations", "status"]
        );
        assert_eq!(b.threat_level, ThreatLevel::Low);
    }
}
