//! Behavioral profiles per alerting source.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::Serialize;

use shadow_core::Alert;

use crate::SeverityBreakdown;

const WORK_START_HOUR: u32 = 8;
const WORK_END_HOUR: u32 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct TopDestination {
    pub target: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub source: String,
    pub alert_count: u64,
    pub breakdown: SeverityBreakdown,
    pub top_destinations: Vec<TopDestination>,
    /// Alert counts per hour of day in the configured local offset,
    /// 24 buckets.
    pub hourly_activity: Vec<u64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub anomalies: Vec<String>,
}

/// Group alerts by source and derive each source's behavioral profile.
///
/// Working hours (08:00–20:00) are evaluated against `local_offset`, the
/// organization's clock.
pub fn user_profiles(alerts: &[Alert], local_offset: FixedOffset) -> Vec<UserProfile> {
    let mut by_source: HashMap<&str, Vec<&Alert>> = HashMap::new();
    for alert in alerts {
        by_source.entry(&alert.source).or_default().push(alert);
    }

    let mut profiles: Vec<UserProfile> = by_source
        .into_iter()
        .map(|(source, alerts)| profile_for(source, &alerts, local_offset))
        .collect();
    profiles.sort_by(|a, b| b.alert_count.cmp(&a.alert_count).then(a.source.cmp(&b.source)));
    profiles
}

fn profile_for(source: &str, alerts: &[&Alert], local_offset: FixedOffset) -> UserProfile {
    let mut breakdown = SeverityBreakdown::default();
    let mut hourly = vec![0u64; 24];
    let mut destinations: HashMap<&str, u64> = HashMap::new();
    let mut first_seen = alerts[0].timestamp;
    let mut last_seen = alerts[0].timestamp;
    let mut off_hours = 0u64;

    for alert in alerts {
        breakdown.add(alert.severity);
        let hour = alert.timestamp.with_timezone(&local_offset).hour();
        hourly[hour as usize] += 1;
        if !(WORK_START_HOUR..WORK_END_HOUR).contains(&hour) {
            off_hours += 1;
        }
        *destinations.entry(&alert.target).or_default() += 1;
        first_seen = first_seen.min(alert.timestamp);
        last_seen = last_seen.max(alert.timestamp);
    }

    let total = alerts.len() as u64;
    let mut top: Vec<TopDestination> = destinations
        .into_iter()
        .map(|(target, count)| TopDestination {
            target: target.to_string(),
            count,
        })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then(a.target.cmp(&b.target)));
    top.truncate(5);

    let mut anomalies = Vec::new();
    if off_hours as f64 >= 0.3 * total as f64 {
        anomalies.push("unusual_hours".to_string());
    }
    if top
        .first()
        .is_some_and(|t| t.count as f64 >= 0.7 * total as f64)
    {
        anomalies.push("single_target_focus".to_string());
    }
    if breakdown.high as f64 >= 0.3 * total as f64 {
        anomalies.push("high_severity_ratio".to_string());
    }

    UserProfile {
        source: source.to_string(),
        alert_count: total,
        breakdown,
        top_destinations: top,
        hourly_activity: hourly,
        first_seen,
        last_seen,
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shadow_core::Severity;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn alert_at(source: &str, target: &str, severity: Severity, hour: u32) -> Alert {
        let mut a = crate::risk::tests::alert(source, severity);
        a.target = target.to_string();
        a.timestamp = Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap();
        a
    }

    #[test]
    fn groups_by_source_and_counts() {
        let alerts = vec![
            alert_at("10.0.0.5", "api.openai.com", Severity::High, 10),
            alert_at("10.0.0.5", "api.openai.com", Severity::Low, 11),
            alert_at("10.0.0.6", "claude.ai", Severity::Medium, 12),
        ];
        let profiles = user_profiles(&alerts, utc());
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].source, "10.0.0.5");
        assert_eq!(profiles[0].alert_count, 2);
        assert_eq!(profiles[0].hourly_activity[10], 1);
        assert_eq!(profiles[0].top_destinations[0].target, "api.openai.com");
    }

    #[test]
    fn unusual_hours_flag_at_30_percent() {
        // 3 of 10 alerts at 23:00 → flagged.
        let mut alerts: Vec<Alert> = (0..7)
            .map(|_| alert_at("10.0.0.5", "a", Severity::Low, 12))
            .collect();
        alerts.extend((0..3).map(|_| alert_at("10.0.0.5", "b", Severity::Low, 23)));
        let profiles = user_profiles(&alerts, utc());
        assert!(profiles[0].anomalies.contains(&"unusual_hours".to_string()));

        // 2 of 10 → not flagged.
        let mut alerts: Vec<Alert> = (0..8)
            .map(|_| alert_at("10.0.0.5", "a", Severity::Low, 12))
            .collect();
        alerts.extend((0..2).map(|_| alert_at("10.0.0.5", "b", Severity::Low, 23)));
        let profiles = user_profiles(&alerts, utc());
        assert!(!profiles[0].anomalies.contains(&"unusual_hours".to_string()));
    }

    #[test]
    fn unusual_hours_respects_local_offset() {
        // 23:00 UTC is 09:00 in UTC+10: inside working hours there.
        let alerts: Vec<Alert> = (0..4)
            .map(|_| alert_at("10.0.0.5", "a", Severity::Low, 23))
            .collect();

        let profiles = user_profiles(&alerts, utc());
        assert!(profiles[0].anomalies.contains(&"unusual_hours".to_string()));

        let plus_ten = FixedOffset::east_opt(10 * 3_600).unwrap();
        let profiles = user_profiles(&alerts, plus_ten);
        assert!(!profiles[0].anomalies.contains(&"unusual_hours".to_string()));
        assert_eq!(profiles[0].hourly_activity[9], 4);
    }

    #[test]
    fn single_target_and_high_severity_flags() {
        let mut alerts: Vec<Alert> = (0..7)
            .map(|_| alert_at("10.0.0.5", "api.openai.com", Severity::High, 12))
            .collect();
        alerts.extend((0..3).map(|_| alert_at("10.0.0.5", "other.example", Severity::Low, 12)));

        let profiles = user_profiles(&alerts, utc());
        let anomalies = &profiles[0].anomalies;
        assert!(anomalies.contains(&"single_target_focus".to_string()));
        assert!(anomalies.contains(&"high_severity_ratio".to_string()));
    }
}
