//! Session reconstruction from the alert history.
//!
//! A session is a maximal run of alerts from one source with consecutive
//! alerts at most five minutes apart. Single-alert runs are noise and
//! are excluded from the output.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use shadow_core::Alert;

use crate::SeverityBreakdown;

const SESSION_GAP_SECS: i64 = 300;
const MIN_SESSION_ALERTS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
    pub destinations: Vec<String>,
    pub alert_count: usize,
    pub breakdown: SeverityBreakdown,
    pub risk_score: f64,
    /// Chronological alerts in this session.
    pub timeline: Vec<Alert>,
}

pub fn sessions(alerts: &[Alert]) -> Vec<Session> {
    let mut by_source: HashMap<&str, Vec<&Alert>> = HashMap::new();
    for alert in alerts {
        by_source.entry(&alert.source).or_default().push(alert);
    }

    let mut out = Vec::new();
    for (source, mut source_alerts) in by_source {
        source_alerts.sort_by_key(|a| a.timestamp);

        let mut run: Vec<&Alert> = Vec::new();
        for alert in source_alerts {
            let gap_ok = run
                .last()
                .map(|prev| (alert.timestamp - prev.timestamp).num_seconds() <= SESSION_GAP_SECS)
                .unwrap_or(true);
            if gap_ok {
                run.push(alert);
            } else {
                flush_run(source, &mut run, &mut out);
                run.push(alert);
            }
        }
        flush_run(source, &mut run, &mut out);
    }

    out.sort_by(|a, b| a.start.cmp(&b.start).then(a.source.cmp(&b.source)));
    out
}

fn flush_run(source: &str, run: &mut Vec<&Alert>, out: &mut Vec<Session>) {
    if run.len() < MIN_SESSION_ALERTS {
        run.clear();
        return;
    }

    let start = run[0].timestamp;
    let end = run[run.len() - 1].timestamp;
    let mut breakdown = SeverityBreakdown::default();
    let mut destinations: Vec<String> = Vec::new();
    for alert in run.iter() {
        breakdown.add(alert.severity);
        if !destinations.contains(&alert.target) {
            destinations.push(alert.target.clone());
        }
    }

    let risk = (20.0 * breakdown.high as f64
        + 8.0 * breakdown.medium as f64
        + 3.0 * breakdown.low as f64)
        .min(100.0);

    out.push(Session {
        id: format!("{}:{}", source, start.timestamp()),
        source: source.to_string(),
        start,
        end,
        duration_seconds: (end - start).num_seconds(),
        destinations,
        alert_count: run.len(),
        breakdown,
        risk_score: risk,
        timeline: run.iter().map(|a| (*a).clone()).collect(),
    });
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shadow_core::Severity;

    fn alert_at(offset_secs: i64) -> Alert {
        let mut a = crate::risk::tests::alert("10.0.0.5", Severity::Medium);
        a.timestamp = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
            + Duration::seconds(offset_secs);
        a
    }

    // t, t+30s, t+60s | t+7m, t+7m30s | t+20m (excluded).
    #[test]
    fn splits_on_five_minute_gap_and_drops_singletons() {
        let alerts = vec![
            alert_at(0),
            alert_at(30),
            alert_at(60),
            alert_at(7 * 60),
            alert_at(7 * 60 + 30),
            alert_at(20 * 60),
        ];
        let sessions = sessions(&alerts);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].alert_count, 3);
        assert_eq!(sessions[0].duration_seconds, 60);
        assert_eq!(sessions[1].alert_count, 2);
        assert_eq!(sessions[1].duration_seconds, 30);
    }

    #[test]
    fn gap_of_exactly_five_minutes_continues_session() {
        let alerts = vec![alert_at(0), alert_at(300)];
        let result = sessions(&alerts);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].alert_count, 2);
    }

    #[test]
    fn timeline_is_chronological_and_destinations_deduped() {
        let alerts = vec![alert_at(60), alert_at(0), alert_at(30)];
        let result = sessions(&alerts);
        assert_eq!(result.len(), 1);
        let times: Vec<_> = result[0].timeline.iter().map(|a| a.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(result[0].destinations.len(), 1);
    }
}
