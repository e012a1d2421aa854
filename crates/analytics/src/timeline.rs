//! Per-minute alert timeline for the last hour.

use std::collections::HashSet;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

use shadow_core::{Alert, Severity};

const WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct TimelineBucket {
    pub time: DateTime<Utc>,
    #[serde(rename = "HIGH")]
    pub high: u64,
    #[serde(rename = "MEDIUM")]
    pub medium: u64,
    #[serde(rename = "LOW")]
    pub low: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineFilters {
    pub protocols: Vec<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub buckets: Vec<TimelineBucket>,
    pub filters: TimelineFilters,
}

/// Sixty one-minute buckets ending at `now`, oldest first, with the
/// distinct protocols and sources seen inside the window.
pub fn timeline(alerts: &[Alert], now: DateTime<Utc>) -> Timeline {
    let end = now
        .duration_round(Duration::minutes(1))
        .unwrap_or(now);
    let start = end - Duration::minutes(WINDOW_MINUTES);

    let mut buckets: Vec<TimelineBucket> = (0..WINDOW_MINUTES)
        .map(|i| TimelineBucket {
            time: start + Duration::minutes(i),
            high: 0,
            medium: 0,
            low: 0,
            total: 0,
        })
        .collect();

    let mut protocols: HashSet<String> = HashSet::new();
    let mut sources: HashSet<String> = HashSet::new();

    for alert in alerts {
        if alert.timestamp < start || alert.timestamp >= end {
            continue;
        }
        let idx = ((alert.timestamp - start).num_minutes()).clamp(0, WINDOW_MINUTES - 1) as usize;
        let bucket = &mut buckets[idx];
        match alert.severity {
            Severity::High => bucket.high += 1,
            Severity::Medium => bucket.medium += 1,
            Severity::Low => bucket.low += 1,
        }
        bucket.total += 1;
        protocols.insert(alert.protocol.to_string());
        sources.insert(alert.source.clone());
    }

    let mut protocols: Vec<String> = protocols.into_iter().collect();
    protocols.sort();
    let mut sources: Vec<String> = sources.into_iter().collect();
    sources.sort();

    Timeline {
        buckets,
        filters: TimelineFilters { protocols, sources },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn buckets_count_by_minute_and_severity() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        let mut recent = crate::risk::tests::alert("10.0.0.5", Severity::High);
        recent.timestamp = now - Duration::minutes(1);
        let mut older = crate::risk::tests::alert("10.0.0.6", Severity::Low);
        older.timestamp = now - Duration::minutes(30);
        let mut ancient = crate::risk::tests::alert("10.0.0.7", Severity::Low);
        ancient.timestamp = now - Duration::minutes(90);

        let t = timeline(&[recent, older, ancient], now);
        assert_eq!(t.buckets.len(), 60);
        assert_eq!(t.buckets[59].high, 1);
        assert_eq!(t.buckets[30].low, 1);
        let total: u64 = t.buckets.iter().map(|b| b.total).sum();
        assert_eq!(total, 2);

        assert_eq!(t.filters.sources.len(), 2);
        assert_eq!(t.filters.protocols, vec!["HTTPS".to_string()]);
    }
}
