//! Behavioral session tracker.
//!
//! Keeps a rolling per-source state of outbound volume, target fan-out,
//! and recent alert heat. Volume and heat decay exponentially with a
//! configurable half-life; idle sessions are evicted.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use chrono::{DateTime, Utc};

use shadow_core::{FlowEvent, Severity};

struct SessionState {
    bytes_out: f64,
    targets: HashSet<String>,
    alert_heat: f64,
    last_activity: DateTime<Utc>,
    last_decay: DateTime<Utc>,
}

pub struct SessionTracker {
    sessions: HashMap<IpAddr, SessionState>,
    half_life_secs: f64,
    ttl_secs: i64,
}

impl SessionTracker {
    pub fn new(half_life_secs: u64, ttl_secs: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            half_life_secs: half_life_secs as f64,
            ttl_secs: ttl_secs as i64,
        }
    }

    fn decay(&mut self, ip: IpAddr, now: DateTime<Utc>) {
        let half_life = self.half_life_secs;
        if let Some(s) = self.sessions.get_mut(&ip) {
            let elapsed = (now - s.last_decay).num_milliseconds() as f64 / 1_000.0;
            if elapsed > 0.0 {
                let f = 0.5f64.powf(elapsed / half_life);
                s.bytes_out *= f;
                s.alert_heat *= f;
                s.last_decay = now;
            }
        }
    }

    /// Fold one observed flow into the source's session.
    pub fn observe(&mut self, event: &FlowEvent, now: DateTime<Utc>) {
        self.evict_idle(now);
        self.decay(event.source_ip, now);
        let state = self
            .sessions
            .entry(event.source_ip)
            .or_insert_with(|| SessionState {
                bytes_out: 0.0,
                targets: HashSet::new(),
                alert_heat: 0.0,
                last_activity: now,
                last_decay: now,
            });
        state.bytes_out += event.bytes_sent as f64;
        state.targets.insert(event.destination_label());
        state.last_activity = now;
    }

    /// Fold an emitted alert into the session heat.
    pub fn record_alert(&mut self, source: IpAddr, severity: Severity, now: DateTime<Utc>) {
        self.decay(source, now);
        if let Some(state) = self.sessions.get_mut(&source) {
            state.alert_heat += match severity {
                Severity::High => 3.0,
                Severity::Medium => 1.5,
                Severity::Low => 0.5,
            };
            state.last_activity = now;
        }
    }

    /// Session score in [0, 1]: weighted mix of decayed outbound volume,
    /// target fan-out, and decayed alert heat.
    pub fn score(&mut self, source: IpAddr, now: DateTime<Utc>) -> f64 {
        self.decay(source, now);
        let Some(state) = self.sessions.get(&source) else {
            return 0.0;
        };
        let volume = (state.bytes_out.ln_1p() / (50_000_000f64).ln_1p()).min(1.0);
        let fanout = (state.targets.len() as f64 / 20.0).min(1.0);
        let heat = (state.alert_heat / 10.0).min(1.0);
        (0.4 * volume + 0.3 * fanout + 0.3 * heat).clamp(0.0, 1.0)
    }

    fn evict_idle(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl_secs;
        self.sessions
            .retain(|_, s| (now - s.last_activity).num_seconds() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
