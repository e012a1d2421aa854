//! Endpoint state machine.
//!
//! `NEW → OBSERVED → FLAGGED → QUARANTINED`, driven by flows, alerts,
//! and response-manager feedback events. FLAGGED decays back to OBSERVED
//! after a quiet interval; QUARANTINED clears when the block expires.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Seconds without a new alert before FLAGGED decays to OBSERVED.
const FLAG_DECAY_SECS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Observed,
    Flagged,
    Quarantined,
}

struct Entry {
    state: EndpointState,
    last_alert: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct EndpointStates {
    entries: Mutex<HashMap<String, Entry>>,
}

impl EndpointStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// First flow observation moves NEW → OBSERVED.
    pub fn observe(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(id.to_string()).or_insert(Entry {
            state: EndpointState::Observed,
            last_alert: None,
        });
    }

    /// Any rule/ML alert moves the endpoint to FLAGGED (quarantine is
    /// stickier and survives further alerts).
    pub fn flag(&self, id: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(id.to_string()).or_insert(Entry {
            state: EndpointState::Observed,
            last_alert: None,
        });
        entry.last_alert = Some(now);
        if entry.state != EndpointState::Quarantined {
            entry.state = EndpointState::Flagged;
        }
    }

    /// Response manager installed a block for this endpoint.
    pub fn quarantine(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(id.to_string()).or_insert(Entry {
            state: EndpointState::Observed,
            last_alert: None,
        });
        entry.state = EndpointState::Quarantined;
    }

    /// Block expired or was lifted: back to FLAGGED (the alert history
    /// still stands) and from there the normal decay applies.
    pub fn release(&self, id: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            if entry.state == EndpointState::Quarantined {
                entry.state = EndpointState::Flagged;
                entry.last_alert = Some(now);
            }
        }
    }

    /// Current state, applying FLAGGED decay lazily.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Option<EndpointState> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(id)?;
        if entry.state == EndpointState::Flagged {
            let quiet = entry
                .last_alert
                .map(|t| now - t > Duration::seconds(FLAG_DECAY_SECS))
                .unwrap_or(true);
            if quiet {
                entry.state = EndpointState::Observed;
            }
        }
        Some(entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_flag_quarantine_release() {
        let states = EndpointStates::new();
        let now = Utc::now();

        states.observe("10.0.0.5");
        assert_eq!(states.get("10.0.0.5", now), Some(EndpointState::Observed));

        states.flag("10.0.0.5", now);
        assert_eq!(states.get("10.0.0.5", now), Some(EndpointState::Flagged));

        states.quarantine("10.0.0.5");
        // Further alerts do not demote quarantine.
        states.flag("10.0.0.5", now);
        assert_eq!(states.get("10.0.0.5", now), Some(EndpointState::Quarantined));

        states.release("10.0.0.5", now);
        assert_eq!(states.get("10.0.0.5", now), Some(EndpointState::Flagged));
    }

    #[test]
    fn flagged_decays_after_quiet_interval() {
        let states = EndpointStates::new();
        let now = Utc::now();
        states.flag("10.0.0.5", now);

        let later = now + Duration::seconds(FLAG_DECAY_SECS + 1);
        assert_eq!(states.get("10.0.0.5", later), Some(EndpointState::Observed));
    }

    #[test]
    fn unknown_endpoint_is_none() {
        let states = EndpointStates::new();
        assert_eq!(states.get("10.9.9.9", Utc::now()), None);
    }
}
