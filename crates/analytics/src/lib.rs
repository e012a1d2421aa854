//! Derived analytics: pure functions over snapshots of the graph, the
//! alert history, and the policy rules. Nothing here mutates state; the
//! API layer calls these on demand.

pub mod briefing;
pub mod compliance;
pub mod dlp;
pub mod killchain;
pub mod profiles;
pub mod report;
pub mod risk;
pub mod sessions;
pub mod timeline;
pub mod traffic;

use serde::Serialize;

use shadow_core::Severity;

/// Alert counts split by severity, reused across several views.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SeverityBreakdown {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityBreakdown {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}
