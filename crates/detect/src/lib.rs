//! Rule-based detection.
//!
//! Detectors are pure: `detect(event, context)` returns zero or more
//! [`RuleHit`]s and never touches shared state. The registry evaluates
//! every detector in a fixed order (hits accumulate) behind a recovery
//! barrier, so one buggy detector cannot take the pipeline down.

pub mod policy;
pub mod rules;
pub mod whitelist;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ipnet::IpNet;
use tracing::error;

use shadow_core::{FlowEvent, KnowledgeBase, PolicyRule, Severity};

pub use policy::{PolicyError, PolicyStore};

/// One detector match.
#[derive(Debug, Clone)]
pub struct RuleHit {
    pub severity: Severity,
    pub category: String,
    pub matched_rule: String,
    pub description: String,
    /// Set by policy rules with `action == Block`; tells active defense
    /// to enqueue the endpoint.
    pub block_requested: bool,
}

impl RuleHit {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        matched_rule: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            matched_rule: matched_rule.into(),
            description: description.into(),
            block_requested: false,
        }
    }
}

/// Snapshot of everything a detector may consult for one event.
pub struct DetectionContext {
    pub knowledge: Arc<KnowledgeBase>,
    /// Enabled + disabled rules; detectors filter on `enabled`.
    pub policies: Arc<Vec<PolicyRule>>,
    /// Department of the source node, when known.
    pub source_department: Option<String>,
    /// Best display label of the destination.
    pub destination_label: String,
    /// Extra prefixes treated as internal space.
    pub local_nets: Arc<Vec<IpNet>>,
}

/// A single detection capability. Implementers are registered once and
/// called per event.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit>;
}

/// Ordered detector registry with a per-detector recovery barrier.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
    panics: AtomicU64,
}

impl DetectorRegistry {
    /// Registry with the built-in rule set in evaluation order.
    pub fn builtin() -> Self {
        Self {
            detectors: vec![
                Box::new(rules::AiDomainDetector),
                Box::new(rules::MaliciousCidrDetector),
                Box::new(rules::Ja3Detector),
                Box::new(rules::AbnormalPortDetector),
                Box::new(rules::DnsTunnelingDetector),
                Box::new(rules::PolicyRuleDetector),
            ],
            panics: AtomicU64::new(0),
        }
    }

    /// Custom registry (plugin seam).
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            detectors,
            panics: AtomicU64::new(0),
        }
    }

    /// Run every detector against `event`, accumulating hits.
    ///
    /// Whitelisted traffic short-circuits to an empty result. A detector
    /// that panics is skipped and counted; the others still run.
    pub fn run(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        if whitelist::is_whitelisted(event, &ctx.local_nets) {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for detector in &self.detectors {
            match catch_unwind(AssertUnwindSafe(|| detector.detect(event, ctx))) {
                Ok(mut detector_hits) => hits.append(&mut detector_hits),
                Err(_) => {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                    error!(detector = detector.name(), "detector panicked, skipped");
                }
            }
        }
        hits
    }

    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    pub(crate) fn event(
        src: &str,
        dst: &str,
        dport: u16,
        proto: shadow_core::Protocol,
    ) -> FlowEvent {
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: src.parse().unwrap(),
            destination_ip: dst.parse().unwrap(),
            source_port: 51000,
            destination_port: dport,
            protocol: proto,
            bytes_sent: 512,
            bytes_received: 1024,
            ja3_hash: None,
            metadata: HashMap::new(),
        }
    }

    pub(crate) fn ctx() -> DetectionContext {
        DetectionContext {
            knowledge: Arc::new(KnowledgeBase::builtin()),
            policies: Arc::new(Vec::new()),
            source_department: None,
            destination_label: String::new(),
            local_nets: Arc::new(Vec::new()),
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panics"
        }
        fn detect(&self, _: &FlowEvent, _: &DetectionContext) -> Vec<RuleHit> {
            panic!("boom");
        }
    }

    struct ConstantDetector;

    impl Detector for ConstantDetector {
        fn name(&self) -> &'static str {
            "constant"
        }
        fn detect(&self, _: &FlowEvent, _: &DetectionContext) -> Vec<RuleHit> {
            vec![RuleHit::new(Severity::Low, "test", "constant", "always hits")]
        }
    }

    #[test]
    fn panicking_detector_is_contained() {
        let registry = DetectorRegistry::new(vec![
            Box::new(PanickingDetector),
            Box::new(ConstantDetector),
        ]);
        let e = event("10.0.0.5", "203.0.113.5", 443, shadow_core::Protocol::Https);
        let hits = registry.run(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_rule, "constant");
        assert_eq!(registry.panic_count(), 1);
    }

    #[test]
    fn whitelist_short_circuits_all_detectors() {
        let registry = DetectorRegistry::new(vec![Box::new(ConstantDetector)]);
        let e = event(
            "10.0.0.5",
            "239.255.255.250",
            1900,
            shadow_core::Protocol::Udp,
        );
        assert!(registry.run(&e, &ctx()).is_empty());
    }
}
