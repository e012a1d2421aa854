//! Built-in deterministic detectors, in evaluation order.

use shadow_core::net;
use shadow_core::{FlowEvent, PolicyAction, Protocol, Severity};

use crate::{DetectionContext, Detector, RuleHit};

/// Outbound ports considered unremarkable for internal → external flows.
const EXPECTED_OUTBOUND_PORTS: &[u16] = &[53, 80, 443, 8080, 22];

/// DNS flows above this many total bytes look like tunneling.
const DNS_TUNNEL_BYTES: u64 = 500;

/// Browser family markers in a User-Agent header.
const BROWSER_MARKERS: &[&str] = &["mozilla/", "chrome/", "safari/", "firefox/", "edg/"];

// ── AI domain match ─────────────────────────────────────────────────

pub struct AiDomainDetector;

impl Detector for AiDomainDetector {
    fn name(&self) -> &'static str {
        "ai_domain"
    }

    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        let candidate = event.host().or_else(|| event.sni());
        let Some(host) = candidate else {
            return Vec::new();
        };
        let Some((base, category)) = ctx.knowledge.ai_domain_match(host) else {
            return Vec::new();
        };
        vec![RuleHit::new(
            Severity::High,
            category,
            format!("ai_domain:{base}"),
            format!("Shadow AI service access: {host} ({category})"),
        )]
    }
}

// ── Threat-intel CIDR match ─────────────────────────────────────────

pub struct MaliciousCidrDetector;

impl Detector for MaliciousCidrDetector {
    fn name(&self) -> &'static str {
        "malicious_cidr"
    }

    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        let Some(threat) = ctx.knowledge.cidr_match(event.destination_ip) else {
            return Vec::new();
        };
        vec![RuleHit::new(
            threat.severity,
            "threat_intel",
            format!("malicious_cidr:{}", threat.net),
            format!(
                "Destination {} inside known-bad range {} ({})",
                event.destination_ip, threat.net, threat.label
            ),
        )]
    }
}

// ── JA3 fingerprint match / identity spoofing ───────────────────────

pub struct Ja3Detector;

impl Detector for Ja3Detector {
    fn name(&self) -> &'static str {
        "ja3"
    }

    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        let Some(hash) = event.ja3_hash.as_deref() else {
            return Vec::new();
        };
        let Some(entry) = ctx.knowledge.ja3_lookup(hash) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        if entry.malicious {
            hits.push(RuleHit::new(
                Severity::High,
                "malware_tooling",
                format!("ja3:{}", entry.label),
                format!("TLS fingerprint matches known tooling: {}", entry.label),
            ));
        }

        if entry.scripting_client {
            let claims_browser = event
                .user_agent()
                .map(|ua| {
                    let ua = ua.to_ascii_lowercase();
                    BROWSER_MARKERS.iter().any(|m| ua.contains(m))
                })
                .unwrap_or(false);
            if claims_browser {
                hits.push(RuleHit::new(
                    Severity::High,
                    "identity_spoofing",
                    "identity_spoofing",
                    format!(
                        "User-Agent claims a browser but TLS fingerprint matches {}",
                        entry.label
                    ),
                ));
            }
        }
        hits
    }
}

// ── Abnormal outbound port ──────────────────────────────────────────

pub struct AbnormalPortDetector;

impl Detector for AbnormalPortDetector {
    fn name(&self) -> &'static str {
        "abnormal_outbound_port"
    }

    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        if !matches!(event.protocol, Protocol::Tcp | Protocol::Udp) {
            return Vec::new();
        }
        let src_internal = net::is_internal(event.source_ip, &ctx.local_nets);
        let dst_internal = net::is_internal(event.destination_ip, &ctx.local_nets);
        if !src_internal || dst_internal {
            return Vec::new();
        }
        if EXPECTED_OUTBOUND_PORTS.contains(&event.destination_port) {
            return Vec::new();
        }
        vec![RuleHit::new(
            Severity::Medium,
            "anomalous_port",
            "abnormal_outbound_port",
            format!(
                "Outbound {} connection to unusual port {}",
                event.protocol, event.destination_port
            ),
        )]
    }
}

// ── DNS tunneling ───────────────────────────────────────────────────

pub struct DnsTunnelingDetector;

impl Detector for DnsTunnelingDetector {
    fn name(&self) -> &'static str {
        "dns_tunneling"
    }

    fn detect(&self, event: &FlowEvent, _ctx: &DetectionContext) -> Vec<RuleHit> {
        if event.protocol != Protocol::Dns {
            return Vec::new();
        }
        if event.total_bytes() <= DNS_TUNNEL_BYTES {
            return Vec::new();
        }
        vec![RuleHit::new(
            Severity::Medium,
            "dns_tunneling",
            "dns_tunneling",
            format!(
                "Oversized DNS exchange ({} bytes) suggests tunneling",
                event.total_bytes()
            ),
        )]
    }
}

// ── Runtime policy rules ────────────────────────────────────────────

pub struct PolicyRuleDetector;

impl Detector for PolicyRuleDetector {
    fn name(&self) -> &'static str {
        "policy_rule"
    }

    fn detect(&self, event: &FlowEvent, ctx: &DetectionContext) -> Vec<RuleHit> {
        let haystack = format!(
            "{}|{}|{}",
            ctx.destination_label,
            event.host().unwrap_or(""),
            event.sni().unwrap_or("")
        )
        .to_ascii_lowercase();

        let mut hits = Vec::new();
        for rule in ctx.policies.iter() {
            if !rule.enabled || rule.action == PolicyAction::Allow {
                continue;
            }
            // An empty service never matches.
            if rule.service.is_empty() {
                continue;
            }
            if !haystack.contains(&rule.service.to_ascii_lowercase()) {
                continue;
            }
            let dept_ok = rule.department.eq_ignore_ascii_case("all")
                || ctx
                    .source_department
                    .as_deref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(&rule.department));
            if !dept_ok {
                continue;
            }

            let mut hit = RuleHit::new(
                rule.severity,
                "policy",
                rule.id.clone(),
                format!("Policy rule matched: {} ({})", rule.name, rule.service),
            );
            hit.block_requested = rule.action == PolicyAction::Block;
            hits.push(hit);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{ctx, event};
    use shadow_core::{PolicyRule, Protocol};
    use std::sync::Arc;

    #[test]
    fn ai_domain_match_is_high_with_category() {
        let mut e = event("10.0.0.5", "104.18.32.7", 443, Protocol::Https);
        e.bytes_sent = 2048;
        e.metadata
            .insert("sni".to_string(), "api.openai.com".to_string());

        let hits = AiDomainDetector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].category, "LLM");
        assert_eq!(hits[0].matched_rule, "ai_domain:openai.com");
    }

    #[test]
    fn abnormal_outbound_port_is_medium() {
        let e = event("192.168.1.20", "203.0.113.5", 6667, Protocol::Tcp);
        let hits = AbnormalPortDetector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::Medium);
        assert_eq!(hits[0].matched_rule, "abnormal_outbound_port");

        // Expected ports stay quiet.
        let e = event("192.168.1.20", "203.0.113.5", 443, Protocol::Tcp);
        assert!(AbnormalPortDetector.detect(&e, &ctx()).is_empty());
    }

    #[test]
    fn dns_tunneling_boundary_500_vs_501() {
        let mut e = event("10.0.0.5", "203.0.113.53", 53, Protocol::Dns);
        e.bytes_sent = 250;
        e.bytes_received = 250;
        assert!(DnsTunnelingDetector.detect(&e, &ctx()).is_empty());

        e.bytes_received = 251;
        let hits = DnsTunnelingDetector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_rule, "dns_tunneling");
        assert_eq!(hits[0].severity, Severity::Medium);
    }

    #[test]
    fn browser_ua_with_scripting_ja3_is_spoofing() {
        let mut e = event("10.0.0.5", "203.0.113.5", 443, Protocol::Https);
        e.ja3_hash = Some("8d9f7747675e24454cd9b7ed35c58707".to_string());
        e.metadata.insert(
            "user_agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0".to_string(),
        );

        let hits = Ja3Detector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_rule, "identity_spoofing");
        assert_eq!(hits[0].severity, Severity::High);
    }

    #[test]
    fn malicious_ja3_hits_without_user_agent() {
        let mut e = event("10.0.0.5", "203.0.113.5", 443, Protocol::Https);
        e.ja3_hash = Some("3b5074b1b5d032e5620f69f9f700ff0e".to_string());
        let hits = Ja3Detector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "malware_tooling");
    }

    #[test]
    fn cidr_match_uses_table_severity() {
        let e = event("10.0.0.5", "198.51.100.9", 443, Protocol::Https);
        let hits = MaliciousCidrDetector.detect(&e, &ctx());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::High);
        assert!(hits[0].matched_rule.starts_with("malicious_cidr:"));
    }

    fn policy(service: &str, department: &str, action: PolicyAction) -> PolicyRule {
        PolicyRule {
            id: "rule-1".to_string(),
            name: "Block ChatGPT".to_string(),
            action,
            service: service.to_string(),
            department: department.to_string(),
            severity: Severity::High,
            enabled: true,
            description: String::new(),
        }
    }

    #[test]
    fn policy_rule_matches_substring_and_department() {
        let mut c = ctx();
        c.policies = Arc::new(vec![policy("openai", "Engineering", PolicyAction::Block)]);
        c.destination_label = "api.openai.com".to_string();
        c.source_department = Some("Engineering".to_string());

        let e = event("10.0.0.5", "104.18.32.7", 443, Protocol::Https);
        let hits = PolicyRuleDetector.detect(&e, &c);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].block_requested);
        assert_eq!(hits[0].matched_rule, "rule-1");

        // Wrong department: no match.
        c.source_department = Some("Design".to_string());
        assert!(PolicyRuleDetector.detect(&e, &c).is_empty());
    }

    #[test]
    fn empty_service_matches_nothing() {
        let mut c = ctx();
        c.policies = Arc::new(vec![policy("", "All", PolicyAction::Monitor)]);
        c.destination_label = "api.openai.com".to_string();
        let e = event("10.0.0.5", "104.18.32.7", 443, Protocol::Https);
        assert!(PolicyRuleDetector.detect(&e, &c).is_empty());
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut rule = policy("openai", "All", PolicyAction::Block);
        rule.enabled = false;
        let mut c = ctx();
        c.policies = Arc::new(vec![rule]);
        c.destination_label = "api.openai.com".to_string();
        let e = event("10.0.0.5", "104.18.32.7", 443, Protocol::Https);
        assert!(PolicyRuleDetector.detect(&e, &c).is_empty());
    }
}
