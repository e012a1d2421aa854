//! Curated knowledge bases: AI service domains, threat-intel CIDRs, and
//! JA3 client fingerprints.
//!
//! The tables ship as built-in constants and are loaded once into a
//! [`KnowledgeBase`] held read-only by the engine context.

use std::collections::HashMap;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::alert::Severity;

/// One threat-intel network range.
#[derive(Debug, Clone)]
pub struct ThreatNet {
    pub net: IpNet,
    pub severity: Severity,
    pub label: &'static str,
}

/// A known JA3 client fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct Ja3Entry {
    pub label: &'static str,
    /// True for non-browser scripting clients (used for spoof detection).
    pub scripting_client: bool,
    /// True for known malware/offensive tooling.
    pub malicious: bool,
}

/// Base domain → AI service category.
const AI_DOMAINS: &[(&str, &str)] = &[
    ("openai.com", "LLM"),
    ("chatgpt.com", "LLM"),
    ("anthropic.com", "LLM"),
    ("claude.ai", "LLM"),
    ("gemini.google.com", "LLM"),
    ("cohere.ai", "LLM"),
    ("cohere.com", "LLM"),
    ("mistral.ai", "LLM"),
    ("deepseek.com", "LLM"),
    ("groq.com", "LLM"),
    ("together.ai", "LLM"),
    ("perplexity.ai", "Search"),
    ("you.com", "Search"),
    ("huggingface.co", "ModelHub"),
    ("replicate.com", "ModelHub"),
    ("openrouter.ai", "ModelHub"),
    ("midjourney.com", "Image"),
    ("stability.ai", "Image"),
    ("leonardo.ai", "Image"),
    ("elevenlabs.io", "Audio"),
    ("assemblyai.com", "Audio"),
    ("character.ai", "Chat"),
    ("poe.com", "Chat"),
    ("codeium.com", "CodeAssist"),
    ("cursor.sh", "CodeAssist"),
];

/// Known-bad ranges. Documentation/TEST-NET ranges stand in for live feeds.
const MALICIOUS_CIDRS: &[(&str, Severity, &str)] = &[
    ("198.51.100.0/24", Severity::High, "C2 infrastructure"),
    ("203.0.113.128/25", Severity::Medium, "bulletproof hosting"),
    ("192.0.2.0/24", Severity::Medium, "scanner network"),
    ("100.64.77.0/24", Severity::Low, "anonymizing relay"),
];

/// JA3 fingerprint table. Hashes are the widely published fingerprints for
/// the named client stacks.
const JA3_FINGERPRINTS: &[(&str, Ja3Entry)] = &[
    (
        "8d9f7747675e24454cd9b7ed35c58707",
        Ja3Entry { label: "python-requests", scripting_client: true, malicious: false },
    ),
    (
        "b32309a26951912be7dba376398abc3b",
        Ja3Entry { label: "python-urllib3", scripting_client: true, malicious: false },
    ),
    (
        "456523fc94726331a4d5a2e1d40b2cd7",
        Ja3Entry { label: "curl", scripting_client: true, malicious: false },
    ),
    (
        "3b5074b1b5d032e5620f69f9f700ff0e",
        Ja3Entry { label: "sqlmap", scripting_client: true, malicious: true },
    ),
    (
        "e7d705a3286e19ea42f587b344ee6865",
        Ja3Entry { label: "metasploit", scripting_client: true, malicious: true },
    ),
    (
        "6734f37431670b3ab4292b8f60f29984",
        Ja3Entry { label: "cobalt-strike", scripting_client: true, malicious: true },
    ),
];

/// Loaded lookup tables shared read-only across the pipeline.
pub struct KnowledgeBase {
    ai_domains: Vec<(String, &'static str)>,
    threat_nets: Vec<ThreatNet>,
    ja3: HashMap<String, Ja3Entry>,
}

impl KnowledgeBase {
    /// Build from the built-in curated tables.
    pub fn builtin() -> Self {
        let threat_nets = MALICIOUS_CIDRS
            .iter()
            .filter_map(|(cidr, severity, label)| {
                cidr.parse::<IpNet>().ok().map(|net| ThreatNet {
                    net,
                    severity: *severity,
                    label,
                })
            })
            .collect();

        Self {
            ai_domains: AI_DOMAINS
                .iter()
                .map(|(d, c)| (d.to_ascii_lowercase(), *c))
                .collect(),
            threat_nets,
            ja3: JA3_FINGERPRINTS
                .iter()
                .map(|(h, e)| (h.to_string(), *e))
                .collect(),
        }
    }

    /// Suffix-match a hostname against the AI domain table.
    ///
    /// Case-insensitive; requires full equality or a match at a dot
    /// boundary ("api.openai.com" matches "openai.com", "notopenai.com"
    /// does not). Returns `(base_domain, category)`.
    pub fn ai_domain_match(&self, host: &str) -> Option<(&str, &str)> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        for (base, category) in &self.ai_domains {
            if host == *base {
                return Some((base.as_str(), category));
            }
            if host.len() > base.len()
                && host.ends_with(base.as_str())
                && host.as_bytes()[host.len() - base.len() - 1] == b'.'
            {
                return Some((base.as_str(), category));
            }
        }
        None
    }

    /// True when either the host/sni label is a known AI service.
    pub fn is_ai_destination(&self, host: Option<&str>, sni: Option<&str>) -> bool {
        host.is_some_and(|h| self.ai_domain_match(h).is_some())
            || sni.is_some_and(|s| self.ai_domain_match(s).is_some())
    }

    /// First threat-intel range containing `ip`.
    pub fn cidr_match(&self, ip: IpAddr) -> Option<&ThreatNet> {
        self.threat_nets.iter().find(|t| t.net.contains(&ip))
    }

    pub fn ja3_lookup(&self, hash: &str) -> Option<&Ja3Entry> {
        self.ja3.get(&hash.to_ascii_lowercase())
    }

    pub fn ai_domain_count(&self) -> usize {
        self.ai_domains.len()
    }
}
