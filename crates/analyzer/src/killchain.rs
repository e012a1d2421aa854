//! Kill-chain stage assignment by description keyword.

use shadow_core::{KillchainStage, MlClass};

/// Ordered keyword map; the first matching group wins.
const STAGE_KEYWORDS: &[(KillchainStage, &[&str])] = &[
    (KillchainStage::Reconnaissance, &["scan", "probe", "recon", "sweep", "enumerat"]),
    (KillchainStage::Impact, &["blocked", "critical", "impact", "destru"]),
    (KillchainStage::Exfiltration, &["upload", "exfil", "tunnel", "transfer", "oversized"]),
    (KillchainStage::InitialAccess, &["spoof", "credential", "login", "fingerprint", "unusual port", "known-bad"]),
    (KillchainStage::Execution, &["shadow ai", "ai service", "llm", "generative", "policy"]),
];

/// Assign a stage from the alert description, falling back to the ML
/// classification when no keyword matches.
pub fn stage_for(description: &str, ml: Option<MlClass>) -> KillchainStage {
    let text = description.to_ascii_lowercase();
    for (stage, keywords) in STAGE_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            return *stage;
        }
    }
    match ml {
        Some(MlClass::ShadowAi) => KillchainStage::Exfiltration,
        Some(MlClass::Suspicious) => KillchainStage::InitialAccess,
        _ => KillchainStage::Reconnaissance,
    }
}
