//! Kill-chain rollup across the alert history.

use std::collections::HashSet;

use serde::Serialize;

use shadow_core::{Alert, KillchainStage};

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: KillchainStage,
    pub label: &'static str,
    pub alert_count: u64,
    pub active: bool,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillchainView {
    pub stages: Vec<StageSummary>,
    pub total_alerts: u64,
    pub active_stages: u64,
    /// `20 * active_stages`: five stages, 100 when all are live.
    pub chain_completion: u64,
}

pub fn killchain(alerts: &[Alert]) -> KillchainView {
    let mut stages: Vec<StageSummary> = KillchainStage::ALL
        .iter()
        .map(|stage| StageSummary {
            stage: *stage,
            label: stage.label(),
            alert_count: 0,
            active: false,
            sources: Vec::new(),
        })
        .collect();

    for alert in alerts {
        let idx = KillchainStage::ALL
            .iter()
            .position(|s| *s == alert.killchain_stage)
            .unwrap_or(0);
        stages[idx].alert_count += 1;
    }

    for (idx, stage) in stages.iter_mut().enumerate() {
        let mut sources: HashSet<&str> = HashSet::new();
        for alert in alerts {
            if alert.killchain_stage == KillchainStage::ALL[idx] {
                sources.insert(&alert.source);
            }
        }
        let mut sorted: Vec<String> = sources.into_iter().map(str::to_string).collect();
        sorted.sort();
        stage.sources = sorted;
        stage.active = stage.alert_count > 0;
    }

    let active_stages = stages.iter().filter(|s| s.active).count() as u64;
    KillchainView {
        total_alerts: alerts.len() as u64,
        active_stages,
        chain_completion: 20 * active_stages,
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_core::Severity;

    #[test]
    fn completion_is_twenty_per_active_stage() {
        let mut a = crate::risk::tests::alert("10.0.0.5", Severity::High);
        a.killchain_stage = KillchainStage::Execution;
        let mut b = crate::risk::tests::alert("10.0.0.6", Severity::Medium);
        b.killchain_stage = KillchainStage::Exfiltration;

        let view = killchain(&[a, b]);
        assert_eq!(view.total_alerts, 2);
        assert_eq!(view.active_stages, 2);
        assert_eq!(view.chain_completion, 40);

        let exec = view
            .stages
            .iter()
            .find(|s| s.stage == KillchainStage::Execution)
            .unwrap();
        assert!(exec.active);
        assert_eq!(exec.sources, vec!["10.0.0.5".to_string()]);
    }

    #[test]
    fn empty_history_is_fully_inactive() {
        let view = killchain(&[]);
        assert_eq!(view.chain_completion, 0);
        assert!(view.stages.iter().all(|s| !s.active));
        assert_eq!(view.stages.len(), 5);
    }
}
