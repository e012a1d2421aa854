//! Intelligence engine: ML-flavored scoring on top of the rule detectors.
//!
//! Three primitives fused into one [`Verdict`] per flow: an anomaly score
//! from z-score baselines, a nearest-centroid classification, and the
//! behavioral session score. With no model bundle loaded the engine
//! answers neutrally and the analyzer runs on rules alone.

pub mod features;
pub mod model;
pub mod session;

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use shadow_core::{FlowEvent, MlClass, Severity};

use crate::model::ModelBundle;
use crate::session::SessionTracker;

/// Fused output of the intelligence engine for a single flow.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Verdict {
    pub classification: MlClass,
    pub confidence: f64,
    pub anomaly: f64,
    pub risk: f64,
}

impl Verdict {
    pub fn neutral() -> Self {
        Self {
            classification: MlClass::Normal,
            confidence: 0.0,
            anomaly: 0.0,
            risk: 0.0,
        }
    }
}

pub struct IntelEngine {
    model: ArcSwapOption<ModelBundle>,
    sessions: std::sync::Mutex<SessionTracker>,
}

impl IntelEngine {
    pub fn new(half_life_secs: u64, session_ttl_secs: u64) -> Self {
        Self {
            model: ArcSwapOption::const_empty(),
            sessions: std::sync::Mutex::new(SessionTracker::new(
                half_life_secs,
                session_ttl_secs,
            )),
        }
    }

    /// Load (or hot-swap) the model bundle from a JSON file.
    pub fn load_model(&self, path: &Path) -> Result<(), model::ModelError> {
        let bundle = ModelBundle::load(path)?;
        info!(path = %path.display(), features = bundle.feature_means.len(), "model bundle loaded");
        self.model.store(Some(Arc::new(bundle)));
        Ok(())
    }

    pub fn has_model(&self) -> bool {
        self.model.load().is_some()
    }

    /// Score one flow. Also feeds the session tracker.
    pub fn score(&self, event: &FlowEvent, now: DateTime<Utc>) -> Verdict {
        let session_score = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.observe(event, now);
            sessions.score(event.source_ip, now)
        };

        let Some(model) = self.model.load_full() else {
            return Verdict::neutral();
        };

        let features = features::extract(event);
        let anomaly = model.anomaly_score(&features);
        let (classification, confidence) = model.classify(&features);

        let shadow_conf = if classification == MlClass::ShadowAi {
            confidence
        } else {
            0.0
        };
        let risk =
            (40.0 * anomaly + 40.0 * shadow_conf + 20.0 * session_score).clamp(0.0, 100.0);

        Verdict {
            classification,
            confidence,
            anomaly,
            risk,
        }
    }

    /// Fold an emitted alert back into the source's session heat.
    pub fn record_alert(&self, source: std::net::IpAddr, severity: Severity, now: DateTime<Utc>) {
        self.sessions.lock().unwrap().record_alert(source, severity, now);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event() -> FlowEvent {
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: "10.0.0.5".parse().unwrap(),
            destination_ip: "104.18.32.7".parse().unwrap(),
            source_port: 50000,
            destination_port: 443,
            protocol: shadow_core::Protocol::Https,
            bytes_sent: 2_048,
            bytes_received: 8_192,
            ja3_hash: None,
            metadata: HashMap::from([("sni".to_string(), "api.openai.com".to_string())]),
        }
    }

    #[test]
    fn cold_start_returns_neutral_verdict() {
        let engine = IntelEngine::new(600, 1_800);
        let v = engine.score(&event(), Utc::now());
        assert_eq!(v.classification, MlClass::Normal);
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.anomaly, 0.0);
        assert_eq!(v.risk, 0.0);
    }

    #[test]
    fn fusion_formula_is_bounded() {
        let engine = IntelEngine::new(600, 1_800);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, model::tests_support::bundle_json()).unwrap();
        engine.load_model(&path).unwrap();

        let v = engine.score(&event(), Utc::now());
        assert!((0.0..=1.0).contains(&v.anomaly));
        assert!((0.0..=1.0).contains(&v.confidence));
        assert!((0.0..=100.0).contains(&v.risk));
    }
}
