//! Inference-only model bundle.
//!
//! Training happens offline; this loads the fitted parameters (feature
//! baselines and class centroids) from a JSON file and serves scores.
//! Handles are immutable after load and swapped atomically on reload.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shadow_core::MlClass;

use crate::features::FEATURE_DIM;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassCentroid {
    pub class: MlClass,
    pub values: Vec<f64>,
}

/// Fitted parameters: per-feature population baselines for the outlier
/// score, and per-class centroids (in standardized space) for the
/// classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub centroids: Vec<ClassCentroid>,
}

impl ModelBundle {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let bundle: ModelBundle = serde_json::from_str(&raw)?;
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.feature_means.len() != FEATURE_DIM {
            return Err(ModelError::Dimension {
                expected: FEATURE_DIM,
                got: self.feature_means.len(),
            });
        }
        if self.feature_stds.len() != FEATURE_DIM {
            return Err(ModelError::Dimension {
                expected: FEATURE_DIM,
                got: self.feature_stds.len(),
            });
        }
        for c in &self.centroids {
            if c.values.len() != FEATURE_DIM {
                return Err(ModelError::Dimension {
                    expected: FEATURE_DIM,
                    got: c.values.len(),
                });
            }
        }
        Ok(())
    }

    fn standardize(&self, features: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for i in 0..FEATURE_DIM {
            let std = self.feature_stds[i];
            if std > f64::EPSILON {
                out[i] = (features[i] - self.feature_means[i]) / std;
            }
        }
        out
    }

    /// Outlier score in [0, 1]: max |z| across features, scaled by 5
    /// sigma and clamped.
    pub fn anomaly_score(&self, features: &[f64; FEATURE_DIM]) -> f64 {
        let z = self.standardize(features);
        let max_z = z.iter().map(|v| v.abs()).fold(0.0, f64::max);
        (max_z / 5.0).min(1.0)
    }

    /// Nearest-centroid classification with a softmax-style confidence
    /// over negative distances.
    pub fn classify(&self, features: &[f64; FEATURE_DIM]) -> (MlClass, f64) {
        if self.centroids.is_empty() {
            return (MlClass::Normal, 0.0);
        }

        let z = self.standardize(features);
        let distances: Vec<(MlClass, f64)> = self
            .centroids
            .iter()
            .map(|c| {
                let d2: f64 = c
                    .values
                    .iter()
                    .zip(z.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (c.class, d2.sqrt())
            })
            .collect();

        let weights: Vec<f64> = distances.iter().map(|(_, d)| (-d).exp()).collect();
        let total: f64 = weights.iter().sum();
        let (best_idx, _) = distances
            .iter()
            .enumerate()
            .min_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))
            .unwrap();

        let confidence = if total > f64::EPSILON {
            weights[best_idx] / total
        } else {
            // All centroids are very far away; call it an even split.
            1.0 / distances.len() as f64
        };
        (distances[best_idx].0, confidence)
    }
}

#[cfg(test)]
pub mod tests_support {
    /// A small well-formed bundle for engine tests.
    pub fn bundle_json() -> String {
        let means: Vec<f64> = vec![443.0, 1000.0, 2000.0, 1.0, 3.0, 2.0, 0.2, 0.1, 0.0, 0.1, 0.5, 0.1];
        let stds: Vec<f64> = vec![1000.0, 5000.0, 10000.0, 2.0, 1.0, 3.0, 0.5, 0.3, 0.1, 0.3, 0.5, 0.3];
        let normal: Vec<f64> = vec![0.0; 12];
        let suspicious: Vec<f64> = vec![0.8; 12];
        let shadow: Vec<f64> = vec![2.0; 12];
        serde_json::json!({
            "feature_means": means,
            "feature_stds": stds,
            "centroids": [
                {"class": "normal", "values": normal},
                {"class": "suspicious", "values": suspicious},
                {"class": "shadow_ai", "values": shadow},
            ],
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ModelBundle {
        serde_json::from_str(&tests_support::bundle_json()).unwrap()
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let bad = r#"{"feature_means":[1.0],"feature_stds":[1.0],"centroids":[]}"#;
        let parsed: ModelBundle = serde_json::from_str(bad).unwrap();
        assert!(matches!(
            parsed.validate(),
            Err(ModelError::Dimension { expected: 12, got: 1 })
        ));
    }

    #[test]
    fn anomaly_score_at_baseline_is_zero() {
        let b = bundle();
        let mut at_mean = [0.0; FEATURE_DIM];
        at_mean.copy_from_slice(&b.feature_means);
        assert_eq!(b.anomaly_score(&at_mean), 0.0);
    }

    #[test]
    fn anomaly_score_saturates_at_one() {
        let b = bundle();
        let mut far = [0.0; FEATURE_DIM];
        far[0] = 1e9;
        assert_eq!(b.anomaly_score(&far), 1.0);
    }

    #[test]
    fn classify_picks_nearest_centroid() {
        let b = bundle();
        let mut at_mean = [0.0; FEATURE_DIM];
        at_mean.copy_from_slice(&b.feature_means);
        // Standardized features are all-zero at the mean: nearest is "normal".
        let (class, conf) = b.classify(&at_mean);
        assert_eq!(class, MlClass::Normal);
        assert!(conf > 1.0 / 3.0);
    }
}
