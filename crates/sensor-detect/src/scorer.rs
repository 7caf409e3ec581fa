//! C4: ML Scorer — loads a pre-trained tree-ensemble artifact and
//! scores feature vectors. Absent a model, scoring degrades to a
//! deterministic `0.0` rather than the source prototype's random
//! `[0.3, 0.7]` stub (spec.md §9 Open Question, resolved in favor of
//! avoiding spurious alerts).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::features::{FEATURE_COUNT, FEATURE_NAMES};

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("failed to read model artifact at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(
        "model feature layout mismatch: artifact declares {found:?}, expected {expected:?}"
    )]
    FeatureLayoutMismatch { found: Vec<String>, expected: Vec<String> },
}

/// Result of one scoring call.
#[derive(Debug, Clone, Default)]
pub struct ScoreResult {
    pub score: f64,
    pub feature_importance: Option<HashMap<String, f64>>,
    /// Set when scoring degraded (e.g. "model-not-loaded"); advisory only.
    pub diagnostic: Option<String>,
}

/// A scorer that turns a feature vector into `P(anomaly | features)`.
/// Implementations must be safe to call concurrently from any forwarder
/// once loaded (spec.md §5: "inference must be safe to call
/// concurrently").
pub trait MlModel: Send + Sync {
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> ScoreResult;

    /// Whether this scorer is backed by a real model artifact rather
    /// than the null stand-in, surfaced on the sink's health route
    /// (spec.md §6 ambient "model-loaded status"). Defaults to `true`
    /// for scorers that don't override it (i.e. anything but `NullModel`
    /// and an empty-forest `ForestModel`).
    fn is_loaded(&self) -> bool {
        true
    }
}

/// Stand-in used when no model artifact is configured or found.
/// Returns a constant score of `0.0` and a diagnostic, never fails.
#[derive(Debug, Default)]
pub struct NullModel;

impl MlModel for NullModel {
    fn predict(&self, _features: &[f64; FEATURE_COUNT]) -> ScoreResult {
        ScoreResult { score: 0.0, feature_importance: None, diagnostic: Some("model-not-loaded".to_string()) }
    }

    fn is_loaded(&self) -> bool {
        false
    }
}

/// One node of a decision tree in the forest.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf { value: f64 },
    Split { feature_index: usize, threshold: f64, left: Box<TreeNode>, right: Box<TreeNode> },
}

impl TreeNode {
    fn eval(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split { feature_index, threshold, left, right } => {
                let value = features.get(*feature_index).copied().unwrap_or(0.0);
                if value <= *threshold {
                    left.eval(features)
                } else {
                    right.eval(features)
                }
            }
        }
    }
}

/// On-disk model artifact: a small forest of decision trees plus the
/// ordered feature-name list the model was trained against and
/// precomputed feature importances.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub trees: Vec<TreeNode>,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
}

/// Random-forest-style scorer backed by a loaded `ModelArtifact`.
pub struct ForestModel {
    artifact: ModelArtifact,
}

impl ForestModel {
    /// Loads and validates a model artifact from `path`. A feature-name
    /// layout mismatch is a fatal configuration error, surfaced here at
    /// startup rather than per-event (spec.md §4.3/§7).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScorerError> {
        let path_ref = path.as_ref();
        let bytes = std::fs::read(path_ref)
            .map_err(|source| ScorerError::Io { path: path_ref.display().to_string(), source })?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;

        let expected: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        if artifact.feature_names != expected {
            return Err(ScorerError::FeatureLayoutMismatch { found: artifact.feature_names, expected });
        }

        Ok(Self { artifact })
    }
}

impl MlModel for ForestModel {
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> ScoreResult {
        if self.artifact.trees.is_empty() {
            return ScoreResult { score: 0.0, feature_importance: None, diagnostic: Some("model-not-loaded".to_string()) };
        }
        let sum: f64 = self.artifact.trees.iter().map(|t| t.eval(features)).sum();
        let score = (sum / self.artifact.trees.len() as f64).clamp(0.0, 1.0);
        let feature_importance =
            if self.artifact.feature_importance.is_empty() { None } else { Some(self.artifact.feature_importance.clone()) };
        ScoreResult { score, feature_importance, diagnostic: None }
    }

    fn is_loaded(&self) -> bool {
        !self.artifact.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_model_always_scores_zero() {
        let model = NullModel;
        let features = [0.0; FEATURE_COUNT];
        let result = model.predict(&features);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.diagnostic.as_deref(), Some("model-not-loaded"));
        assert!(!model.is_loaded());
    }

    #[test]
    fn forest_model_rejects_mismatched_feature_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = serde_json::json!({
            "feature_names": ["wrong", "layout"],
            "trees": [],
        });
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let err = ForestModel::load(&path).unwrap_err();
        assert!(matches!(err, ScorerError::FeatureLayoutMismatch { .. }));
    }

    #[test]
    fn forest_model_scores_via_tree_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let feature_names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let artifact = serde_json::json!({
            "feature_names": feature_names,
            "trees": [
                {"kind": "split", "feature_index": 0, "threshold": 0.5,
                 "left": {"kind": "leaf", "value": 0.1},
                 "right": {"kind": "leaf", "value": 0.9}}
            ],
            "feature_importance": {"is_clipboard": 1.0},
        });
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let model = ForestModel::load(&path).unwrap();
        let mut features = [0.0; FEATURE_COUNT];
        features[0] = 1.0;
        let result = model.predict(&features);
        assert_eq!(result.score, 0.9);
        assert!(result.feature_importance.is_some());
        assert!(model.is_loaded());
    }

    #[test]
    fn forest_model_with_empty_forest_reports_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let feature_names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let artifact = serde_json::json!({"feature_names": feature_names, "trees": []});
        std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        let model = ForestModel::load(&path).unwrap();
        assert!(!model.is_loaded());
    }
}
