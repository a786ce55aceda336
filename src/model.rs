//! Portable model artifacts and the loaded model handle.
//!
//! The training job exports its regressor as `model/model.json` next to the
//! usual run artifacts. Two flavors are understood:
//!
//! ```text
//! linear:        y = intercept + Σ coefficients[i] × x[i]
//! tree_ensemble: y = base_score + Σ tree_t(x)
//! ```
//!
//! Tree nodes are stored flat; node 0 is the root. A split sends a row left
//! when `x[feature] < threshold`.

use crate::registry::ModelUri;
use serde::{Deserialize, Serialize};

/// Anything that maps one feature vector, ordered as `feature_names`, to a
/// predicted value.
pub trait Model {
    fn feature_names(&self) -> &[String];

    fn predict_row(&self, features: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum ModelArtifact {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
}

impl ModelArtifact {
    /// Structural checks run once on load so prediction never indexes out of
    /// bounds.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ModelArtifact::Linear(m) => m.validate(),
            ModelArtifact::TreeEnsemble(m) => m.validate(),
        }
    }
}

impl Model for ModelArtifact {
    fn feature_names(&self) -> &[String] {
        match self {
            ModelArtifact::Linear(m) => &m.feature_names,
            ModelArtifact::TreeEnsemble(m) => &m.feature_names,
        }
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        match self {
            ModelArtifact::Linear(m) => m.predict_row(features),
            ModelArtifact::TreeEnsemble(m) => m.predict_row(features),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != self.feature_names.len() {
            return Err(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            ));
        }
        Ok(())
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl TreeEnsemble {
    fn validate(&self) -> Result<(), String> {
        let n_features = self.feature_names.len();
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {} has no nodes", t));
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                if let TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= n_features {
                        return Err(format!(
                            "tree {} node {} splits on feature {} of {}",
                            t, n, feature, n_features
                        ));
                    }
                    // children must come after their parent, which also rules out cycles
                    for child in [*left, *right] {
                        if child <= n || child >= tree.nodes.len() {
                            return Err(format!(
                                "tree {} node {} has invalid child {}",
                                t, n, child
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.evaluate(features)).sum::<f64>()
    }
}

impl RegressionTree {
    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A model bound to the run it was loaded from. Resolved fresh on every
/// pipeline invocation.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub uri: ModelUri,
    pub artifact: ModelArtifact,
}

impl LoadedModel {
    pub fn run_id(&self) -> &str {
        self.uri.run_id()
    }
}

impl Model for LoadedModel {
    fn feature_names(&self) -> &[String] {
        self.artifact.feature_names()
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        self.artifact.predict_row(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_linear_prediction() {
        let model = LinearModel {
            feature_names: names(3),
            intercept: 1.5,
            coefficients: vec![2.0, 0.0, -1.0],
        };
        assert_relative_eq!(model.predict_row(&[1.0, 100.0, 0.5]), 3.0);
    }

    #[test]
    fn test_tree_ensemble_from_json() {
        let json = r#"{
            "flavor": "tree_ensemble",
            "feature_names": ["hour", "lag_1"],
            "base_score": 0.5,
            "trees": [
                {"nodes": [
                    {"feature": 0, "threshold": 7.0, "left": 1, "right": 2},
                    {"value": 1.0},
                    {"feature": 1, "threshold": 10.0, "left": 3, "right": 4},
                    {"value": 4.0},
                    {"value": 9.0}
                ]},
                {"nodes": [{"value": 0.25}]}
            ]
        }"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        artifact.validate().unwrap();

        assert_relative_eq!(artifact.predict_row(&[3.0, 50.0]), 1.75);
        assert_relative_eq!(artifact.predict_row(&[8.0, 2.0]), 4.75);
        assert_relative_eq!(artifact.predict_row(&[8.0, 12.0]), 9.75);
        assert_eq!(artifact.feature_names(), &["hour".to_string(), "lag_1".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let linear = ModelArtifact::Linear(LinearModel {
            feature_names: names(2),
            intercept: 0.0,
            coefficients: vec![1.0],
        });
        assert!(linear.validate().is_err());

        let cyclic = ModelArtifact::TreeEnsemble(TreeEnsemble {
            feature_names: names(1),
            base_score: 0.0,
            trees: vec![RegressionTree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 1.0,
                        left: 0,
                        right: 1,
                    },
                    TreeNode::Leaf { value: 1.0 },
                ],
            }],
        });
        assert!(cyclic.validate().is_err());

        let bad_feature = ModelArtifact::TreeEnsemble(TreeEnsemble {
            feature_names: names(1),
            base_score: 0.0,
            trees: vec![RegressionTree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 4,
                        threshold: 1.0,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: 1.0 },
                    TreeNode::Leaf { value: 2.0 },
                ],
            }],
        });
        assert!(bad_feature.validate().is_err());
    }
}
