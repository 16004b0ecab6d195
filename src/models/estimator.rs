//! Serialized estimators evaluated at prediction time.
//!
//! Three shapes cover the trained models: a linear regressor, a logistic
//! classifier (returns the positive-class probability) and a tree ensemble
//! whose prediction is the mean leaf value across trees.

use serde::{Deserialize, Serialize};

use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Estimator {
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    Logistic {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    Forest {
        trees: Vec<Tree>,
    },
}

/// One decision tree in flattened form; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Samples with `x[feature] <= threshold` go left
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

impl Estimator {
    /// Check the estimator is well-formed for `n_features` inputs.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        match self {
            Estimator::Linear { coefficients, .. } | Estimator::Logistic { coefficients, .. } => {
                if coefficients.len() != n_features {
                    return Err(ModelError::Invalid(format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    )));
                }
            }
            Estimator::Forest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::Invalid("forest has no trees".to_string()));
                }
                for (t, tree) in trees.iter().enumerate() {
                    if tree.nodes.is_empty() {
                        return Err(ModelError::Invalid(format!("tree {t} has no nodes")));
                    }
                    for node in &tree.nodes {
                        if let Node::Split {
                            feature,
                            left,
                            right,
                            ..
                        } = *node
                        {
                            if feature >= n_features
                                || left >= tree.nodes.len()
                                || right >= tree.nodes.len()
                            {
                                return Err(ModelError::Invalid(format!(
                                    "tree {t} has an out-of-range split"
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate on one feature vector.
    pub fn predict(&self, x: &[f64]) -> Result<f64, ModelError> {
        match self {
            Estimator::Linear {
                intercept,
                coefficients,
            } => Ok(intercept + dot(coefficients, x)?),
            Estimator::Logistic {
                intercept,
                coefficients,
            } => Ok(sigmoid(intercept + dot(coefficients, x)?)),
            Estimator::Forest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::Invalid("forest has no trees".to_string()));
                }
                let mut total = 0.0;
                for tree in trees {
                    total += tree.predict(x)?;
                }
                Ok(total / trees.len() as f64)
            }
        }
    }
}

impl Tree {
    /// Walk from the root to a leaf.
    pub fn predict(&self, x: &[f64]) -> Result<f64, ModelError> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return Ok(*value),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = x.get(*feature).ok_or_else(|| {
                        ModelError::Invalid(format!("split on missing feature {feature}"))
                    })?;
                    index = if *v <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(ModelError::Invalid(format!("node {index} out of range")));
                }
            }
        }
        Err(ModelError::Invalid("tree contains a cycle".to_string()))
    }
}

fn dot(coefficients: &[f64], x: &[f64]) -> Result<f64, ModelError> {
    if coefficients.len() != x.len() {
        return Err(ModelError::Invalid(format!(
            "expected {} features, got {}",
            coefficients.len(),
            x.len()
        )));
    }
    Ok(coefficients.iter().zip(x).map(|(c, v)| c * v).sum())
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
