// Classifier Adapter
// Shared classifier contract plus the logistic-regression implementation

use serde::Deserialize;
use std::fmt;

use super::vectorizer::FeatureVector;
use super::ModelError;
use crate::models::LabelDistribution;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClassifierKind {
    Linear,
    Neural,
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierKind::Linear => f.write_str("linear"),
            ClassifierKind::Neural => f.write_str("neural"),
        }
    }
}

/// A fitted classifier producing a probability distribution over an ordered label list.
///
/// Implementations are immutable after construction and run in inference mode only.
pub trait ClassifierAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> ClassifierKind;

    /// Feature width the classifier was fitted on.
    fn input_dim(&self) -> usize;

    fn predict_distribution(
        &self,
        features: &FeatureVector,
        labels: &'static [&'static str],
    ) -> Result<LabelDistribution, ModelError>;

    /// Index of the predicted label. Defaults to argmax, earliest label on ties.
    fn decide(&self, distribution: &LabelDistribution) -> usize {
        distribution.argmax()
    }
}

pub(crate) fn check_dimension(expected: usize, features: &FeatureVector) -> Result<(), ModelError> {
    if features.dimension() != expected {
        return Err(ModelError::dimension_mismatch(expected, features.dimension()));
    }
    Ok(())
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

// ============ Logistic Regression ============

/// On-disk form of a fitted logistic regression: one coefficient row per
/// class (or a single row for a binary model).
#[derive(Debug, Clone, Deserialize)]
pub struct LinearArtifact {
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LinearClassifier {
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    input_dim: usize,
}

impl LinearClassifier {
    pub fn from_artifact(name: &str, artifact: LinearArtifact) -> Result<Self, ModelError> {
        let incompatible = |reason: String| ModelError::incompatible(name, reason);

        if artifact.coef.is_empty() {
            return Err(incompatible("coefficient matrix is empty".to_string()));
        }
        if artifact.intercept.len() != artifact.coef.len() {
            return Err(incompatible(format!(
                "{} intercepts for {} coefficient rows",
                artifact.intercept.len(),
                artifact.coef.len()
            )));
        }

        let input_dim = artifact.coef[0].len();
        if input_dim == 0 {
            return Err(incompatible("coefficient rows are empty".to_string()));
        }
        for (i, row) in artifact.coef.iter().enumerate() {
            if row.len() != input_dim {
                return Err(incompatible(format!(
                    "coefficient row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    input_dim
                )));
            }
            if row.iter().any(|w| !w.is_finite()) {
                return Err(incompatible(format!("coefficient row {} is not finite", i)));
            }
        }
        if artifact.intercept.iter().any(|b| !b.is_finite()) {
            return Err(incompatible("intercept is not finite".to_string()));
        }

        Ok(Self {
            coef: artifact.coef,
            intercept: artifact.intercept,
            input_dim,
        })
    }

    fn decision_function(&self, features: &FeatureVector) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| features.dot(row) + b)
            .collect()
    }
}

impl ClassifierAdapter for LinearClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Linear
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn predict_distribution(
        &self,
        features: &FeatureVector,
        labels: &'static [&'static str],
    ) -> Result<LabelDistribution, ModelError> {
        check_dimension(self.input_dim, features)?;

        let scores = self.decision_function(features);
        if scores.iter().any(|z| !z.is_finite()) {
            return Err(ModelError::inference("decision function is not finite"));
        }

        let probabilities = match (scores.len(), labels.len()) {
            (1, 2) => {
                let p = sigmoid(scores[0]);
                vec![1.0 - p, p]
            }
            (rows, n) if rows == n && rows > 1 => softmax(&scores),
            (rows, n) => {
                return Err(ModelError::inference(format!(
                    "{} coefficient rows cannot score {} labels",
                    rows, n
                )))
            }
        };

        LabelDistribution::new(labels, probabilities)
    }
}
