// Neural Classifier
// Feed-forward network with a single sigmoid output read as P(positive)

use serde::Deserialize;

use super::classifier::{check_dimension, sigmoid, ClassifierAdapter, ClassifierKind};
use super::vectorizer::FeatureVector;
use super::ModelError;
use crate::models::LabelDistribution;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// One layer of a fitted network as stored on disk. Dense kernels are laid
/// out `[input][units]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    Dense {
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default = "default_activation")]
        activation: Activation,
    },
    /// Training-time regularisation; a no-op at inference.
    Dropout {
        #[serde(default)]
        rate: f64,
    },
}

/// Scores at or above this read as the positive (second) label.
pub const POSITIVE_THRESHOLD: f64 = 0.5;

fn default_activation() -> Activation { Activation::Linear }

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    activation: Activation,
}

impl DenseLayer {
    fn units(&self) -> usize {
        self.bias.len()
    }

    fn forward_dense(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            if *x == 0.0 {
                continue;
            }
            for (acc, w) in out.iter_mut().zip(row) {
                *acc += x * w;
            }
        }
        out.into_iter().map(|z| self.activation.apply(z)).collect()
    }

    fn forward_sparse(&self, input: &FeatureVector) -> Vec<f64> {
        let mut out = self.bias.clone();
        for (idx, x) in input.entries() {
            for (acc, w) in out.iter_mut().zip(&self.weights[*idx]) {
                *acc += x * w;
            }
        }
        out.into_iter().map(|z| self.activation.apply(z)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NeuralClassifier {
    layers: Vec<DenseLayer>,
    input_dim: usize,
    dropout_layers: usize,
}

impl NeuralClassifier {
    pub fn from_layers(name: &str, specs: Vec<LayerSpec>) -> Result<Self, ModelError> {
        let incompatible = |reason: String| ModelError::incompatible(name, reason);

        let mut layers: Vec<DenseLayer> = Vec::new();
        let mut dropout_layers = 0;

        for (i, spec) in specs.into_iter().enumerate() {
            match spec {
                LayerSpec::Dropout { rate } => {
                    if !(0.0..1.0).contains(&rate) {
                        return Err(incompatible(format!("layer {}: dropout rate {} out of range", i, rate)));
                    }
                    dropout_layers += 1;
                }
                LayerSpec::Dense {
                    weights,
                    bias,
                    activation,
                } => {
                    if weights.is_empty() || bias.is_empty() {
                        return Err(incompatible(format!("layer {}: empty dense layer", i)));
                    }
                    if let Some(prev) = layers.last() {
                        if weights.len() != prev.units() {
                            return Err(incompatible(format!(
                                "layer {}: expects {} inputs but previous layer has {} units",
                                i,
                                weights.len(),
                                prev.units()
                            )));
                        }
                    }
                    if let Some(row) = weights.iter().position(|r| r.len() != bias.len()) {
                        return Err(incompatible(format!(
                            "layer {}: kernel row {} has {} units, bias has {}",
                            i,
                            row,
                            weights[row].len(),
                            bias.len()
                        )));
                    }
                    if weights.iter().flatten().chain(bias.iter()).any(|w| !w.is_finite()) {
                        return Err(incompatible(format!("layer {}: non-finite weights", i)));
                    }
                    layers.push(DenseLayer {
                        weights,
                        bias,
                        activation,
                    });
                }
            }
        }

        let (first, last) = match (layers.first(), layers.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(incompatible("network has no dense layers".to_string())),
        };
        if last.units() != 1 {
            return Err(incompatible(format!(
                "output layer has {} units, expected a single probability",
                last.units()
            )));
        }
        let input_dim = first.weights.len();

        Ok(Self {
            layers,
            input_dim,
            dropout_layers,
        })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn dropout_layers(&self) -> usize {
        self.dropout_layers
    }

    /// Positive-class probability for one feature row.
    pub fn predict_positive(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        check_dimension(self.input_dim, features)?;

        let mut layers = self.layers.iter();
        let mut activations = match layers.next() {
            Some(first) => first.forward_sparse(features),
            None => return Err(ModelError::inference("network has no layers")),
        };
        for layer in layers {
            activations = layer.forward_dense(&activations);
        }

        let p = activations.first().copied().unwrap_or(f64::NAN);
        if !p.is_finite() {
            return Err(ModelError::inference("network output is not finite"));
        }
        if !(0.0..=1.0).contains(&p) {
            return Err(ModelError::inference(format!(
                "network output {} is not a probability",
                p
            )));
        }
        Ok(p)
    }
}

impl ClassifierAdapter for NeuralClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Neural
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// `{labels[0]: 1 - p, labels[1]: p}` from the single output unit.
    fn predict_distribution(
        &self,
        features: &FeatureVector,
        labels: &'static [&'static str],
    ) -> Result<LabelDistribution, ModelError> {
        if labels.len() != 2 {
            return Err(ModelError::inference(format!(
                "single-output network needs exactly two labels, got {}",
                labels.len()
            )));
        }
        let p = self.predict_positive(features)?;
        LabelDistribution::new(labels, vec![1.0 - p, p])
    }

    /// `p >= 0.5` picks the positive label, so an exact 0.5 is positive.
    fn decide(&self, distribution: &LabelDistribution) -> usize {
        match distribution.probabilities().get(1) {
            Some(p) if *p >= POSITIVE_THRESHOLD => 1,
            _ => 0,
        }
    }
}
