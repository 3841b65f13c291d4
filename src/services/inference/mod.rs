// Inference Module
// Classifier ensemble organized into specialized submodules:
// - vectorizer: fitted TF-IDF / count text features
// - classifier: classifier contract + logistic regression adapter
// - neural: feed-forward network adapter (single sigmoid output)
// - registry: artifact loading into an immutable ModelBundle
// - pipeline: per-axis analysis producing a Verdict

pub mod vectorizer;
pub mod classifier;
pub mod neural;
pub mod registry;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod fixtures;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Fitted state is absent, inconsistent or cannot serve this request.
    #[error("model incompatible ({component}): {reason}")]
    Incompatible { component: String, reason: String },
    /// The model could not produce a valid distribution for this input.
    #[error("inference failed: {reason}")]
    Inference { reason: String },
}

impl ModelError {
    pub fn incompatible(component: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::Incompatible {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Into<String>) -> Self {
        ModelError::Inference {
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        ModelError::inference(format!(
            "feature dimension mismatch: model expects {}, got {}",
            expected, actual
        ))
    }
}

pub use vectorizer::{FeatureVector, FeatureVectorizer, TfidfVectorizer, VectorizerArtifact};
pub use classifier::{ClassifierAdapter, ClassifierKind, LinearClassifier, LinearArtifact};
pub use neural::{Activation, LayerSpec, NeuralClassifier};
pub use registry::{ArtifactError, ArtifactLocator, AxisModel, ModelBundle, ModelRegistry};
pub use pipeline::{analyze, AnalysisError};
