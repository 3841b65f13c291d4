// Model Registry
// Resolves per-axis artifacts from a fixed directory and binds them into an immutable ModelBundle

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use super::classifier::{ClassifierAdapter, ClassifierKind, LinearArtifact, LinearClassifier};
use super::neural::{LayerSpec, NeuralClassifier};
use super::vectorizer::{FeatureVectorizer, TfidfVectorizer, VectorizerArtifact};
use super::ModelError;
use crate::models::{Axis, AxisVerdict};

pub const FORMALITY_ARTIFACT: &str = "formality_logreg.json";
pub const AI_VS_HUMAN_ARTIFACT: &str = "ai_vs_human_logreg.json";
pub const SENTIMENT_NETWORK_ARTIFACT: &str = "sentiment_mlp.json";
pub const SENTIMENT_VECTORIZER_ARTIFACT: &str = "sentiment_mlp_vectorizer.json";

pub const SUPPORTED_FORMAT_VERSION: u64 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Missing artifact: {}", .path.display())]
    Missing { path: PathBuf },
    #[error("Failed to read artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed artifact {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported format version {found} in {} (supported: {supported})", .path.display())]
    UnsupportedVersion { path: PathBuf, found: u64, supported: u64 },
    #[error("Incompatible artifact {}: {source}", .path.display())]
    Incompatible {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

impl ArtifactError {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactError::Missing { path }
            | ArtifactError::Io { path, .. }
            | ArtifactError::Malformed { path, .. }
            | ArtifactError::UnsupportedVersion { path, .. }
            | ArtifactError::Incompatible { path, .. } => path,
        }
    }
}

// ============ Locators ============

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArtifactLayout {
    /// One file holding `{format_version, vectorizer, classifier}`.
    Linear { model: &'static str },
    /// Network `{format_version, layers}` and its vectorizer `{format_version, vectorizer}`.
    Neural {
        network: &'static str,
        vectorizer: &'static str,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ArtifactLocator {
    pub axis: Axis,
    pub layout: ArtifactLayout,
}

impl ArtifactLocator {
    pub fn files(&self) -> Vec<&'static str> {
        match self.layout {
            ArtifactLayout::Linear { model } => vec![model],
            ArtifactLayout::Neural {
                network,
                vectorizer,
            } => vec![network, vectorizer],
        }
    }
}

const LOCATORS: [ArtifactLocator; 3] = [
    ArtifactLocator {
        axis: Axis::Sentiment,
        layout: ArtifactLayout::Neural {
            network: SENTIMENT_NETWORK_ARTIFACT,
            vectorizer: SENTIMENT_VECTORIZER_ARTIFACT,
        },
    },
    ArtifactLocator {
        axis: Axis::Formality,
        layout: ArtifactLayout::Linear {
            model: FORMALITY_ARTIFACT,
        },
    },
    ArtifactLocator {
        axis: Axis::AiVsHuman,
        layout: ArtifactLayout::Linear {
            model: AI_VS_HUMAN_ARTIFACT,
        },
    },
];

// ============ Bundle ============

/// Fitted vectorizer + classifier for one axis.
#[derive(Debug)]
pub struct AxisModel {
    axis: Axis,
    vectorizer: Box<dyn FeatureVectorizer>,
    classifier: Box<dyn ClassifierAdapter>,
}

impl AxisModel {
    pub fn new(
        axis: Axis,
        vectorizer: Box<dyn FeatureVectorizer>,
        classifier: Box<dyn ClassifierAdapter>,
    ) -> Result<Self, ModelError> {
        if vectorizer.dimension() != classifier.input_dim() {
            return Err(ModelError::incompatible(
                axis.name(),
                format!(
                    "vectorizer produces {} features, classifier expects {}",
                    vectorizer.dimension(),
                    classifier.input_dim()
                ),
            ));
        }
        Ok(Self {
            axis,
            vectorizer,
            classifier,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn kind(&self) -> ClassifierKind {
        self.classifier.kind()
    }

    pub fn dimension(&self) -> usize {
        self.vectorizer.dimension()
    }

    /// Vectorize, score and let the classifier pick the label for this axis.
    pub fn predict(&self, text: &str) -> Result<AxisVerdict, ModelError> {
        let features = self.vectorizer.transform(text)?;
        let distribution = self
            .classifier
            .predict_distribution(&features, self.axis.labels())?;
        let index = self.classifier.decide(&distribution);
        AxisVerdict::with_prediction(self.axis, distribution, index)
    }
}

/// Every axis model the pipeline needs. There is no way to build a partial bundle.
#[derive(Debug)]
pub struct ModelBundle {
    sentiment: AxisModel,
    formality: AxisModel,
    ai_vs_human: AxisModel,
}

impl ModelBundle {
    pub fn new(sentiment: AxisModel, formality: AxisModel, ai_vs_human: AxisModel) -> Result<Self, ModelError> {
        for (expected, model) in [
            (Axis::Sentiment, &sentiment),
            (Axis::Formality, &formality),
            (Axis::AiVsHuman, &ai_vs_human),
        ] {
            if model.axis() != expected {
                return Err(ModelError::incompatible(
                    expected.name(),
                    format!("bundle slot received a {} model", model.axis()),
                ));
            }
        }
        Ok(Self {
            sentiment,
            formality,
            ai_vs_human,
        })
    }

    pub fn get(&self, axis: Axis) -> &AxisModel {
        match axis {
            Axis::Sentiment => &self.sentiment,
            Axis::Formality => &self.formality,
            Axis::AiVsHuman => &self.ai_vs_human,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisModel> + '_ {
        Axis::ALL.into_iter().map(move |axis| self.get(axis))
    }
}

// ============ Registry ============

#[derive(Deserialize)]
struct LinearEnvelope {
    vectorizer: VectorizerArtifact,
    classifier: LinearArtifact,
}

#[derive(Deserialize)]
struct NetworkEnvelope {
    layers: Vec<LayerSpec>,
}

#[derive(Deserialize)]
struct VectorizerEnvelope {
    vectorizer: VectorizerArtifact,
}

pub struct ModelRegistry {
    artifact_dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn locators() -> &'static [ArtifactLocator] {
        &LOCATORS
    }

    /// Every file `load` will read, in check order.
    pub fn required_paths(&self) -> Vec<PathBuf> {
        LOCATORS
            .iter()
            .flat_map(|loc| loc.files())
            .map(|name| self.artifact_dir.join(name))
            .collect()
    }

    /// Fail on the first required artifact that is not a readable file.
    pub fn verify(&self) -> Result<(), ArtifactError> {
        for path in self.required_paths() {
            if !path.is_file() {
                return Err(ArtifactError::Missing { path });
            }
        }
        Ok(())
    }

    /// Load every axis. Either the whole bundle comes back or nothing does.
    pub fn load(self) -> Result<ModelBundle, ArtifactError> {
        let start = Instant::now();
        info!("[REGISTRY] Loading artifacts from {}", self.artifact_dir.display());

        self.verify()?;

        let sentiment = self.load_axis(&LOCATORS[0])?;
        let formality = self.load_axis(&LOCATORS[1])?;
        let ai_vs_human = self.load_axis(&LOCATORS[2])?;

        let bundle = ModelBundle::new(sentiment, formality, ai_vs_human).map_err(|source| {
            ArtifactError::Incompatible {
                path: self.artifact_dir.clone(),
                source,
            }
        })?;

        for model in bundle.iter() {
            info!(
                axis = model.axis().name(),
                kind = %model.kind(),
                features = model.dimension(),
                "[REGISTRY] axis ready"
            );
        }
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "[REGISTRY] Model bundle loaded"
        );

        Ok(bundle)
    }

    fn load_axis(&self, locator: &ArtifactLocator) -> Result<AxisModel, ArtifactError> {
        let axis = locator.axis;
        match locator.layout {
            ArtifactLayout::Linear { model } => {
                let path = self.artifact_dir.join(model);
                let envelope: LinearEnvelope = read_artifact(&path)?;
                let incompatible = |source| ArtifactError::Incompatible {
                    path: path.clone(),
                    source,
                };

                let vectorizer = TfidfVectorizer::from_artifact(model, envelope.vectorizer)
                    .map_err(incompatible)?;
                let classifier = LinearClassifier::from_artifact(model, envelope.classifier)
                    .map_err(incompatible)?;
                AxisModel::new(axis, Box::new(vectorizer), Box::new(classifier))
                    .map_err(incompatible)
            }
            ArtifactLayout::Neural {
                network,
                vectorizer,
            } => {
                let network_path = self.artifact_dir.join(network);
                let vectorizer_path = self.artifact_dir.join(vectorizer);

                let net: NetworkEnvelope = read_artifact(&network_path)?;
                let vec: VectorizerEnvelope = read_artifact(&vectorizer_path)?;

                let classifier = NeuralClassifier::from_layers(network, net.layers).map_err(|source| {
                    ArtifactError::Incompatible {
                        path: network_path.clone(),
                        source,
                    }
                })?;
                let vectorizer = TfidfVectorizer::from_artifact(vectorizer, vec.vectorizer).map_err(|source| {
                    ArtifactError::Incompatible {
                        path: vectorizer_path.clone(),
                        source,
                    }
                })?;
                AxisModel::new(axis, Box::new(vectorizer), Box::new(classifier)).map_err(|source| {
                    ArtifactError::Incompatible {
                        path: network_path,
                        source,
                    }
                })
            }
        }
    }
}

/// Read, version-check and deserialize one artifact document.
fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let start = Instant::now();
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ArtifactError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let malformed = |source| ArtifactError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let document: Value = serde_json::from_slice(&bytes).map_err(malformed)?;

    let version = document
        .get("format_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(serde::de::Error::custom("missing numeric format_version")))?;
    if version != SUPPORTED_FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: version,
            supported: SUPPORTED_FORMAT_VERSION,
        });
    }

    let parsed = serde_json::from_value(document).map_err(malformed)?;
    debug!(
        path = %path.display(),
        bytes = bytes.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "[REGISTRY] artifact parsed"
    );
    Ok(parsed)
}
