// Feature Vectorizer
// Restores a fitted TF-IDF / count vectorizer and turns text into sparse feature vectors

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use super::ModelError;

/// Word tokens of two or more characters.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

// ============ Feature Vector ============

/// Sparse feature row: fixed dimension plus (column, value) entries sorted by column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    dimension: usize,
    entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    pub fn zeros(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(dimension: usize, mut entries: Vec<(usize, f64)>) -> Result<Self, ModelError> {
        entries.sort_by_key(|(idx, _)| *idx);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (idx, value) in entries {
            if idx >= dimension {
                return Err(ModelError::dimension_mismatch(dimension, idx + 1));
            }
            match merged.last_mut() {
                Some((last, acc)) if *last == idx => *acc += value,
                _ => merged.push((idx, value)),
            }
        }
        Ok(Self {
            dimension,
            entries: merged,
        })
    }

    pub fn from_dense(values: Vec<f64>) -> Self {
        let dimension = values.len();
        let entries = values
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v != 0.0)
            .collect();
        Self { dimension, entries }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, v)| *v == 0.0)
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dimension];
        for (idx, value) in &self.entries {
            dense[*idx] = *value;
        }
        dense
    }

    /// Dot product with a dense weight row of the same dimension.
    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|(idx, value)| weights.get(*idx).copied().unwrap_or(0.0) * value)
            .sum()
    }
}

// ============ Vectorizer Contract ============

pub trait FeatureVectorizer: Send + Sync + fmt::Debug {
    /// Width of every vector produced by `transform`.
    fn dimension(&self) -> usize;

    /// Vectorize one document. Never mutates fitted state.
    fn transform(&self, text: &str) -> Result<FeatureVector, ModelError>;
}

// ============ Fitted Artifact ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// On-disk form of a fitted vectorizer.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorizerArtifact {
    pub vocabulary: HashMap<String, usize>,
    /// Absent for plain count vectorizers.
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub token_pattern: Option<String>,
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
}

fn default_true() -> bool { true }
fn default_ngram_range() -> (usize, usize) { (1, 1) }
fn default_norm() -> Option<Norm> { Some(Norm::L2) }

// ============ TF-IDF Vectorizer ============

pub struct TfidfVectorizer {
    name: String,
    vocabulary: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    dimension: usize,
    lowercase: bool,
    ngram_range: (usize, usize),
    token_re: Regex,
    stop_words: HashSet<String>,
    binary: bool,
    sublinear_tf: bool,
    norm: Option<Norm>,
}

impl fmt::Debug for TfidfVectorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TfidfVectorizer")
            .field("name", &self.name)
            .field("vocabulary_size", &self.vocabulary.len())
            .field("dimension", &self.dimension)
            .field("ngram_range", &self.ngram_range)
            .field("use_idf", &self.idf.is_some())
            .field("norm", &self.norm)
            .finish()
    }
}

impl TfidfVectorizer {
    /// Validate fitted state and build the vectorizer. `name` identifies it in errors.
    pub fn from_artifact(name: &str, artifact: VectorizerArtifact) -> Result<Self, ModelError> {
        let incompatible = |reason: String| ModelError::incompatible(name, reason);

        if artifact.vocabulary.is_empty() {
            return Err(incompatible("vocabulary is empty".to_string()));
        }

        let dimension = match &artifact.idf {
            Some(idf) => {
                if idf.len() < artifact.vocabulary.len() {
                    return Err(incompatible(format!(
                        "idf has {} weights for {} vocabulary terms",
                        idf.len(),
                        artifact.vocabulary.len()
                    )));
                }
                if let Some(pos) = idf.iter().position(|w| !w.is_finite()) {
                    return Err(incompatible(format!("idf weight {} is not finite", pos)));
                }
                idf.len()
            }
            None => artifact.vocabulary.len(),
        };

        let mut seen = HashSet::with_capacity(artifact.vocabulary.len());
        for (term, idx) in &artifact.vocabulary {
            if *idx >= dimension {
                return Err(incompatible(format!(
                    "term '{}' maps to column {} outside dimension {}",
                    term, idx, dimension
                )));
            }
            if !seen.insert(*idx) {
                return Err(incompatible(format!("column {} assigned to more than one term", idx)));
            }
        }

        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(incompatible(format!("invalid ngram_range ({}, {})", min_n, max_n)));
        }

        let pattern = artifact
            .token_pattern
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_PATTERN);
        let token_re = Regex::new(pattern)
            .map_err(|e| incompatible(format!("token_pattern does not compile: {}", e)))?;

        let stop_words = artifact
            .stop_words
            .unwrap_or_default()
            .into_iter()
            .map(|w| if artifact.lowercase { w.to_lowercase() } else { w })
            .collect();

        Ok(Self {
            name: name.to_string(),
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            dimension,
            lowercase: artifact.lowercase,
            ngram_range: artifact.ngram_range,
            token_re,
            stop_words,
            binary: artifact.binary,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn tokenize<'a>(&self, doc: &'a str) -> Vec<&'a str> {
        self.token_re
            .find_iter(doc)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect()
    }

    fn count_terms(&self, tokens: &[&str]) -> BTreeMap<usize, f64> {
        let mut counts = BTreeMap::new();
        let (min_n, max_n) = self.ngram_range;

        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            if n == 1 {
                for token in tokens {
                    if let Some(&idx) = self.vocabulary.get(*token) {
                        *counts.entry(idx).or_insert(0.0) += 1.0;
                    }
                }
            } else {
                for window in tokens.windows(n) {
                    if let Some(&idx) = self.vocabulary.get(&window.join(" ")) {
                        *counts.entry(idx).or_insert(0.0) += 1.0;
                    }
                }
            }
        }

        counts
    }
}

impl FeatureVectorizer for TfidfVectorizer {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn transform(&self, text: &str) -> Result<FeatureVector, ModelError> {
        if text.is_empty() {
            return Ok(FeatureVector::zeros(self.dimension));
        }

        let doc = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens = self.tokenize(&doc);
        let counts = self.count_terms(&tokens);

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| {
                let mut value = if self.binary { 1.0 } else { tf };
                if self.sublinear_tf {
                    value = 1.0 + value.ln();
                }
                if let Some(idf) = &self.idf {
                    value *= idf[idx];
                }
                (idx, value)
            })
            .collect();

        let norm = match self.norm {
            Some(Norm::L2) => entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => entries.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            None => 1.0,
        };
        if norm > 0.0 && norm != 1.0 {
            for (_, value) in entries.iter_mut() {
                *value /= norm;
            }
        }

        FeatureVector::from_entries(self.dimension, entries)
    }
}
