// Test fixtures: a small but complete artifact set written to a temp directory

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use super::registry::{
    AI_VS_HUMAN_ARTIFACT, FORMALITY_ARTIFACT, SENTIMENT_NETWORK_ARTIFACT,
    SENTIMENT_VECTORIZER_ARTIFACT,
};
use super::{ModelBundle, ModelRegistry};

const SENTIMENT_TERMS: &[&str] = &["love", "great", "wonderful", "hate", "terrible", "awful", "this"];
const FORMALITY_TERMS: &[&str] = &["hey", "gonna", "lol", "therefore", "regards", "sincerely"];
const AI_TERMS: &[&str] = &["delve", "furthermore", "moreover", "tapestry", "lol", "honestly", "gonna"];

fn vocabulary(terms: &[&str]) -> Value {
    let map: serde_json::Map<String, Value> = terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), json!(i)))
        .collect();
    Value::Object(map)
}

fn vectorizer(terms: &[&str]) -> Value {
    let idf = vec![1.0; terms.len()];
    json!({
        "vocabulary": vocabulary(terms),
        "idf": idf,
        "lowercase": true,
        "ngram_range": [1, 1],
        "norm": "l2"
    })
}

pub fn sentiment_network() -> Value {
    // Hidden unit 0 fires on positive words, unit 1 on negative words.
    let weights: Vec<Vec<f64>> = SENTIMENT_TERMS
        .iter()
        .map(|t| match *t {
            "love" | "great" | "wonderful" => vec![1.0, 0.0],
            "hate" | "terrible" | "awful" => vec![0.0, 1.0],
            _ => vec![0.0, 0.0],
        })
        .collect();
    json!({
        "format_version": 1,
        "layers": [
            {"type": "dense", "weights": weights, "bias": [0.0, 0.0], "activation": "relu"},
            {"type": "dropout", "rate": 0.3},
            {"type": "dense", "weights": [[4.0], [-4.0]], "bias": [0.0], "activation": "sigmoid"}
        ]
    })
}

pub fn sentiment_vectorizer() -> Value {
    json!({ "format_version": 1, "vectorizer": vectorizer(SENTIMENT_TERMS) })
}

pub fn formality_model() -> Value {
    json!({
        "format_version": 1,
        "vectorizer": vectorizer(FORMALITY_TERMS),
        "classifier": {
            "coef": [[-3.0, -3.0, -3.0, 3.0, 3.0, 3.0]],
            "intercept": [0.0]
        }
    })
}

pub fn ai_vs_human_model() -> Value {
    json!({
        "format_version": 1,
        "vectorizer": vectorizer(AI_TERMS),
        "classifier": {
            "coef": [[3.0, 3.0, 3.0, 3.0, -3.0, -3.0, -3.0]],
            "intercept": [0.0]
        }
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) {
    fs::write(dir.join(name), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Write the full artifact set into `dir`.
pub fn write_artifacts(dir: &Path) {
    write_json(dir, SENTIMENT_NETWORK_ARTIFACT, &sentiment_network());
    write_json(dir, SENTIMENT_VECTORIZER_ARTIFACT, &sentiment_vectorizer());
    write_json(dir, FORMALITY_ARTIFACT, &formality_model());
    write_json(dir, AI_VS_HUMAN_ARTIFACT, &ai_vs_human_model());
}

pub fn artifact_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    dir
}

pub fn bundle() -> ModelBundle {
    let dir = artifact_dir();
    ModelRegistry::new(dir.path()).load().unwrap()
}
