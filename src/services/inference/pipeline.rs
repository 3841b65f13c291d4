// Analysis Pipeline
// Runs every axis model over one text and assembles the Verdict

use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use super::registry::ModelBundle;
use super::ModelError;
use crate::models::{Axis, Verdict};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{axis} analysis failed: {source}")]
pub struct AnalysisError {
    pub axis: Axis,
    #[source]
    pub source: ModelError,
}

/// Analyze `text` on all three axes.
///
/// Axes are independent and read the bundle immutably, so a failure on one
/// call leaves the bundle usable for the next.
pub fn analyze(text: &str, bundle: &ModelBundle) -> Result<Verdict, AnalysisError> {
    let start = Instant::now();

    let run = |axis: Axis| {
        bundle
            .get(axis)
            .predict(text)
            .map_err(|source| AnalysisError { axis, source })
    };

    let sentiment = run(Axis::Sentiment)?;
    let formality = run(Axis::Formality)?;
    let ai_vs_human = run(Axis::AiVsHuman)?;

    for v in [&sentiment, &formality, &ai_vs_human] {
        debug!(
            axis = v.axis().name(),
            label = v.predicted_label(),
            confidence = v.confidence(),
            "[ANALYSIS] axis scored"
        );
    }

    let verdict = Verdict::new(sentiment, formality, ai_vs_human).map_err(|source| AnalysisError {
        axis: Axis::Sentiment,
        source,
    })?;

    info!(
        chars = text.chars().count(),
        sentiment = verdict.get(Axis::Sentiment).predicted_label(),
        formality = verdict.get(Axis::Formality).predicted_label(),
        ai_vs_human = verdict.get(Axis::AiVsHuman).predicted_label(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "[ANALYSIS] verdict ready"
    );

    Ok(verdict)
}
