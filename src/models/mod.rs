// Content Forensics Data Models
// Axis labels, per-axis verdicts and transformation requests

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::services::inference::ModelError;

/// Maximum deviation of a distribution's total from 1.0.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// Probabilities this far outside [0, 1] are floating-point noise and get clamped.
const CLAMP_EPSILON: f64 = 1e-9;

// ============ Axis ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Axis {
    Sentiment,
    Formality,
    AiVsHuman,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Sentiment, Axis::Formality, Axis::AiVsHuman];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Sentiment => "sentiment",
            Axis::Formality => "formality",
            Axis::AiVsHuman => "ai_vs_human",
        }
    }

    /// Fixed label order. Index order is also the tie-break order.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Axis::Sentiment => &["negative", "positive"],
            Axis::Formality => &["informal", "formal"],
            Axis::AiVsHuman => &["human", "ai"],
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sentiment" => Ok(Axis::Sentiment),
            "formality" => Ok(Axis::Formality),
            "ai_vs_human" | "ai-vs-human" => Ok(Axis::AiVsHuman),
            other => Err(format!("unknown axis: {}", other)),
        }
    }
}

// ============ Label Distribution ============

#[derive(Debug, Clone, PartialEq)]
pub struct LabelDistribution {
    labels: &'static [&'static str],
    probabilities: Vec<f64>,
}

impl LabelDistribution {
    /// Build a distribution over `labels`, one probability per label in the same order.
    pub fn new(labels: &'static [&'static str], probabilities: Vec<f64>) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::inference("label set is empty"));
        }
        if probabilities.len() != labels.len() {
            return Err(ModelError::inference(format!(
                "expected {} probabilities for labels {:?}, got {}",
                labels.len(),
                labels,
                probabilities.len()
            )));
        }

        let mut checked = Vec::with_capacity(probabilities.len());
        for (label, p) in labels.iter().zip(probabilities) {
            if !p.is_finite() {
                return Err(ModelError::inference(format!("non-finite probability for '{}'", label)));
            }
            if p < -CLAMP_EPSILON || p > 1.0 + CLAMP_EPSILON {
                return Err(ModelError::inference(format!(
                    "probability for '{}' out of range: {}",
                    label, p
                )));
            }
            checked.push(p.clamp(0.0, 1.0));
        }

        let total: f64 = checked.iter().sum();
        if (total - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(ModelError::inference(format!(
                "probabilities sum to {:.9}, expected 1.0",
                total
            )));
        }

        Ok(Self {
            labels,
            probabilities: checked,
        })
    }

    pub fn labels(&self) -> &'static [&'static str] {
        self.labels
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| *l == label)
            .map(|i| self.probabilities[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.labels.iter().copied().zip(self.probabilities.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Index of the highest probability; the earliest label wins an exact tie.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.probabilities.iter().enumerate().skip(1) {
            if *p > self.probabilities[best] {
                best = i;
            }
        }
        best
    }
}

impl Serialize for LabelDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.labels.len()))?;
        for (label, p) in self.iter() {
            map.serialize_entry(label, &p)?;
        }
        map.end()
    }
}

// ============ Verdicts ============

#[derive(Debug, Clone, PartialEq)]
pub struct AxisVerdict {
    axis: Axis,
    predicted_label: &'static str,
    distribution: LabelDistribution,
}

impl AxisVerdict {
    pub fn from_distribution(axis: Axis, distribution: LabelDistribution) -> Result<Self, ModelError> {
        let index = distribution.argmax();
        Self::with_prediction(axis, distribution, index)
    }

    /// Verdict whose label was picked by the classifier's own decision rule.
    /// The chosen label must still carry the highest probability.
    pub fn with_prediction(axis: Axis, distribution: LabelDistribution, index: usize) -> Result<Self, ModelError> {
        if distribution.labels() != axis.labels() {
            return Err(ModelError::inference(format!(
                "distribution labels {:?} do not match {} labels {:?}",
                distribution.labels(),
                axis,
                axis.labels()
            )));
        }
        let chosen = match distribution.probabilities().get(index) {
            Some(p) => *p,
            None => {
                return Err(ModelError::inference(format!(
                    "predicted index {} outside {} labels",
                    index, axis
                )))
            }
        };
        if chosen < distribution.probabilities()[distribution.argmax()] {
            return Err(ModelError::inference(format!(
                "predicted label '{}' is not the most probable {} label",
                distribution.labels()[index],
                axis
            )));
        }
        let predicted_label = distribution.labels()[index];
        Ok(Self {
            axis,
            predicted_label,
            distribution,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn predicted_label(&self) -> &'static str {
        self.predicted_label
    }

    pub fn distribution(&self) -> &LabelDistribution {
        &self.distribution
    }

    /// Probability of the predicted label.
    pub fn confidence(&self) -> f64 {
        self.distribution.get(self.predicted_label).unwrap_or(0.0)
    }
}

impl Serialize for AxisVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("AxisVerdict", 2)?;
        st.serialize_field("predicted_label", self.predicted_label)?;
        st.serialize_field("distribution", &self.distribution)?;
        st.end()
    }
}

/// Result of one analysis call: one verdict per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    sentiment: AxisVerdict,
    formality: AxisVerdict,
    ai_vs_human: AxisVerdict,
}

impl Verdict {
    pub fn new(sentiment: AxisVerdict, formality: AxisVerdict, ai_vs_human: AxisVerdict) -> Result<Self, ModelError> {
        for (expected, got) in [
            (Axis::Sentiment, sentiment.axis()),
            (Axis::Formality, formality.axis()),
            (Axis::AiVsHuman, ai_vs_human.axis()),
        ] {
            if expected != got {
                return Err(ModelError::inference(format!(
                    "verdict slot {} received a {} result",
                    expected, got
                )));
            }
        }
        Ok(Self {
            sentiment,
            formality,
            ai_vs_human,
        })
    }

    pub fn get(&self, axis: Axis) -> &AxisVerdict {
        match axis {
            Axis::Sentiment => &self.sentiment,
            Axis::Formality => &self.formality,
            Axis::AiVsHuman => &self.ai_vs_human,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisVerdict> + '_ {
        Axis::ALL.into_iter().map(move |axis| self.get(axis))
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Axis::ALL.len()))?;
        for verdict in self.iter() {
            map.serialize_entry(verdict.axis().name(), verdict)?;
        }
        map.end()
    }
}

// ============ Transformation ============

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransformMode {
    Explain,
    Humanize,
    Adversarial,
}

impl TransformMode {
    pub fn name(&self) -> &'static str {
        match self {
            TransformMode::Explain => "explain",
            TransformMode::Humanize => "humanize",
            TransformMode::Adversarial => "adversarial",
        }
    }

    /// Whether the output is a rewrite of the source text (and worth re-analysing).
    pub fn is_rewrite(&self) -> bool {
        !matches!(self, TransformMode::Explain)
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explain" => Ok(TransformMode::Explain),
            "humanize" | "humanise" => Ok(TransformMode::Humanize),
            "adversarial" | "attack" => Ok(TransformMode::Adversarial),
            other => Err(format!("unknown transform mode: {}", other)),
        }
    }
}

/// One operator action against the generative service. Consumed once.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub id: Uuid,
    pub source_text: String,
    pub prior_verdict: Verdict,
    pub mode: TransformMode,
}

impl TransformRequest {
    pub fn new(source_text: impl Into<String>, prior_verdict: Verdict, mode: TransformMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_text: source_text.into(),
            prior_verdict,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict_for(axis: Axis, probs: Vec<f64>) -> AxisVerdict {
        let dist = LabelDistribution::new(axis.labels(), probs).unwrap();
        AxisVerdict::from_distribution(axis, dist).unwrap()
    }

    #[test]
    fn test_distribution_rejects_bad_sum() {
        let err = LabelDistribution::new(Axis::Sentiment.labels(), vec![0.3, 0.3]).unwrap_err();
        assert!(matches!(err, ModelError::Inference { .. }));
    }

    #[test]
    fn test_distribution_rejects_wrong_arity() {
        assert!(LabelDistribution::new(Axis::Formality.labels(), vec![1.0]).is_err());
        assert!(LabelDistribution::new(Axis::Formality.labels(), vec![0.2, 0.3, 0.5]).is_err());
    }

    #[test]
    fn test_distribution_rejects_nan() {
        assert!(LabelDistribution::new(Axis::AiVsHuman.labels(), vec![f64::NAN, 0.5]).is_err());
    }

    #[test]
    fn test_argmax_tie_prefers_first_label() {
        let v = verdict_for(Axis::Sentiment, vec![0.5, 0.5]);
        assert_eq!(v.predicted_label(), "negative");

        let v = verdict_for(Axis::AiVsHuman, vec![0.5, 0.5]);
        assert_eq!(v.predicted_label(), "human");
    }

    #[test]
    fn test_with_prediction_accepts_tied_label() {
        let dist = LabelDistribution::new(Axis::Sentiment.labels(), vec![0.5, 0.5]).unwrap();
        let v = AxisVerdict::with_prediction(Axis::Sentiment, dist, 1).unwrap();
        assert_eq!(v.predicted_label(), "positive");
    }

    #[test]
    fn test_with_prediction_rejects_less_probable_label() {
        let dist = LabelDistribution::new(Axis::Sentiment.labels(), vec![0.7, 0.3]).unwrap();
        assert!(AxisVerdict::with_prediction(Axis::Sentiment, dist.clone(), 1).is_err());
        assert!(AxisVerdict::with_prediction(Axis::Sentiment, dist, 2).is_err());
    }

    #[test]
    fn test_argmax_picks_highest() {
        let v = verdict_for(Axis::Formality, vec![0.2, 0.8]);
        assert_eq!(v.predicted_label(), "formal");
        assert!((v.confidence() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_verdict_rejects_misplaced_axis() {
        let s = verdict_for(Axis::Sentiment, vec![0.1, 0.9]);
        let f = verdict_for(Axis::Formality, vec![0.1, 0.9]);
        let a = verdict_for(Axis::AiVsHuman, vec![0.1, 0.9]);
        assert!(Verdict::new(f.clone(), s.clone(), a.clone()).is_err());
        assert!(Verdict::new(s, f, a).is_ok());
    }

    #[test]
    fn test_verdict_serialization_shape() {
        let verdict = Verdict::new(
            verdict_for(Axis::Sentiment, vec![0.25, 0.75]),
            verdict_for(Axis::Formality, vec![0.6, 0.4]),
            verdict_for(Axis::AiVsHuman, vec![0.1, 0.9]),
        )
        .unwrap();

        let json: serde_json::Value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["sentiment"]["predicted_label"], "positive");
        assert_eq!(json["formality"]["predicted_label"], "informal");
        assert_eq!(json["ai_vs_human"]["distribution"]["ai"], 0.9);
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_transform_mode_parsing() {
        assert_eq!("Explain".parse::<TransformMode>().unwrap(), TransformMode::Explain);
        assert_eq!("attack".parse::<TransformMode>().unwrap(), TransformMode::Adversarial);
        assert!("summarize".parse::<TransformMode>().is_err());
        assert!(!TransformMode::Explain.is_rewrite());
        assert!(TransformMode::Humanize.is_rewrite());
    }
}
