// Comparison Logic
// Compares the verdict before and after a rewrite

use serde::Serialize;

use crate::models::{Axis, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct LabelShift {
    pub label: &'static str,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AxisComparison {
    pub axis: &'static str,
    pub before_label: &'static str,
    pub after_label: &'static str,
    pub flipped: bool,
    pub shifts: Vec<LabelShift>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerdictComparison {
    pub axes: Vec<AxisComparison>,
}

impl VerdictComparison {
    pub fn axis(&self, axis: Axis) -> Option<&AxisComparison> {
        self.axes.iter().find(|a| a.axis == axis.name())
    }

    /// Change in P(ai); negative means the rewrite reads as more human.
    pub fn ai_probability_shift(&self) -> f64 {
        self.axis(Axis::AiVsHuman)
            .and_then(|a| a.shifts.iter().find(|s| s.label == "ai"))
            .map(|s| s.delta)
            .unwrap_or(0.0)
    }

    pub fn flipped_axes(&self) -> Vec<&'static str> {
        self.axes.iter().filter(|a| a.flipped).map(|a| a.axis).collect()
    }
}

/// Compare two verdicts axis by axis
pub fn compare_verdicts(before: &Verdict, after: &Verdict) -> VerdictComparison {
    let axes = Axis::ALL
        .iter()
        .map(|axis| {
            let b = before.get(*axis);
            let a = after.get(*axis);
            let shifts = b
                .distribution()
                .iter()
                .zip(a.distribution().iter())
                .map(|((label, p_before), (_, p_after))| LabelShift {
                    label,
                    before: p_before,
                    after: p_after,
                    delta: p_after - p_before,
                })
                .collect();
            AxisComparison {
                axis: axis.name(),
                before_label: b.predicted_label(),
                after_label: a.predicted_label(),
                flipped: b.predicted_label() != a.predicted_label(),
                shifts,
            }
        })
        .collect();

    VerdictComparison { axes }
}
