// Verdict rendering for the console

use std::fmt::Write;

use crate::models::Verdict;
use crate::services::comparison::VerdictComparison;

pub fn render_verdict(verdict: &Verdict) -> String {
    let mut out = String::new();
    for v in verdict.iter() {
        let _ = writeln!(out, "\n{}:", v.axis().name().to_uppercase());
        let _ = writeln!(out, "  Prediction: {}", v.predicted_label());
        for (label, p) in v.distribution().iter() {
            let _ = writeln!(out, "  P({}) = {:.3}", label, p);
        }
    }
    out
}

pub fn render_comparison(comparison: &VerdictComparison) -> String {
    let mut out = String::new();
    for axis in &comparison.axes {
        let marker = if axis.flipped { "changed" } else { "unchanged" };
        let _ = writeln!(
            out,
            "  {:<12} {} -> {} ({})",
            axis.axis, axis.before_label, axis.after_label, marker
        );
        for shift in &axis.shifts {
            let _ = writeln!(
                out,
                "    P({}) {:.3} -> {:.3} ({:+.3})",
                shift.label, shift.before, shift.after, shift.delta
            );
        }
    }
    out
}
