use crate::models::{CombinedMetric, CombinedMetrics, YearData, METRIC_COLUMNS};

/// Evaluation label counted towards points
pub const PASS_MARKER: &str = "✅";

/// Comparatives value when there are strong evaluations and no weak ones
pub const COMPARATIVES_SENTINEL: f64 = 1_000_000.0;

const STRONG: &str = "Strong";
const WEAK: &str = "Weak";

/// Scoring fields derived from one year of fundamentals
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedScores {
    pub combined: CombinedMetrics,
    pub strong: u32,
    pub weak: u32,
    pub points: u32,
    pub comparatives: Option<f64>,
}

pub fn derive_scores(year: &YearData) -> DerivedScores {
    let combined: CombinedMetrics = METRIC_COLUMNS
        .iter()
        .map(|metric| {
            let value = year.metrics.get(*metric).copied().flatten();
            let evaluation = year.evaluations.get(*metric).cloned().flatten();
            (metric.to_string(), CombinedMetric { value, evaluation })
        })
        .collect();

    let labels = || combined.values().filter_map(|m| m.evaluation.as_deref());
    let strong = labels().filter(|l| *l == STRONG).count() as u32;
    let weak = labels().filter(|l| *l == WEAK).count() as u32;
    let points = labels().filter(|l| *l == PASS_MARKER).count() as u32;

    DerivedScores {
        combined,
        strong,
        weak,
        points,
        comparatives: comparatives(strong, weak),
    }
}

pub fn comparatives(strong: u32, weak: u32) -> Option<f64> {
    if weak > 0 {
        Some(strong as f64 / weak as f64 * 100.0)
    } else if strong > 0 {
        Some(COMPARATIVES_SENTINEL)
    } else {
        None
    }
}
