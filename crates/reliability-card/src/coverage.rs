//! Coverage sweep: how accuracy changes as low-confidence instances are abstained on.

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    labels::LabelSpace,
    metrics::{self, linspace},
    probability::ProbabilityMatrix,
};

/// Default number of thresholds scanned by the sweep.
pub const DEFAULT_THRESHOLD_COUNT: usize = 40;

/// Default highest threshold scanned by the sweep.
pub const DEFAULT_MAX_THRESHOLD: f64 = 0.99;

/// Metrics for the instances retained at one confidence threshold.
///
/// `accuracy` and `macro_f1` are `None` when no instance reaches the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageCurvePoint {
    pub threshold: f64,
    pub coverage: f64,
    pub accuracy: Option<f64>,
    pub macro_f1: Option<f64>,
}

impl CoverageCurvePoint {
    /// Whether the point retained at least one instance.
    #[must_use]
    pub fn has_metrics(&self) -> bool {
        self.accuracy.is_some() && self.macro_f1.is_some()
    }
}

/// The default sweep grid: 40 thresholds evenly spaced over `[0, 0.99]`.
#[must_use]
pub fn default_thresholds() -> Vec<f64> {
    linspace(0.0, DEFAULT_MAX_THRESHOLD, DEFAULT_THRESHOLD_COUNT)
}

/// Evaluate each threshold on the instances whose confidence is `>= threshold`.
///
/// Retained subsets keep the global label indices, so per-class scores are
/// comparable across thresholds.
pub fn coverage_curve(
    y_true: &[usize],
    proba: &ProbabilityMatrix,
    labels: &LabelSpace,
    thresholds: &[f64],
) -> Result<Vec<CoverageCurvePoint>> {
    metrics::check_alignment(y_true, proba, labels)?;

    let predictions = proba.predictions();
    let confidences = proba.confidences();
    let n = y_true.len();

    thresholds
        .iter()
        .map(|&threshold| -> Result<CoverageCurvePoint> {
            let (kept_true, kept_pred): (Vec<usize>, Vec<usize>) = confidences
                .iter()
                .zip(y_true.iter().zip(&predictions))
                .filter(|(conf, _)| **conf >= threshold)
                .map(|(_, (&truth, &pred))| (truth, pred))
                .unzip();

            let coverage = if n == 0 {
                0.0
            } else {
                kept_true.len() as f64 / n as f64
            };

            if kept_true.is_empty() {
                return Ok(CoverageCurvePoint {
                    threshold,
                    coverage,
                    accuracy: None,
                    macro_f1: None,
                });
            }

            Ok(CoverageCurvePoint {
                threshold,
                coverage,
                accuracy: Some(metrics::accuracy(&kept_true, &kept_pred)?),
                macro_f1: Some(metrics::macro_f1(&kept_true, &kept_pred, labels.len())?),
            })
        })
        .collect()
}
