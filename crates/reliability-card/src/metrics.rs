//! Calibration and classification metrics over a [`ProbabilityMatrix`].
//!
//! - **Expected Calibration Error (ECE)**: weighted average of the per-bin gap
//!   between mean confidence and accuracy.
//! - **Brier score**: mean squared distance between the probability row and the
//!   one-hot truth, in `[0, 2]`.
//! - **Accuracy / macro-F1 / confusion matrix** over `(true, argmax)` pairs.
//!
//! Confidence bins are equal-width over `[0, 1]`. Bin `i` holds confidences in
//! `(lo, hi]`, except the first bin which is closed on both ends so that a
//! confidence of exactly `0.0` is counted.

use serde::{Deserialize, Serialize};

use crate::{
    error::{ReportCardError, Result},
    labels::LabelSpace,
    probability::ProbabilityMatrix,
};

/// Default number of ECE / reliability bins.
pub const DEFAULT_CALIBRATION_BINS: usize = 10;

/// Default number of confidence histogram bins.
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// Headline metrics for one evaluated split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub ece: f64,
    pub brier: f64,
    pub labels: Vec<String>,
    /// K×K counts, rows are true labels and columns predicted labels.
    pub confusion_matrix: Vec<Vec<usize>>,
}

/// One populated bin of a reliability diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_confidence: f64,
    pub accuracy: f64,
    /// `|accuracy - mean_confidence|`
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// `num` evenly spaced values over `[start, stop]`, endpoint included.
///
/// Values are computed as `start + i * step` with the last value pinned to
/// `stop`, so bin edges and sweep thresholds are reproducible bit for bit.
#[must_use]
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut values = (0..num).map(|i| start + i as f64 * step).collect::<Vec<_>>();
            values[num - 1] = stop;
            values
        }
    }
}

/// Check that labels and probabilities describe the same instances and label space.
pub fn check_alignment(
    y_true: &[usize],
    proba: &ProbabilityMatrix,
    labels: &LabelSpace,
) -> Result<()> {
    if proba.n_classes() != labels.len() {
        return Err(ReportCardError::LabelSpaceMismatch {
            expected: labels.len(),
            found: proba.n_classes(),
        });
    }
    if y_true.len() != proba.n_rows() {
        return Err(ReportCardError::length_mismatch(
            "true labels vs probability rows",
            proba.n_rows(),
            y_true.len(),
        ));
    }
    if let Some(&index) = y_true.iter().find(|&&idx| idx >= labels.len()) {
        return Err(ReportCardError::LabelIndexOutOfRange {
            index,
            n_labels: labels.len(),
        });
    }
    Ok(())
}

/// Compute accuracy, macro-F1, ECE, Brier score and the confusion matrix.
pub fn evaluate(
    y_true: &[usize],
    proba: &ProbabilityMatrix,
    labels: &LabelSpace,
    n_bins: usize,
) -> Result<OverallMetrics> {
    check_alignment(y_true, proba, labels)?;
    if y_true.is_empty() {
        return Err(ReportCardError::EmptyEvaluation);
    }
    if n_bins == 0 {
        return Err(ReportCardError::InvalidConfig(
            "calibration bins must be at least 1".to_owned(),
        ));
    }

    let y_pred = proba.predictions();
    Ok(OverallMetrics {
        accuracy: accuracy(y_true, &y_pred)?,
        macro_f1: macro_f1(y_true, &y_pred, labels.len())?,
        ece: expected_calibration_error(y_true, proba, n_bins),
        brier: multiclass_brier(y_true, proba),
        labels: labels.labels().to_vec(),
        confusion_matrix: confusion_matrix(y_true, &y_pred, labels.len())?,
    })
}

/// Label pairs must line up and every index must be a valid class.
fn check_pairs(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ReportCardError::length_mismatch(
            "predicted labels vs true labels",
            y_true.len(),
            y_pred.len(),
        ));
    }
    if let Some(&index) = y_true.iter().chain(y_pred).find(|&&idx| idx >= n_classes) {
        return Err(ReportCardError::LabelIndexOutOfRange {
            index,
            n_labels: n_classes,
        });
    }
    Ok(())
}

/// Fraction of matching pairs; `0.0` for empty input.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(ReportCardError::length_mismatch(
            "predicted labels vs true labels",
            y_true.len(),
            y_pred.len(),
        ));
    }
    if y_true.is_empty() {
        return Ok(0.0);
    }
    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|(truth, pred)| truth == pred)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Unweighted mean of per-class F1.
///
/// Only classes that occur among the true or predicted labels are averaged,
/// so a subset that never touches a class is not penalized for it. A class
/// with no true positives scores 0.
pub fn macro_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Result<f64> {
    check_pairs(y_true, y_pred, n_classes)?;
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut fn_count = vec![0usize; n_classes];

    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        if truth == pred {
            tp[truth] += 1;
        } else {
            fp[pred] += 1;
            fn_count[truth] += 1;
        }
    }

    let scores = (0..n_classes)
        .filter(|&k| tp[k] + fp[k] + fn_count[k] > 0)
        .map(|k| {
            let denom = 2 * tp[k] + fp[k] + fn_count[k];
            2.0 * tp[k] as f64 / denom as f64
        })
        .collect::<Vec<_>>();

    if scores.is_empty() {
        Ok(0.0)
    } else {
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// K×K counts, rows are true labels and columns predicted labels.
pub fn confusion_matrix(
    y_true: &[usize],
    y_pred: &[usize],
    n_classes: usize,
) -> Result<Vec<Vec<usize>>> {
    check_pairs(y_true, y_pred, n_classes)?;
    let mut matrix = vec![vec![0usize; n_classes]; n_classes];
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        matrix[truth][pred] += 1;
    }
    Ok(matrix)
}

fn bin_index(confidence: f64, edges: &[f64]) -> Option<usize> {
    let n_bins = edges.len().saturating_sub(1);
    (0..n_bins).find(|&i| {
        let (lo, hi) = (edges[i], edges[i + 1]);
        if i == 0 {
            confidence >= lo && confidence <= hi
        } else {
            confidence > lo && confidence <= hi
        }
    })
}

/// Populated reliability bins; empty bins are omitted.
#[must_use]
pub fn reliability_bins(
    y_true: &[usize],
    proba: &ProbabilityMatrix,
    n_bins: usize,
) -> Vec<ReliabilityBin> {
    let edges = linspace(0.0, 1.0, n_bins + 1);
    let predictions = proba.predictions();
    let confidences = proba.confidences();

    let mut counts = vec![0usize; n_bins];
    let mut conf_sums = vec![0.0f64; n_bins];
    let mut correct = vec![0usize; n_bins];

    for ((&truth, &pred), &conf) in y_true.iter().zip(&predictions).zip(&confidences) {
        if let Some(bin) = bin_index(conf, &edges) {
            counts[bin] += 1;
            conf_sums[bin] += conf;
            if truth == pred {
                correct[bin] += 1;
            }
        }
    }

    (0..n_bins)
        .filter(|&i| counts[i] > 0)
        .map(|i| {
            let mean_confidence = conf_sums[i] / counts[i] as f64;
            let accuracy = correct[i] as f64 / counts[i] as f64;
            ReliabilityBin {
                lower: edges[i],
                upper: edges[i + 1],
                count: counts[i],
                mean_confidence,
                accuracy,
                gap: (accuracy - mean_confidence).abs(),
            }
        })
        .collect()
}

/// Expected calibration error with `n_bins` equal-width confidence bins.
#[must_use]
pub fn expected_calibration_error(
    y_true: &[usize],
    proba: &ProbabilityMatrix,
    n_bins: usize,
) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    reliability_bins(y_true, proba, n_bins)
        .iter()
        .map(|bin| (bin.count as f64 / n as f64) * bin.gap)
        .sum()
}

/// Mean squared Euclidean distance between probability rows and one-hot truth.
#[must_use]
pub fn multiclass_brier(y_true: &[usize], proba: &ProbabilityMatrix) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let total: f64 = y_true
        .iter()
        .enumerate()
        .map(|(row_idx, &truth)| {
            proba
                .row(row_idx)
                .iter()
                .enumerate()
                .map(|(k, &p)| {
                    let target = if k == truth { 1.0 } else { 0.0 };
                    (p - target).powi(2)
                })
                .sum::<f64>()
        })
        .sum();
    total / y_true.len() as f64
}

/// Histogram of confidences over `n_bins` equal-width bins on `[0, 1]`; the
/// last bin is closed on the right.
#[must_use]
pub fn confidence_histogram(confidences: &[f64], n_bins: usize) -> Vec<HistogramBin> {
    let edges = linspace(0.0, 1.0, n_bins + 1);
    let mut counts = vec![0usize; n_bins];
    for &conf in confidences {
        if n_bins == 0 || !(0.0..=1.0).contains(&conf) {
            continue;
        }
        let bin = ((conf * n_bins as f64) as usize).min(n_bins - 1);
        counts[bin] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: edges[i],
            upper: edges[i + 1],
            count,
        })
        .collect()
}
