use ndarray::{Array2, ArrayView1, Axis};

use crate::error::{ReportCardError, Result};

/// Tolerance for a probability row summing to one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// N×K matrix of per-class probabilities, one row per instance.
///
/// Every row sums to one within [`ROW_SUM_TOLERANCE`] and every entry lies in
/// `[0, 1]`. Predictions and confidences are derived from the rows on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    values: Array2<f64>,
}

impl ProbabilityMatrix {
    /// Validate and wrap a probability matrix.
    pub fn new(values: Array2<f64>) -> Result<Self> {
        for (row_idx, row) in values.outer_iter().enumerate() {
            if let Some(bad) = row.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                return Err(ReportCardError::InvalidProbabilityRow {
                    row: row_idx,
                    reason: format!("entry {bad} is outside [0, 1]"),
                });
            }
            let sum = row.sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ReportCardError::InvalidProbabilityRow {
                    row: row_idx,
                    reason: format!("row sums to {sum}"),
                });
            }
        }
        Ok(Self { values })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(ReportCardError::length_mismatch(
                    "probability row width",
                    n_cols,
                    row.len(),
                ));
            }
            flat.extend_from_slice(row);
        }
        let values = Array2::from_shape_vec((rows.len(), n_cols), flat)
            .map_err(|e| ReportCardError::InvalidConfig(e.to_string()))?;
        Self::new(values)
    }

    /// Clamp into `[0, 1]` and renormalize each row; all-zero rows become uniform.
    ///
    /// Used on classifier outputs where floating error or calibration can push
    /// values slightly off the simplex.
    pub fn normalized(mut values: Array2<f64>) -> Result<Self> {
        let n_cols = values.ncols();
        for mut row in values.outer_iter_mut() {
            row.mapv_inplace(|p| if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 });
            let sum = row.sum();
            if sum > 0.0 {
                row /= sum;
            } else if n_cols > 0 {
                row.fill(1.0 / n_cols as f64);
            }
        }
        Self::new(values)
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.values.ncols()
    }

    #[must_use]
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Argmax per row; ties resolve to the lowest class index.
    #[must_use]
    pub fn predictions(&self) -> Vec<usize> {
        self.values
            .outer_iter()
            .map(|row| argmax_max(row).0)
            .collect()
    }

    /// Max probability per row.
    #[must_use]
    pub fn confidences(&self) -> Vec<f64> {
        self.values
            .outer_iter()
            .map(|row| argmax_max(row).1)
            .collect()
    }

    /// Keep only the given rows, in the given order.
    #[must_use]
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            values: self.values.select(Axis(0), rows),
        }
    }
}

fn argmax_max(row: ArrayView1<'_, f64>) -> (usize, f64) {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_idx, best), (idx, &p)| {
            if p > best {
                (idx, p)
            } else {
                (best_idx, best)
            }
        })
}
