use core::fmt;

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ProbabilisticClassifier;
use crate::{
    error::{ReportCardError, Result},
    probability::ProbabilityMatrix,
};

const NEWTON_MAX_ITER: usize = 100;
const NEWTON_MIN_STEP: f64 = 1e-10;
const NEWTON_SIGMA: f64 = 1e-12;
const NEWTON_GRAD_EPS: f64 = 1e-5;

/// How held-out scores are mapped to probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CalibrationMethod {
    /// Platt scaling.
    #[default]
    Sigmoid,
    /// Pool-adjacent-violators step function.
    Isotonic,
    /// Use the base model's probabilities unchanged.
    None,
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigmoid => write!(f, "sigmoid"),
            Self::Isotonic => write!(f, "isotonic"),
            Self::None => write!(f, "none"),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `p = 1 / (1 + exp(a * score + b))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    /// Fit by Newton's method with backtracking line search on the
    /// cross-entropy against smoothed targets
    /// (`(n_pos + 1) / (n_pos + 2)` and `1 / (n_neg + 2)`).
    #[must_use]
    pub fn fit(scores: &[f64], targets: &[bool]) -> Self {
        let n_pos = targets.iter().filter(|&&t| t).count() as f64;
        let n_neg = targets.len() as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let t: Vec<f64> = targets.iter().map(|&y| if y { hi } else { lo }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(&t)
                .map(|(&f, &ti)| {
                    let z = f.mul_add(a, b);
                    if z >= 0.0 {
                        ti.mul_add(z, (-z).exp().ln_1p())
                    } else {
                        (ti - 1.0).mul_add(z, z.exp().ln_1p())
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..NEWTON_MAX_ITER {
            let (mut h11, mut h22, mut h21) = (NEWTON_SIGMA, NEWTON_SIGMA, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &ti) in scores.iter().zip(&t) {
                // p = P(positive), q = 1 - p
                let p = sigmoid(-f.mul_add(a, b));
                let q = 1.0 - p;
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = ti - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < NEWTON_GRAD_EPS && g2.abs() < NEWTON_GRAD_EPS {
                break;
            }

            let det = h11.mul_add(h22, -h21 * h21);
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= NEWTON_MIN_STEP {
                let (new_a, new_b) = (a + step * da, b + step * db);
                let new_f = objective(new_a, new_b);
                if new_f < fval + 1e-4 * step * gd {
                    (a, b, fval) = (new_a, new_b, new_f);
                    break;
                }
                step /= 2.0;
            }
            if step < NEWTON_MIN_STEP {
                break;
            }
        }
        Self { a, b }
    }

    #[must_use]
    pub fn calibrate(&self, score: f64) -> f64 {
        if !score.is_finite() {
            return 0.0;
        }
        sigmoid(-score.mul_add(self.a, self.b))
    }
}

/// Monotone non-decreasing map from score to probability.
///
/// Predictions interpolate linearly between fitted points and clip to the
/// end values outside the fitted range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicRegression {
    breakpoints: Vec<f64>,
    values: Vec<f64>,
}

impl IsotonicRegression {
    /// Pool adjacent violators over `(score, target)` pairs. Equal scores are
    /// pooled before fitting.
    #[must_use]
    pub fn fit(scores: &[f64], targets: &[bool]) -> Self {
        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .zip(targets)
            .map(|(&s, &y)| (s, if y { 1.0 } else { 0.0 }))
            .collect();
        pairs.sort_by(|x, y| x.0.total_cmp(&y.0));

        // (score, sum of targets, weight) per distinct score
        let mut points: Vec<(f64, f64, f64)> = Vec::with_capacity(pairs.len());
        for (score, target) in pairs {
            match points.last_mut() {
                Some(last) if last.0 == score => {
                    last.1 += target;
                    last.2 += 1.0;
                }
                _ => points.push((score, target, 1.0)),
            }
        }

        // blocks: (sum, weight, number of points pooled)
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(points.len());
        for &(_, sum, weight) in &points {
            blocks.push((sum, weight, 1));
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.0 / prev.1 <= last.0 / last.1 {
                    break;
                }
                blocks.pop();
                if let Some(merged) = blocks.last_mut() {
                    *merged = (prev.0 + last.0, prev.1 + last.1, prev.2 + last.2);
                }
            }
        }

        let values = blocks
            .iter()
            .flat_map(|&(sum, weight, len)| std::iter::repeat((sum / weight).clamp(0.0, 1.0)).take(len))
            .collect();
        let breakpoints = points.into_iter().map(|(score, _, _)| score).collect();

        Self {
            breakpoints,
            values,
        }
    }

    #[must_use]
    pub fn calibrate(&self, score: f64) -> f64 {
        let (Some(&first), Some(&last)) = (self.breakpoints.first(), self.breakpoints.last()) else {
            return 0.5;
        };
        if score.is_nan() {
            return self.values[0];
        }
        if score <= first {
            return self.values[0];
        }
        if score >= last {
            return self.values[self.values.len() - 1];
        }
        let upper = self.breakpoints.partition_point(|&bp| bp < score);
        if self.breakpoints[upper] == score {
            return self.values[upper];
        }
        let (x0, x1) = (self.breakpoints[upper - 1], self.breakpoints[upper]);
        let (y0, y1) = (self.values[upper - 1], self.values[upper]);
        y0 + (y1 - y0) * (score - x0) / (x1 - x0)
    }
}

#[derive(Debug, Clone)]
enum Calibrator {
    Sigmoid(PlattScaling),
    Isotonic(IsotonicRegression),
}

impl Calibrator {
    fn fit(method: CalibrationMethod, scores: &[f64], targets: &[bool]) -> Option<Self> {
        match method {
            CalibrationMethod::Sigmoid => Some(Self::Sigmoid(PlattScaling::fit(scores, targets))),
            CalibrationMethod::Isotonic => {
                Some(Self::Isotonic(IsotonicRegression::fit(scores, targets)))
            }
            CalibrationMethod::None => None,
        }
    }

    fn calibrate(&self, score: f64) -> f64 {
        match self {
            Self::Sigmoid(platt) => platt.calibrate(score),
            Self::Isotonic(iso) => iso.calibrate(score),
        }
    }
}

/// Two-class problems calibrate a single margin; others calibrate each class
/// one-vs-rest.
fn binary_margin(row: ArrayView1<'_, f64>) -> f64 {
    row[1] - row[0]
}

#[derive(Debug, Clone)]
struct CalibratedFold<C> {
    model: C,
    calibrators: Vec<Calibrator>,
}

impl<C: ProbabilisticClassifier> CalibratedFold<C> {
    fn predict(&self, texts: &[String], n_classes: usize) -> Result<Array2<f64>> {
        let scores = self.model.decision_function(texts)?;
        let mut proba = Array2::<f64>::zeros((texts.len(), n_classes));

        for (mut out, row) in proba.outer_iter_mut().zip(scores.outer_iter()) {
            if n_classes == 2 {
                let positive = self.calibrators[0].calibrate(binary_margin(row));
                out[0] = 1.0 - positive;
                out[1] = positive;
                continue;
            }
            for (k, calibrator) in self.calibrators.iter().enumerate() {
                out[k] = calibrator.calibrate(row[k]);
            }
            let sum = out.sum();
            if sum > 0.0 {
                out /= sum;
            } else {
                out.fill(1.0 / n_classes as f64);
            }
        }
        Ok(proba)
    }
}

/// Cross-validated probability calibration around a base classifier.
///
/// Fitting splits the training rows into `cv` stratified folds. For each fold a
/// clone of the base model is trained on the remaining folds and calibrators
/// are fitted on its held-out scores. Predictions average the calibrated
/// probabilities of all fold models.
#[derive(Debug, Clone)]
pub struct CalibratedClassifier<C> {
    base: C,
    method: CalibrationMethod,
    cv: usize,
    n_classes: usize,
    folds: Vec<CalibratedFold<C>>,
    uncalibrated: Option<C>,
}

impl<C> CalibratedClassifier<C>
where
    C: ProbabilisticClassifier + Clone,
{
    pub fn new(base: C, method: CalibrationMethod) -> Self {
        Self {
            base,
            method,
            cv: 3,
            n_classes: 0,
            folds: Vec::new(),
            uncalibrated: None,
        }
    }

    #[must_use]
    pub fn with_cv(mut self, cv: usize) -> Self {
        self.cv = cv.max(2);
        self
    }

    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    /// Whether the fitted model carries calibrators.
    pub fn is_calibrated(&self) -> bool {
        !self.folds.is_empty()
    }

    fn fit_uncalibrated(&mut self, texts: &[String], labels: &[usize], n_classes: usize) -> Result<()> {
        let mut model = self.base.clone();
        model.fit(texts, labels, n_classes)?;
        self.uncalibrated = Some(model);
        Ok(())
    }

    fn fit_fold(
        &self,
        fold: usize,
        assignment: &[usize],
        texts: &[String],
        labels: &[usize],
        n_classes: usize,
    ) -> Result<CalibratedFold<C>> {
        let mut train_texts = Vec::new();
        let mut train_labels = Vec::new();
        let mut held_texts = Vec::new();
        let mut held_labels = Vec::new();
        for ((text, &label), &assigned) in texts.iter().zip(labels).zip(assignment) {
            if assigned == fold {
                held_texts.push(text.clone());
                held_labels.push(label);
            } else {
                train_texts.push(text.clone());
                train_labels.push(label);
            }
        }

        let mut model = self.base.clone();
        model.fit(&train_texts, &train_labels, n_classes)?;
        let scores = model.decision_function(&held_texts)?;

        let calibrators = if n_classes == 2 {
            let margins: Vec<f64> = scores.outer_iter().map(binary_margin).collect();
            let targets: Vec<bool> = held_labels.iter().map(|&l| l == 1).collect();
            Calibrator::fit(self.method, &margins, &targets).into_iter().collect()
        } else {
            (0..n_classes)
                .filter_map(|k| {
                    let column = scores.column(k).to_vec();
                    let targets: Vec<bool> = held_labels.iter().map(|&l| l == k).collect();
                    Calibrator::fit(self.method, &column, &targets)
                })
                .collect()
        };

        debug!(
            model = self.base.name(),
            fold,
            n_train = train_texts.len(),
            n_held_out = held_texts.len(),
            "Fitted calibration fold"
        );
        Ok(CalibratedFold { model, calibrators })
    }
}

/// Assign each row to one of `cv` folds, round-robin within label order so
/// that every fold sees every label in proportion.
fn stratified_folds(labels: &[usize], n_classes: usize, cv: usize) -> Vec<usize> {
    let mut assignment = vec![0; labels.len()];
    let mut position = 0;
    for class in 0..n_classes {
        for (row, _) in labels.iter().enumerate().filter(|(_, &l)| l == class) {
            assignment[row] = position % cv;
            position += 1;
        }
    }
    assignment
}

impl<C> ProbabilisticClassifier for CalibratedClassifier<C>
where
    C: ProbabilisticClassifier + Clone,
{
    fn name(&self) -> &str {
        self.base.name()
    }

    fn fit(&mut self, texts: &[String], labels: &[usize], n_classes: usize) -> Result<()> {
        self.folds.clear();
        self.uncalibrated = None;
        self.n_classes = n_classes;

        if self.method == CalibrationMethod::None {
            return self.fit_uncalibrated(texts, labels, n_classes);
        }
        if texts.len() != labels.len() {
            return Err(ReportCardError::length_mismatch(
                "training labels",
                texts.len(),
                labels.len(),
            ));
        }
        if texts.len() < self.cv {
            warn!(
                model = self.base.name(),
                n_rows = texts.len(),
                cv = self.cv,
                "Too few rows for cross-validated calibration, using uncalibrated probabilities"
            );
            return self.fit_uncalibrated(texts, labels, n_classes);
        }
        if let Some(&index) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(ReportCardError::LabelIndexOutOfRange {
                index,
                n_labels: n_classes,
            });
        }

        let assignment = stratified_folds(labels, n_classes, self.cv);
        let folds = (0..self.cv)
            .into_par_iter()
            .map(|fold| self.fit_fold(fold, &assignment, texts, labels, n_classes))
            .collect::<Result<Vec<_>>>()?;
        self.folds = folds;
        Ok(())
    }

    fn predict_proba(&self, texts: &[String]) -> Result<ProbabilityMatrix> {
        if let Some(model) = &self.uncalibrated {
            return model.predict_proba(texts);
        }
        if self.folds.is_empty() {
            return Err(ReportCardError::NotFitted(self.base.name().to_owned()));
        }

        let mut total = Array2::<f64>::zeros((texts.len(), self.n_classes));
        for fold in &self.folds {
            total += &fold.predict(texts, self.n_classes)?;
        }
        total /= self.folds.len() as f64;
        ProbabilityMatrix::normalized(total)
    }
}

#[cfg(test)]
mod tests {
    use reliability_pre_processing::VectorizerParams;

    use super::*;
    use crate::{
        classifier::{fixtures::corpus, LinearTextClassifier},
        metrics,
    };

    fn base() -> LinearTextClassifier {
        LinearTextClassifier::new("word", VectorizerParams::word(1..=2).unwrap()).with_max_iter(200)
    }

    #[test]
    fn test_platt_is_monotone_in_score() {
        let scores = [-3.0, -2.0, -1.5, -0.5, 0.2, 0.8, 1.5, 2.5, 3.0, -0.1];
        let targets = [false, false, false, false, true, true, true, true, true, true];
        let platt = PlattScaling::fit(&scores, &targets);
        assert!(platt.a < 0.0, "positive scores should raise probability");
        assert!(platt.calibrate(-3.0) < platt.calibrate(0.0));
        assert!(platt.calibrate(0.0) < platt.calibrate(3.0));
        assert!(platt.calibrate(3.0) < 1.0 && platt.calibrate(-3.0) > 0.0);
        assert_eq!(platt.calibrate(f64::NAN), 0.0);
    }

    #[test]
    fn test_platt_uninformative_scores_recover_base_rate() {
        let scores = [0.0; 8];
        let targets = [true, false, false, false, true, false, false, false];
        let platt = PlattScaling::fit(&scores, &targets);
        // smoothed base rate: (2 + 1) / (2 + 2) vs 1 / (6 + 2), mean 0.28125
        assert!((platt.calibrate(0.0) - 0.28125).abs() < 1e-3);
    }

    #[test]
    fn test_isotonic_pools_violators() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5];
        let targets = [false, true, false, true, true];
        let iso = IsotonicRegression::fit(&scores, &targets);
        // 0.2 and 0.3 pool to 0.5
        assert_eq!(iso.values, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert!(iso.values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_isotonic_interpolates_and_clips() {
        let iso = IsotonicRegression::fit(&[0.0, 1.0], &[false, true]);
        assert!((iso.calibrate(0.25) - 0.25).abs() < 1e-12);
        assert_eq!(iso.calibrate(-5.0), 0.0);
        assert_eq!(iso.calibrate(5.0), 1.0);
    }

    #[test]
    fn test_isotonic_pools_equal_scores() {
        let iso = IsotonicRegression::fit(&[0.5, 0.5, 0.5, 0.9], &[true, false, false, true]);
        assert_eq!(iso.breakpoints, vec![0.5, 0.9]);
        assert!((iso.calibrate(0.5) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_stratified_folds_spread_every_label() {
        let labels = [0, 0, 0, 1, 1, 1, 2, 2, 2, 0];
        let folds = stratified_folds(&labels, 3, 3);
        for fold in 0..3 {
            let held: Vec<usize> = labels
                .iter()
                .zip(&folds)
                .filter(|(_, &f)| f == fold)
                .map(|(&l, _)| l)
                .collect();
            assert!(!held.is_empty());
        }
        // label 0 has 4 rows spread over all folds
        let zero_folds: std::collections::BTreeSet<usize> = labels
            .iter()
            .zip(&folds)
            .filter(|(&l, _)| l == 0)
            .map(|(_, &f)| f)
            .collect();
        assert_eq!(zero_folds.len(), 3);
    }

    #[test]
    fn test_calibrated_rows_sum_to_one() {
        let (texts, labels) = corpus(9);
        for method in [CalibrationMethod::Sigmoid, CalibrationMethod::Isotonic] {
            let mut model = CalibratedClassifier::new(base(), method).with_cv(3);
            model.fit(&texts, &labels, 3).unwrap();
            assert!(model.is_calibrated());

            let proba = model.predict_proba(&texts).unwrap();
            for row in proba.values().outer_iter() {
                assert!((row.sum() - 1.0).abs() < 1e-6);
            }
            assert!(metrics::accuracy(&labels, &proba.predictions()).unwrap() > 0.9);
        }
    }

    #[test]
    fn test_binary_calibration() {
        let (texts, labels) = corpus(8);
        let (texts, labels): (Vec<String>, Vec<usize>) = texts
            .into_iter()
            .zip(labels)
            .filter(|(_, l)| *l != 1)
            .map(|(t, l)| (t, usize::from(l == 2)))
            .unzip();
        let mut model = CalibratedClassifier::new(base(), CalibrationMethod::Sigmoid);
        model.fit(&texts, &labels, 2).unwrap();
        let proba = model.predict_proba(&texts).unwrap();
        assert_eq!(proba.n_classes(), 2);
        assert!(metrics::accuracy(&labels, &proba.predictions()).unwrap() > 0.9);
    }

    #[test]
    fn test_too_few_rows_skips_calibration() {
        let texts = vec!["robust framework".to_owned(), "grabbed lunch".to_owned()];
        let mut model = CalibratedClassifier::new(base(), CalibrationMethod::Sigmoid).with_cv(3);
        model.fit(&texts, &[0, 1], 2).unwrap();
        assert!(!model.is_calibrated());
        assert_eq!(model.predict_proba(&texts).unwrap().n_rows(), 2);
    }

    #[test]
    fn test_method_none_passes_through() {
        let (texts, labels) = corpus(4);
        let mut model = CalibratedClassifier::new(base(), CalibrationMethod::None);
        model.fit(&texts, &labels, 3).unwrap();
        let mut plain = base();
        plain.fit(&texts, &labels, 3).unwrap();
        assert_eq!(
            model.predict_proba(&texts).unwrap(),
            plain.predict_proba(&texts).unwrap()
        );
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = CalibratedClassifier::new(base(), CalibrationMethod::Isotonic);
        assert!(matches!(
            model.predict_proba(&["anything".to_owned()]),
            Err(ReportCardError::NotFitted(_))
        ));
    }

    #[test]
    fn test_method_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CalibrationMethod::Isotonic).unwrap(),
            r#""isotonic""#
        );
        assert_eq!(CalibrationMethod::default().to_string(), "sigmoid");
    }
}
