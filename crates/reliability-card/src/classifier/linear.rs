use ndarray::{Array1, Array2, Axis};
use reliability_pre_processing::{TfidfVectorizer, VectorizerParams};
use sprs::CsMat;
use tracing::debug;

use super::ProbabilisticClassifier;
use crate::{
    config::ModelConfig,
    error::{ReportCardError, Result},
    probability::ProbabilityMatrix,
};

/// Floor applied to the true-class probability inside the log loss.
const LOG_EPS: f64 = 1e-15;

/// TF-IDF features into L2-regularized multinomial logistic regression.
///
/// Training minimizes `C * sum(cross_entropy) + 0.5 * ||W||^2` (bias
/// unregularized) with full-batch gradient descent. The objective is scaled by
/// `1 / (C * n)` internally so the learning rate does not depend on corpus size.
#[derive(Debug, Clone)]
pub struct LinearTextClassifier {
    name: String,
    vectorizer_params: VectorizerParams,
    c: f64,
    max_iter: usize,
    learning_rate: f64,
    tolerance: f64,
    fitted: Option<FittedModel>,
}

#[derive(Debug, Clone)]
struct FittedModel {
    vectorizer: TfidfVectorizer,
    /// `n_features x n_classes`
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearTextClassifier {
    pub fn new(name: impl Into<String>, vectorizer_params: VectorizerParams) -> Self {
        Self::from_config(name, vectorizer_params, &ModelConfig::default())
    }

    pub fn from_config(
        name: impl Into<String>,
        vectorizer_params: VectorizerParams,
        config: &ModelConfig,
    ) -> Self {
        Self {
            name: name.into(),
            vectorizer_params,
            c: config.c,
            max_iter: config.max_iter,
            learning_rate: config.learning_rate,
            tolerance: config.tolerance,
            fitted: None,
        }
    }

    #[must_use]
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn vectorizer_params(&self) -> &VectorizerParams {
        &self.vectorizer_params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Vocabulary size of the fitted vectorizer.
    pub fn num_features(&self) -> Option<usize> {
        self.fitted.as_ref().map(|m| m.vectorizer.num_features())
    }

    fn fitted(&self) -> Result<&FittedModel> {
        self.fitted
            .as_ref()
            .ok_or_else(|| ReportCardError::NotFitted(self.name.clone()))
    }

    fn scores(&self, texts: &[String]) -> Result<Array2<f64>> {
        let model = self.fitted()?;
        let features = model.vectorizer.transform(texts);
        Ok(logits(&features, &model.weights, &model.bias))
    }

    fn solve(&self, features: &CsMat<f64>, labels: &[usize], n_classes: usize) -> (Array2<f64>, Array1<f64>) {
        let n = features.rows() as f64;
        let reg = 1.0 / (self.c * n);
        let mut weights = Array2::<f64>::zeros((features.cols(), n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let mut previous = f64::INFINITY;

        for iter in 0..self.max_iter {
            let mut residual = logits(features, &weights, &bias);
            softmax_rows(&mut residual);
            let loss = mean_log_loss(&residual, labels) + 0.5 * reg * weights.iter().map(|w| w * w).sum::<f64>();

            for (mut row, &label) in residual.outer_iter_mut().zip(labels) {
                row[label] -= 1.0;
            }

            let mut grad_w = &weights * reg;
            for (row_idx, row_vec) in features.outer_iterator().enumerate() {
                let r = residual.row(row_idx);
                for (col_idx, &value) in row_vec.iter() {
                    grad_w.row_mut(col_idx).scaled_add(value / n, &r);
                }
            }
            let grad_b = residual.sum_axis(Axis(0)) / n;

            weights.scaled_add(-self.learning_rate, &grad_w);
            bias.scaled_add(-self.learning_rate, &grad_b);

            if (previous - loss).abs() < self.tolerance {
                debug!(model = %self.name, iter, loss, "Gradient descent converged");
                break;
            }
            previous = loss;
        }
        (weights, bias)
    }
}

impl ProbabilisticClassifier for LinearTextClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, texts: &[String], labels: &[usize], n_classes: usize) -> Result<()> {
        if texts.len() != labels.len() {
            return Err(ReportCardError::length_mismatch(
                "training labels",
                texts.len(),
                labels.len(),
            ));
        }
        if texts.is_empty() {
            return Err(ReportCardError::EmptyTrainingSet(self.name.clone()));
        }
        if let Some(&index) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(ReportCardError::LabelIndexOutOfRange {
                index,
                n_labels: n_classes,
            });
        }

        debug!(model = %self.name, num_texts = texts.len(), n_classes, "Fitting linear text classifier");
        let (vectorizer, features) =
            TfidfVectorizer::fit_transform(texts, self.vectorizer_params.clone())?;
        let (weights, bias) = self.solve(&features, labels, n_classes);
        debug!(model = %self.name, num_features = vectorizer.num_features(), "Fitted linear text classifier");

        self.fitted = Some(FittedModel {
            vectorizer,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_proba(&self, texts: &[String]) -> Result<ProbabilityMatrix> {
        let mut scores = self.scores(texts)?;
        softmax_rows(&mut scores);
        ProbabilityMatrix::normalized(scores)
    }

    /// Raw per-class logits.
    fn decision_function(&self, texts: &[String]) -> Result<Array2<f64>> {
        self.scores(texts)
    }
}

fn logits(features: &CsMat<f64>, weights: &Array2<f64>, bias: &Array1<f64>) -> Array2<f64> {
    let mut scores = Array2::<f64>::zeros((features.rows(), weights.ncols()));
    for (mut out, row_vec) in scores.outer_iter_mut().zip(features.outer_iterator()) {
        out.assign(bias);
        for (col_idx, &value) in row_vec.iter() {
            out.scaled_add(value, &weights.row(col_idx));
        }
    }
    scores
}

fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.outer_iter_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

fn mean_log_loss(proba: &Array2<f64>, labels: &[usize]) -> f64 {
    let total: f64 = proba
        .outer_iter()
        .zip(labels)
        .map(|(row, &label)| -row[label].max(LOG_EPS).ln())
        .sum();
    total / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classifier::fixtures::corpus, metrics};

    fn word_model() -> LinearTextClassifier {
        LinearTextClassifier::new("word", VectorizerParams::word(1..=2).unwrap()).with_max_iter(300)
    }

    #[test]
    fn test_fits_separable_corpus() {
        let (texts, labels) = corpus(12);
        let mut model = word_model();
        model.fit(&texts, &labels, 3).unwrap();
        assert!(model.is_fitted());

        let proba = model.predict_proba(&texts).unwrap();
        assert_eq!(proba.n_rows(), texts.len());
        assert_eq!(proba.n_classes(), 3);
        assert!(metrics::accuracy(&labels, &proba.predictions()).unwrap() > 0.95);
    }

    #[test]
    fn test_char_model_generalizes_to_unseen_text() {
        let (texts, labels) = corpus(12);
        let mut model =
            LinearTextClassifier::new("char", VectorizerParams::char(3..=5).unwrap()).with_max_iter(300);
        model.fit(&texts, &labels, 3).unwrap();

        let unseen = vec![
            "a comprehensive and robust framework".to_owned(),
            "lol grabbed lunch this weekend".to_owned(),
        ];
        assert_eq!(model.predict_proba(&unseen).unwrap().predictions(), vec![0, 2]);
    }

    #[test]
    fn test_rows_are_probabilities() {
        let (texts, labels) = corpus(6);
        let mut model = word_model();
        model.fit(&texts, &labels, 3).unwrap();
        let proba = model.predict_proba(&["text with no known words".to_owned()]).unwrap();
        let row = proba.row(0);
        assert!((row.sum() - 1.0).abs() < 1e-9);
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_decision_function_orders_like_probabilities() {
        let (texts, labels) = corpus(6);
        let mut model = word_model();
        model.fit(&texts, &labels, 3).unwrap();
        let scores = model.decision_function(&texts).unwrap();
        let proba = model.predict_proba(&texts).unwrap();
        for (row, &pred) in scores.outer_iter().zip(&proba.predictions()) {
            let argmax = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0;
            assert_eq!(argmax, pred);
        }
    }

    #[test]
    fn test_unseen_class_gets_low_probability() {
        // label space has 3 classes but class 1 never appears in training
        let (texts, labels) = corpus(6);
        let (texts, labels): (Vec<String>, Vec<usize>) = texts
            .into_iter()
            .zip(labels)
            .filter(|(_, l)| *l != 1)
            .unzip();
        let mut model = word_model();
        model.fit(&texts, &labels, 3).unwrap();
        let proba = model.predict_proba(&texts).unwrap();
        assert!(proba.values().column(1).iter().all(|&p| p < 0.34));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = word_model();
        assert!(matches!(
            model.predict_proba(&["hello there".to_owned()]),
            Err(ReportCardError::NotFitted(name)) if name == "word"
        ));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let mut model = word_model();
        assert!(matches!(
            model.fit(&[], &[], 2),
            Err(ReportCardError::EmptyTrainingSet(_))
        ));
        assert!(matches!(
            model.fit(&["some words here".to_owned()], &[0, 1], 2),
            Err(ReportCardError::LengthMismatch { .. })
        ));
        assert!(matches!(
            model.fit(&["some words here".to_owned()], &[5], 2),
            Err(ReportCardError::LabelIndexOutOfRange { index: 5, .. })
        ));
    }
}
