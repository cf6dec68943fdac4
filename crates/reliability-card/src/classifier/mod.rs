//! Probabilistic text classifiers.
//!
//! [`LinearTextClassifier`] is TF-IDF features into multinomial logistic
//! regression; [`CalibratedClassifier`] wraps any cloneable classifier with
//! cross-validated probability calibration.

mod calibration;
mod linear;

use ndarray::Array2;

pub use calibration::{CalibratedClassifier, CalibrationMethod, IsotonicRegression, PlattScaling};
pub use linear::LinearTextClassifier;

use crate::{error::Result, probability::ProbabilityMatrix};

/// A classifier that fits on labeled text and emits class probabilities.
///
/// Labels are dense indices into a label space of `n_classes` entries; the
/// probability matrix has one column per class in that order.
pub trait ProbabilisticClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, texts: &[String], labels: &[usize], n_classes: usize) -> Result<()>;

    fn predict_proba(&self, texts: &[String]) -> Result<ProbabilityMatrix>;

    /// Per-class scores used for calibration. Defaults to the probabilities.
    fn decision_function(&self, texts: &[String]) -> Result<Array2<f64>> {
        Ok(self.predict_proba(texts)?.values().clone())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    const HUMAN: [&str; 10] = [
        "honestly", "grabbed", "lunch", "kinda", "messy", "lol", "weekend", "cousin", "tired", "gonna",
    ];
    const AI: [&str; 10] = [
        "furthermore", "delve", "comprehensive", "landscape", "crucial", "leverage", "robust",
        "framework", "notably", "insights",
    ];
    const EDITED: [&str; 10] = [
        "tweaked", "draft", "revised", "clarity", "streamlined", "reworded", "polished", "edited",
        "flow", "trimmed",
    ];

    /// Deterministic, well separated three-class corpus: `(texts, labels)`
    /// with labels 0 = ai, 1 = edited, 2 = human.
    pub(crate) fn corpus(per_class: usize) -> (Vec<String>, Vec<usize>) {
        let mut texts = Vec::with_capacity(per_class * 3);
        let mut labels = Vec::with_capacity(per_class * 3);
        for i in 0..per_class {
            for (label, vocab) in [(0, &AI), (1, &EDITED), (2, &HUMAN)] {
                let words = (0..6)
                    .map(|k| vocab[(i * 3 + k * 7) % vocab.len()])
                    .collect::<Vec<_>>()
                    .join(" ");
                texts.push(format!("the project {words} and more"));
                labels.push(label);
            }
        }
        (texts, labels)
    }
}
