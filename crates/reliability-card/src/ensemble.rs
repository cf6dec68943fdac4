//! Two independently trained classifiers: the one with the better validation
//! macro-F1 becomes primary, the other supplies the disagreement signal.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    classifier::ProbabilisticClassifier,
    error::{ReportCardError, Result},
    metrics,
    probability::ProbabilityMatrix,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Member {
    First,
    Second,
}

/// Validation macro-F1 of both members.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationScores {
    pub first: f64,
    pub second: f64,
}

impl ValidationScores {
    /// Higher score wins; ties go to the first member.
    #[must_use]
    pub fn primary(&self) -> Member {
        if self.first >= self.second {
            Member::First
        } else {
            Member::Second
        }
    }
}

/// Test-time output of the ensemble.
#[derive(Debug, Clone)]
pub struct DualPrediction {
    pub primary: ProbabilityMatrix,
    pub secondary: ProbabilityMatrix,
    pub disagreement: Vec<bool>,
}

/// Per-row flag: the two matrices' argmax labels differ.
pub fn disagreement_flags(
    primary: &ProbabilityMatrix,
    secondary: &ProbabilityMatrix,
) -> Result<Vec<bool>> {
    if primary.n_rows() != secondary.n_rows() {
        return Err(ReportCardError::length_mismatch(
            "secondary model rows",
            primary.n_rows(),
            secondary.n_rows(),
        ));
    }
    if primary.n_classes() != secondary.n_classes() {
        return Err(ReportCardError::LabelSpaceMismatch {
            expected: primary.n_classes(),
            found: secondary.n_classes(),
        });
    }
    Ok(primary
        .predictions()
        .into_iter()
        .zip(secondary.predictions())
        .map(|(a, b)| a != b)
        .collect())
}

pub struct DualModelEnsemble<A, B> {
    first: A,
    second: B,
    primary: Member,
    n_classes: Option<usize>,
}

impl<A, B> DualModelEnsemble<A, B>
where
    A: ProbabilisticClassifier,
    B: ProbabilisticClassifier,
{
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            primary: Member::First,
            n_classes: None,
        }
    }

    /// Both members must emit one column per class seen in `fit`.
    fn check_classes(&self, proba: &ProbabilityMatrix) -> Result<()> {
        match self.n_classes {
            Some(expected) if proba.n_classes() != expected => {
                Err(ReportCardError::LabelSpaceMismatch {
                    expected,
                    found: proba.n_classes(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Fit both members concurrently on the same training data.
    pub fn fit(&mut self, texts: &[String], labels: &[usize], n_classes: usize) -> Result<()> {
        let (first, second) = (&mut self.first, &mut self.second);
        let (first_fit, second_fit) = rayon::join(
            || first.fit(texts, labels, n_classes),
            || second.fit(texts, labels, n_classes),
        );
        first_fit?;
        second_fit?;
        self.n_classes = Some(n_classes);
        Ok(())
    }

    /// Score both members on validation data and pick the primary.
    pub fn select_primary(&mut self, texts: &[String], labels: &[usize]) -> Result<ValidationScores> {
        let first = self.first.predict_proba(texts)?;
        let second = self.second.predict_proba(texts)?;
        for proba in [&first, &second] {
            self.check_classes(proba)?;
            if proba.n_rows() != labels.len() {
                return Err(ReportCardError::length_mismatch(
                    "validation labels",
                    proba.n_rows(),
                    labels.len(),
                ));
            }
        }

        let scores = ValidationScores {
            first: metrics::macro_f1(labels, &first.predictions(), first.n_classes())?,
            second: metrics::macro_f1(labels, &second.predictions(), second.n_classes())?,
        };
        self.primary = scores.primary();
        info!(
            first = self.first.name(),
            first_macro_f1 = scores.first,
            second = self.second.name(),
            second_macro_f1 = scores.second,
            primary = self.primary_name(),
            "Selected primary model on validation"
        );
        Ok(scores)
    }

    pub fn primary(&self) -> Member {
        self.primary
    }

    pub fn primary_name(&self) -> &str {
        match self.primary {
            Member::First => self.first.name(),
            Member::Second => self.second.name(),
        }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    /// Primary and secondary probabilities plus disagreement flags.
    pub fn predict(&self, texts: &[String]) -> Result<DualPrediction> {
        let (first, second) = rayon::join(
            || self.first.predict_proba(texts),
            || self.second.predict_proba(texts),
        );
        let (primary, secondary) = match self.primary {
            Member::First => (first?, second?),
            Member::Second => (second?, first?),
        };
        self.check_classes(&primary)?;
        self.check_classes(&secondary)?;
        let disagreement = disagreement_flags(&primary, &secondary)?;
        Ok(DualPrediction {
            primary,
            secondary,
            disagreement,
        })
    }
}
