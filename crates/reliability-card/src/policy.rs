//! Abstention policy selection over a coverage curve.
//!
//! The selected threshold is the most accurate operating point whose coverage
//! reaches the target. When no scanned point reaches the target the selector
//! degrades to the highest-threshold point with defined metrics; the returned
//! policy then reports `meets_target() == false`.

use core::fmt;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
    coverage::CoverageCurvePoint,
    error::{ReportCardError, Result},
};

/// Extra confidence required when the two models disagree.
pub const DISAGREEMENT_MARGIN: f64 = 0.05;

/// Upper bound on the disagreement threshold.
pub const DISAGREEMENT_CAP: f64 = 0.99;

/// Default target coverage.
pub const DEFAULT_TARGET_COVERAGE: f64 = 0.7;

/// Deployable abstain-or-decide rule derived from the test-set coverage curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstentionPolicy {
    pub recommended_threshold: f64,
    pub target_coverage: f64,
    pub estimated_coverage: f64,
    pub estimated_accuracy: f64,
    pub estimated_macro_f1: f64,
    pub abstain_rule: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    LowConfidence,
    ModelDisagreement,
}

/// Outcome of applying the policy to one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    Decide,
    Abstain(AbstainReason),
}

impl Decision {
    #[must_use]
    pub fn is_abstain(&self) -> bool {
        matches!(self, Self::Abstain(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decide => write!(f, "decide"),
            Self::Abstain(AbstainReason::LowConfidence) => write!(f, "abstain (low confidence)"),
            Self::Abstain(AbstainReason::ModelDisagreement) => {
                write!(f, "abstain (models disagree)")
            }
        }
    }
}

impl AbstentionPolicy {
    fn from_point(point: &CoverageCurvePoint, target_coverage: f64) -> Result<Self> {
        let (Some(accuracy), Some(macro_f1)) = (point.accuracy, point.macro_f1) else {
            return Err(ReportCardError::NoValidOperatingPoint);
        };
        let threshold = point.threshold;
        Ok(Self {
            recommended_threshold: threshold,
            target_coverage,
            estimated_coverage: point.coverage,
            estimated_accuracy: accuracy,
            estimated_macro_f1: macro_f1,
            abstain_rule: abstain_rule_text(threshold),
        })
    }

    /// Confidence required to decide when the two models disagree.
    #[must_use]
    pub fn disagreement_threshold(&self) -> f64 {
        disagreement_threshold(self.recommended_threshold)
    }

    /// Whether the chosen point reaches the requested coverage.
    #[must_use]
    pub fn meets_target(&self) -> bool {
        self.estimated_coverage >= self.target_coverage
    }

    /// Apply the rule to one instance. A NaN confidence always abstains.
    #[must_use]
    pub fn decide(&self, confidence: f64, models_disagree: bool) -> Decision {
        if confidence.is_nan() || confidence < self.recommended_threshold {
            Decision::Abstain(AbstainReason::LowConfidence)
        } else if models_disagree && confidence < self.disagreement_threshold() {
            Decision::Abstain(AbstainReason::ModelDisagreement)
        } else {
            Decision::Decide
        }
    }
}

fn disagreement_threshold(threshold: f64) -> f64 {
    (threshold + DISAGREEMENT_MARGIN).min(DISAGREEMENT_CAP)
}

fn abstain_rule_text(threshold: f64) -> String {
    format!(
        "abstain if max_proba < {threshold:.4} OR (disagree_across_models and max_proba < {:.4}) \
         [disagreement threshold = min({DISAGREEMENT_CAP}, threshold + {DISAGREEMENT_MARGIN})]",
        disagreement_threshold(threshold),
    )
}

fn check_target(target_coverage: f64) -> Result<()> {
    if target_coverage > 0.0 && target_coverage < 1.0 {
        Ok(())
    } else {
        Err(ReportCardError::InvalidTargetCoverage(target_coverage))
    }
}

/// Pick the operating threshold for `target_coverage` from a coverage curve.
///
/// Candidates are points with coverage `>= target_coverage` and defined
/// metrics; the best has the highest accuracy, then the highest coverage, then
/// appears first in the curve. Without candidates, the last point with defined
/// metrics is used.
pub fn select_policy(curve: &[CoverageCurvePoint], target_coverage: f64) -> Result<AbstentionPolicy> {
    check_target(target_coverage)?;

    let best = curve
        .iter()
        .filter(|point| point.coverage >= target_coverage && point.has_metrics())
        .fold(None::<&CoverageCurvePoint>, |best, point| match best {
            Some(current) if !ranks_above(point, current) => Some(current),
            _ => Some(point),
        });

    let chosen = match best {
        Some(point) => point,
        None => curve
            .iter()
            .rev()
            .find(|point| point.has_metrics())
            .ok_or(ReportCardError::NoValidOperatingPoint)?,
    };

    AbstentionPolicy::from_point(chosen, target_coverage)
}

/// Strictly better on (accuracy, coverage); equal points keep curve order.
fn ranks_above(candidate: &CoverageCurvePoint, current: &CoverageCurvePoint) -> bool {
    let accuracy = candidate
        .accuracy
        .partial_cmp(&current.accuracy)
        .unwrap_or(Ordering::Equal);
    let coverage = candidate
        .coverage
        .partial_cmp(&current.coverage)
        .unwrap_or(Ordering::Equal);
    accuracy.then(coverage) == Ordering::Greater
}
