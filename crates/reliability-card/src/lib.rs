//! # reliability-card
//!
//! A reliability report card for text-provenance detectors that label text as
//! human, AI-generated or post-edited.
//!
//! Two calibrated TF-IDF linear classifiers (word n-grams and character
//! n-grams) are trained on the same split; the one with the better validation
//! macro-F1 becomes primary. On the test split the crate measures accuracy,
//! macro-F1, expected calibration error and Brier score, sweeps a confidence
//! threshold to trace coverage against accuracy, and recommends an abstention
//! policy that also abstains when the two models disagree at moderate
//! confidence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use reliability_card::{pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default().with_target_coverage(0.8);
//! let summary = pipeline::run(
//!     Path::new("data/labeled.csv"),
//!     Path::new("outputs"),
//!     Path::new("reports/figures"),
//!     &config,
//! )?;
//! println!(
//!     "threshold {:.2} abstains on {} of {} test rows",
//!     summary.policy.recommended_threshold, summary.test_abstentions, summary.n_test
//! );
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Policy From Existing Predictions
//!
//! ```rust
//! use reliability_card::{
//!     coverage::{coverage_curve, default_thresholds},
//!     policy::{select_policy, Decision},
//!     LabelSpace, ProbabilityMatrix,
//! };
//!
//! let labels = LabelSpace::from_labels(["ai", "human"]);
//! let y_true = labels.encode(&["ai", "human", "ai", "human"])?;
//! let proba = ProbabilityMatrix::from_rows(&[
//!     vec![0.9, 0.1],
//!     vec![0.2, 0.8],
//!     vec![0.6, 0.4],
//!     vec![0.45, 0.55],
//! ])?;
//!
//! let curve = coverage_curve(&y_true, &proba, &labels, &default_thresholds())?;
//! let policy = select_policy(&curve, 0.5)?;
//! assert_eq!(policy.estimated_accuracy, 1.0);
//! assert_eq!(policy.decide(0.9, false), Decision::Decide);
//! # Ok::<(), reliability_card::ReportCardError>(())
//! ```

#[cfg(feature = "cli")]
pub mod cli;

pub mod classifier;
pub mod config;
pub mod coverage;
pub mod data;
pub mod ensemble;
mod error;
mod labels;
pub mod metrics;
pub mod pipeline;
pub mod policy;
mod probability;
pub mod sink;

pub use classifier::{CalibratedClassifier, CalibrationMethod, LinearTextClassifier, ProbabilisticClassifier};
pub use config::PipelineConfig;
pub use error::{ReportCardError, Result};
pub use labels::LabelSpace;
pub use policy::{AbstentionPolicy, Decision};
pub use probability::{ProbabilityMatrix, ROW_SUM_TOLERANCE};
