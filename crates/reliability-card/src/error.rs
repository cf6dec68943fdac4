use std::path::PathBuf;

use reliability_pre_processing::ParamsError;
use thiserror::Error;

pub type Result<T, E = ReportCardError> = std::result::Result<T, E>;

/// Errors raised by the evaluation engine and its collaborators.
#[derive(Debug, Error)]
pub enum ReportCardError {
    /// Probability columns do not line up with the label space.
    #[error("label space has {expected} labels but the probability matrix has {found} columns")]
    LabelSpaceMismatch { expected: usize, found: usize },

    #[error("label {0:?} is not part of the training label space")]
    UnknownLabel(String),

    #[error("label index {index} is out of range for {n_labels} labels")]
    LabelIndexOutOfRange { index: usize, n_labels: usize },

    #[error("{what}: expected {expected} entries, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("probability row {row} is invalid: {reason}")]
    InvalidProbabilityRow { row: usize, reason: String },

    #[error("target coverage must lie in (0, 1), got {0}")]
    InvalidTargetCoverage(f64),

    #[error("cannot compute metrics over an empty evaluation set")]
    EmptyEvaluation,

    #[error("no coverage curve point has defined metrics")]
    NoValidOperatingPoint,

    #[error("no obvious text column found among {columns:?}")]
    NoTextColumn { columns: Vec<String> },

    #[error("no obvious label column found (expected a named label column or a text column with 2-6 distinct values)")]
    NoLabelColumn,

    #[error("column {0:?} does not exist in the input")]
    MissingColumn(String),

    #[error("need at least {needed} rows to build train/val/test splits, got {found}")]
    TooFewRows { needed: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("classifier {0:?} must be fitted before it can predict")]
    NotFitted(String),

    #[error("cannot fit classifier {0:?} on an empty training set")]
    EmptyTrainingSet(String),

    #[error(transparent)]
    Vectorizer(#[from] ParamsError),

    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReportCardError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn length_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            found,
        }
    }
}
