//! Run configuration.
//!
//! Every section deserializes with defaults, so a JSON file only needs the keys
//! it overrides:
//!
//! ```json
//! { "split": { "seed": 7 }, "policy": { "target_coverage": 0.8 } }
//! ```

use std::path::Path;

use reliability_pre_processing::{ParamsError, VectorizerParams};
use serde::{Deserialize, Serialize};

use crate::{
    classifier::CalibrationMethod,
    coverage::{DEFAULT_MAX_THRESHOLD, DEFAULT_THRESHOLD_COUNT},
    error::{ReportCardError, Result},
    metrics::{self, DEFAULT_CALIBRATION_BINS, DEFAULT_HISTOGRAM_BINS},
    policy::DEFAULT_TARGET_COVERAGE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of all rows held out for test.
    pub test_size: f64,
    /// Fraction of all rows held out for validation.
    pub val_size: f64,
    pub seed: u64,
    /// Preserve label proportions across splits when the data allows it.
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            val_size: 0.2,
            seed: 42,
            stratify: true,
        }
    }
}

impl SplitConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_sizes(mut self, test_size: f64, val_size: f64) -> Self {
        self.test_size = test_size;
        self.val_size = val_size;
        self
    }

    #[must_use]
    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    /// Validation share of the rows left after the test split.
    #[must_use]
    pub fn relative_val_size(&self) -> f64 {
        self.val_size / (1.0 - self.test_size)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit(self.test_size) || !in_unit(self.val_size) {
            return Err(ReportCardError::InvalidConfig(format!(
                "split sizes must lie in (0, 1), got test={} val={}",
                self.test_size, self.val_size
            )));
        }
        if self.test_size + self.val_size >= 1.0 {
            return Err(ReportCardError::InvalidConfig(format!(
                "test and val sizes leave no training data (test={} val={})",
                self.test_size, self.val_size
            )));
        }
        Ok(())
    }
}

/// TF-IDF settings shared by the word and char models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub word_ngram_range: (usize, usize),
    pub char_ngram_range: (usize, usize),
    pub max_features: Option<usize>,
    pub min_df: f64,
    pub max_df: f64,
    pub sublinear_tf: bool,
    pub lowercase: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            word_ngram_range: (1, 2),
            char_ngram_range: (3, 5),
            max_features: Some(60_000),
            min_df: 1.0,
            max_df: 1.0,
            sublinear_tf: false,
            lowercase: true,
        }
    }
}

impl FeatureConfig {
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    #[must_use]
    pub fn with_sublinear_tf(mut self, sublinear_tf: bool) -> Self {
        self.sublinear_tf = sublinear_tf;
        self
    }

    pub fn word_params(&self) -> Result<VectorizerParams, ParamsError> {
        let (lo, hi) = self.word_ngram_range;
        self.finish(VectorizerParams::word(lo..=hi)?)
    }

    pub fn char_params(&self) -> Result<VectorizerParams, ParamsError> {
        let (lo, hi) = self.char_ngram_range;
        self.finish(VectorizerParams::char(lo..=hi)?)
    }

    fn finish(&self, params: VectorizerParams) -> Result<VectorizerParams, ParamsError> {
        let params = params
            .with_min_df(self.min_df)
            .with_max_df(self.max_df)
            .with_max_features(self.max_features)
            .with_sublinear_tf(self.sublinear_tf)
            .with_lowercase(self.lowercase);
        params.validate()?;
        Ok(params)
    }
}

/// Logistic regression and calibration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Stop once the objective changes by less than this between iterations.
    pub tolerance: f64,
    pub calibration: CalibrationMethod,
    pub cv_folds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            c: 3.0,
            max_iter: 2000,
            learning_rate: 1.0,
            tolerance: 1e-7,
            calibration: CalibrationMethod::Sigmoid,
            cv_folds: 3,
        }
    }
}

impl ModelConfig {
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
    pub fn with_calibration(mut self, calibration: CalibrationMethod) -> Self {
        self.calibration = calibration;
        self
    }

    #[must_use]
    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) {
            return Err(ReportCardError::InvalidConfig(format!(
                "c must be positive, got {}",
                self.c
            )));
        }
        if !(self.learning_rate > 0.0) || !(self.tolerance >= 0.0) {
            return Err(ReportCardError::InvalidConfig(format!(
                "learning_rate must be positive and tolerance non-negative, got {} and {}",
                self.learning_rate, self.tolerance
            )));
        }
        if self.max_iter == 0 {
            return Err(ReportCardError::InvalidConfig(
                "max_iter must be at least 1".to_owned(),
            ));
        }
        if self.cv_folds < 2 {
            return Err(ReportCardError::InvalidConfig(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        Ok(())
    }
}

/// Coverage sweep, policy and plot-data settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub target_coverage: f64,
    pub n_thresholds: usize,
    pub max_threshold: f64,
    pub ece_bins: usize,
    pub histogram_bins: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            target_coverage: DEFAULT_TARGET_COVERAGE,
            n_thresholds: DEFAULT_THRESHOLD_COUNT,
            max_threshold: DEFAULT_MAX_THRESHOLD,
            ece_bins: DEFAULT_CALIBRATION_BINS,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn with_target_coverage(mut self, target_coverage: f64) -> Self {
        self.target_coverage = target_coverage;
        self
    }

    /// Threshold grid for the coverage sweep.
    #[must_use]
    pub fn thresholds(&self) -> Vec<f64> {
        metrics::linspace(0.0, self.max_threshold, self.n_thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_coverage > 0.0 && self.target_coverage < 1.0) {
            return Err(ReportCardError::InvalidTargetCoverage(self.target_coverage));
        }
        if self.n_thresholds == 0 || !(0.0..=1.0).contains(&self.max_threshold) {
            return Err(ReportCardError::InvalidConfig(format!(
                "threshold grid needs at least one point and a max in [0, 1], got {} points up to {}",
                self.n_thresholds, self.max_threshold
            )));
        }
        if self.ece_bins == 0 || self.histogram_bins == 0 {
            return Err(ReportCardError::InvalidConfig(
                "bin counts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub split: SplitConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    /// Explicit text column; auto-detected when unset.
    pub text_column: Option<String>,
    /// Explicit label column; auto-detected when unset.
    pub label_column: Option<String>,
}

impl PipelineConfig {
    /// Load a (possibly partial) configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ReportCardError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    #[must_use]
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split.seed = seed;
        self
    }

    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationMethod) -> Self {
        self.model.calibration = calibration;
        self
    }

    #[must_use]
    pub fn with_target_coverage(mut self, target_coverage: f64) -> Self {
        self.policy.target_coverage = target_coverage;
        self
    }

    #[must_use]
    pub fn with_text_column(mut self, column: Option<String>) -> Self {
        self.text_column = column;
        self
    }

    #[must_use]
    pub fn with_label_column(mut self, column: Option<String>) -> Self {
        self.label_column = column;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.features.word_params()?;
        self.features.char_params()?;
        self.model.validate()?;
        self.policy.validate()
    }
}

#[cfg(test)]
mod tests {
    use reliability_pre_processing::Analyzer;

    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.split.seed, 42);
        assert!((config.split.relative_val_size() - 0.25).abs() < 1e-12);
        assert_eq!(config.features.max_features, Some(60_000));
        assert!((config.model.c - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.model.max_iter, 2000);
        assert_eq!(config.model.cv_folds, 3);
        assert_eq!(config.model.calibration, CalibrationMethod::Sigmoid);
        assert!((config.policy.target_coverage - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.policy.thresholds().len(), 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"split": {"seed": 7}, "model": {"calibration": "isotonic"}, "text_column": "body"}"#,
        )
        .unwrap();
        assert_eq!(config.split.seed, 7);
        assert!((config.split.test_size - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.model.calibration, CalibrationMethod::Isotonic);
        assert_eq!(config.model.max_iter, 2000);
        assert_eq!(config.text_column.as_deref(), Some("body"));
        assert_eq!(config.label_column, None);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"policy": {"target_coverage": 0.85}}"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert!((config.policy.target_coverage - 0.85).abs() < f64::EPSILON);

        let missing = PipelineConfig::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ReportCardError::Io { .. })));
    }

    #[test]
    fn test_vectorizer_params_from_features() {
        let features = FeatureConfig::default().with_sublinear_tf(true);
        let word = features.word_params().unwrap();
        let chars = features.char_params().unwrap();
        assert_eq!(word.analyzer(), Analyzer::Word);
        assert_eq!(word.ngram_range(), (1, 2));
        assert_eq!(chars.analyzer(), Analyzer::Char);
        assert_eq!(chars.ngram_range(), (3, 5));
        assert!(chars.sublinear_tf());
        assert_eq!(chars.max_features(), Some(60_000));
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let config = PipelineConfig::default().with_target_coverage(1.0);
        assert!(matches!(
            config.validate(),
            Err(ReportCardError::InvalidTargetCoverage(_))
        ));

        let config = PipelineConfig::default().with_split(SplitConfig::default().with_sizes(0.5, 0.5));
        assert!(matches!(config.validate(), Err(ReportCardError::InvalidConfig(_))));

        let config = PipelineConfig::default().with_model(ModelConfig::default().with_cv_folds(1));
        assert!(config.validate().is_err());

        let mut features = FeatureConfig::default();
        features.word_ngram_range = (0, 2);
        let config = PipelineConfig::default().with_features(features);
        assert!(matches!(config.validate(), Err(ReportCardError::Vectorizer(_))));
    }
}
