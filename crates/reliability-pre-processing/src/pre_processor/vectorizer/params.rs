use std::{fmt, ops::RangeInclusive};

/// Errors raised when vectorizer parameters cannot produce a usable vocabulary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("ngram_range must be non-empty with a lower bound of at least 1, got {0}..={1}")]
    InvalidNgramRange(usize, usize),
    #[error("min_df must be positive (proportion in (0.0, 1.0) or absolute count >= 1.0), got {0}")]
    InvalidMinDf(f64),
    #[error("max_df must be positive (proportion in (0.0, 1.0] or absolute count > 1.0), got {0}")]
    InvalidMaxDf(f64),
    #[error("max_features must be at least 1")]
    InvalidMaxFeatures,
    #[error("max_df corresponds to fewer documents than min_df")]
    DfBoundsCrossed,
    #[error("empty vocabulary: no n-gram survived document frequency filtering")]
    EmptyVocabulary,
}

/// How raw text is split into the units that n-grams are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Analyzer {
    /// Word tokens (runs of two or more word characters), n-grams joined by a space.
    Word,
    /// Single characters after whitespace normalization, n-grams concatenated.
    Char,
}

impl Analyzer {
    pub(crate) fn separator(self) -> &'static str {
        match self {
            Self::Word => " ",
            Self::Char => "",
        }
    }
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word => write!(f, "word"),
            Self::Char => write!(f, "char"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorizerParams {
    analyzer: Analyzer,
    ngram_range: Vec<usize>,
    /// Minimum document frequency for filtering vocabulary.
    /// - If `min_df` is in (0.0, 1.0), it's a proportion of documents
    /// - If `min_df` >= 1.0, it's an absolute document count
    min_df: f64,
    /// Maximum document frequency for filtering vocabulary.
    /// - If `max_df` is in (0.0, 1.0], it's a proportion of documents
    /// - If `max_df` > 1.0, it's an absolute document count
    max_df: f64,
    /// Keep only the `max_features` terms with the highest corpus frequency.
    max_features: Option<usize>,
    /// Apply sublinear tf scaling: replace term frequency `tf` with `1 + log(tf)`.
    /// This reduces the impact of terms that occur many times in a document.
    sublinear_tf: bool,
    lowercase: bool,
}

impl VectorizerParams {
    pub fn new(
        analyzer: Analyzer,
        ngram_range: impl Into<RangeInclusive<usize>>,
    ) -> Result<Self, ParamsError> {
        let range = ngram_range.into();
        let (lo, hi) = (*range.start(), *range.end());
        let n_sizes = range.collect::<Vec<_>>();
        if n_sizes.is_empty() || lo == 0 {
            return Err(ParamsError::InvalidNgramRange(lo, hi));
        }
        Ok(Self {
            analyzer,
            ngram_range: n_sizes,
            ..Self::default()
        })
    }

    /// Word n-grams, e.g. `VectorizerParams::word(1..=2)`.
    pub fn word(ngram_range: impl Into<RangeInclusive<usize>>) -> Result<Self, ParamsError> {
        Self::new(Analyzer::Word, ngram_range)
    }

    /// Character n-grams, e.g. `VectorizerParams::char(3..=5)`.
    pub fn char(ngram_range: impl Into<RangeInclusive<usize>>) -> Result<Self, ParamsError> {
        Self::new(Analyzer::Char, ngram_range)
    }

    #[must_use]
    pub fn with_min_df(mut self, min_df: f64) -> Self {
        self.min_df = min_df;
        self
    }

    #[must_use]
    pub fn with_max_df(mut self, max_df: f64) -> Self {
        self.max_df = max_df;
        self
    }

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

    #[must_use]
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Checks the document-frequency and feature bounds.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.min_df > 0.0) {
            return Err(ParamsError::InvalidMinDf(self.min_df));
        }
        if !(self.max_df > 0.0) {
            return Err(ParamsError::InvalidMaxDf(self.max_df));
        }
        if self.max_features == Some(0) {
            return Err(ParamsError::InvalidMaxFeatures);
        }
        Ok(())
    }

    /// Resolve `(min_df, max_df)` into absolute document counts for a corpus of `n_docs`.
    pub(crate) fn df_bounds(&self, n_docs: usize) -> (f64, f64) {
        let n = n_docs as f64;
        let min = if self.min_df < 1.0 {
            self.min_df * n
        } else {
            self.min_df
        };
        let max = if self.max_df <= 1.0 {
            self.max_df * n
        } else {
            self.max_df
        };
        (min, max)
    }

    #[must_use]
    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    #[must_use]
    pub fn ngram_counts(&self) -> &[usize] {
        &self.ngram_range
    }

    #[must_use]
    pub fn ngram_range(&self) -> (usize, usize) {
        (
            self.ngram_range.first().copied().unwrap_or(1),
            self.ngram_range.last().copied().unwrap_or(1),
        )
    }

    #[must_use]
    pub fn min_df(&self) -> f64 {
        self.min_df
    }

    #[must_use]
    pub fn max_df(&self) -> f64 {
        self.max_df
    }

    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    #[must_use]
    pub fn sublinear_tf(&self) -> bool {
        self.sublinear_tf
    }

    #[must_use]
    pub fn lowercase(&self) -> bool {
        self.lowercase
    }
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            analyzer: Analyzer::Word,
            ngram_range: vec![1],
            min_df: 1.0,
            max_df: 1.0,
            max_features: None,
            sublinear_tf: false,
            lowercase: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_lower_bound() {
        assert_eq!(
            VectorizerParams::word(0..=2),
            Err(ParamsError::InvalidNgramRange(0, 2))
        );
    }

    #[test]
    fn test_rejects_empty_range() {
        #[allow(clippy::reversed_empty_ranges)]
        let result = VectorizerParams::char(5..=3);
        assert!(matches!(result, Err(ParamsError::InvalidNgramRange(5, 3))));
    }

    #[test]
    fn test_df_bounds_proportion_and_absolute() {
        let params = VectorizerParams::word(1..=1).unwrap().with_min_df(0.1).with_max_df(0.5);
        let (min, max) = params.df_bounds(20);
        assert!((min - 2.0).abs() < 1e-9);
        assert!((max - 10.0).abs() < 1e-9);

        let params = VectorizerParams::word(1..=1).unwrap().with_min_df(3.0).with_max_df(7.0);
        assert_eq!(params.df_bounds(20), (3.0, 7.0));
    }

    #[test]
    fn test_validate() {
        let params = VectorizerParams::char(3..=5).unwrap();
        assert!(params.validate().is_ok());
        assert_eq!(params.ngram_range(), (3, 5));
        assert_eq!(params.ngram_counts(), &[3, 4, 5]);
        assert!(params.clone().with_min_df(0.0).validate().is_err());
        assert!(params.clone().with_max_df(-1.0).validate().is_err());
        assert_eq!(
            params.with_max_features(Some(0)).validate(),
            Err(ParamsError::InvalidMaxFeatures)
        );
    }
}
