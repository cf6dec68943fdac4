use ahash::AHashMap as HashMap;
use sprs::CsMat;
use tracing::debug;

use super::{
    ngrams::{self, TermStats},
    params::{ParamsError, VectorizerParams},
    tokenizer,
};

#[derive(Clone, Debug)]
pub struct CountVectorizer {
    params: VectorizerParams,
    /// Vocabulary mapping n-gram text to feature index, indices in sorted n-gram order
    vocab: HashMap<String, usize>,
}

impl CountVectorizer {
    /// Count n-grams for every document once, reusing the counts for both
    /// vocabulary building and transformation.
    fn ngram_counts<T: AsRef<str> + Sync>(
        texts: &[T],
        params: &VectorizerParams,
    ) -> Vec<HashMap<String, usize>> {
        let tokenized_texts = tokenizer::tokenize(texts, params);
        debug!("Computing n-grams for all documents");
        ngrams::count_ngrams_batch(
            &tokenized_texts,
            params.ngram_counts(),
            params.analyzer().separator(),
        )
    }

    /// Internal method to fit from pre-computed per-document n-gram counts.
    fn fit_from_counts(
        ngram_maps: &[HashMap<String, usize>],
        params: VectorizerParams,
    ) -> Result<Self, ParamsError> {
        debug!("Building vocabulary from n-gram counts");
        let vocab_stats = ngrams::build_vocabulary(ngram_maps);
        let vocab_size = vocab_stats.len();

        let (min_count, max_count) = params.df_bounds(ngram_maps.len());
        if max_count < min_count {
            return Err(ParamsError::DfBoundsCrossed);
        }

        debug!(min_df = params.min_df(), max_df = params.max_df(), "Applying df filtering");
        let mut kept = vocab_stats
            .into_iter()
            .filter(|(_, stats)| {
                let df = stats.df as f64;
                df >= min_count && df <= max_count
            })
            .collect::<Vec<(String, TermStats)>>();
        debug!(
            original_size = vocab_size,
            filtered_size = kept.len(),
            "Vocabulary filtered by document frequency"
        );

        if let Some(limit) = params.max_features() {
            if kept.len() > limit {
                // Highest corpus frequency first, ties alphabetical
                kept.sort_by(|(a_term, a), (b_term, b)| {
                    b.tf.cmp(&a.tf).then_with(|| a_term.cmp(b_term))
                });
                kept.truncate(limit);
                debug!(max_features = limit, "Vocabulary truncated to max_features");
            }
        }

        if kept.is_empty() {
            return Err(ParamsError::EmptyVocabulary);
        }

        let mut sorted_terms = kept.into_iter().map(|(term, _)| term).collect::<Vec<_>>();
        sorted_terms.sort();
        let vocab = sorted_terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect::<HashMap<String, usize>>();

        debug!(vocab_size = vocab.len(), "CountVectorizer fitting complete");

        Ok(Self { params, vocab })
    }

    pub fn transform<T: AsRef<str> + Sync>(&self, texts: &[T]) -> CsMat<f64> {
        debug!(
            num_texts = texts.len(),
            "Transforming texts using CountVectorizer"
        );
        let ngram_maps = Self::ngram_counts(texts, &self.params);
        self.transform_from_counts(&ngram_maps)
    }

    /// Build the CSR count matrix from pre-computed n-gram counts.
    fn transform_from_counts(&self, ngram_maps: &[HashMap<String, usize>]) -> CsMat<f64> {
        let mut indptr = Vec::with_capacity(ngram_maps.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();

        indptr.push(0);

        for ngrams in ngram_maps {
            let mut row_entries = ngrams
                .iter()
                .filter_map(|(ngram, &count)| {
                    self.vocab
                        .get(ngram)
                        .map(|&col_idx| (col_idx, count as f64))
                })
                .collect::<Vec<_>>();

            row_entries.sort_by_key(|(col_idx, _)| *col_idx);
            for (col_idx, count) in row_entries {
                indices.push(col_idx);
                data.push(count);
            }
            indptr.push(indices.len());
        }

        debug!(
            non_zero_entries = data.len(),
            "Text transformation complete"
        );
        CsMat::new((ngram_maps.len(), self.num_features()), indptr, indices, data)
    }

    /// Tokenizes once and computes n-grams once, then reuses them for both
    /// vocabulary building and transformation.
    pub fn fit_transform<T: AsRef<str> + Sync>(
        texts: &[T],
        params: VectorizerParams,
    ) -> Result<(Self, CsMat<f64>), ParamsError> {
        params.validate()?;
        debug!(
            num_texts = texts.len(),
            analyzer = %params.analyzer(),
            "Fitting CountVectorizer"
        );

        let ngram_maps = Self::ngram_counts(texts, &params);
        let vectorizer = Self::fit_from_counts(&ngram_maps, params)?;
        let transformed = vectorizer.transform_from_counts(&ngram_maps);
        Ok((vectorizer, transformed))
    }

    pub fn num_features(&self) -> usize {
        self.vocab.len()
    }

    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocab
    }

    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(texts: &[&str], params: VectorizerParams) -> Result<CountVectorizer, ParamsError> {
        CountVectorizer::fit_transform(texts, params).map(|(vectorizer, _)| vectorizer)
    }

    #[test]
    fn test_vocabulary_is_sorted_and_dense() {
        let texts = ["beta alpha", "gamma alpha"];
        let vectorizer = fit(&texts, VectorizerParams::word(1..=1).unwrap()).unwrap();
        let vocab = vectorizer.vocabulary();
        assert_eq!(vocab["alpha"], 0);
        assert_eq!(vocab["beta"], 1);
        assert_eq!(vocab["gamma"], 2);
    }

    #[test]
    fn test_counts_match_occurrences() {
        let texts = ["spam spam eggs"];
        let (vectorizer, counts) =
            CountVectorizer::fit_transform(&texts, VectorizerParams::word(1..=1).unwrap()).unwrap();
        assert_eq!(counts.rows(), 1);
        assert_eq!(counts.cols(), vectorizer.num_features());
        let spam = vectorizer.vocabulary()["spam"];
        assert_eq!(counts.get(0, spam).copied(), Some(2.0));
    }

    #[test]
    fn test_min_df_filters_rare_terms() {
        let texts = ["shared rare", "shared other", "shared"];
        let params = VectorizerParams::word(1..=1).unwrap().with_min_df(2.0);
        let vectorizer = fit(&texts, params).unwrap();
        assert_eq!(vectorizer.num_features(), 1);
        assert!(vectorizer.vocabulary().contains_key("shared"));
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let texts = ["common common common rare", "common other"];
        let params = VectorizerParams::word(1..=1)
            .unwrap()
            .with_max_features(Some(2));
        let vectorizer = fit(&texts, params).unwrap();
        let vocab = vectorizer.vocabulary();
        assert_eq!(vocab.len(), 2);
        assert!(vocab.contains_key("common"));
        // "other" and "rare" tie on frequency; alphabetical order keeps "other"
        assert!(vocab.contains_key("other"));
    }

    #[test]
    fn test_unknown_terms_are_ignored_on_transform() {
        let vectorizer =
            fit(&["known words"], VectorizerParams::word(1..=1).unwrap()).unwrap();
        let counts = vectorizer.transform(&["entirely unseen"]);
        assert_eq!(counts.nnz(), 0);
    }

    #[test]
    fn test_empty_vocabulary_is_an_error() {
        let result = fit(&["a b c"], VectorizerParams::word(1..=1).unwrap());
        assert_eq!(result.err(), Some(ParamsError::EmptyVocabulary));
    }
}
