use ahash::AHashMap as HashMap;
use dashmap::DashMap;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

/// Corpus-level statistics for one n-gram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    /// Number of documents containing the n-gram.
    pub df: usize,
    /// Total occurrences across the corpus.
    pub tf: usize,
}

pub fn count_ngrams(
    tokens: &[String],
    ngram_range: &[usize],
    separator: &str,
) -> HashMap<String, usize> {
    let mut ngram_counter = HashMap::new();

    for &n in ngram_range {
        for window in tokens.windows(n) {
            *ngram_counter.entry(window.join(separator)).or_insert(0) += 1;
        }
    }
    ngram_counter
}

pub fn count_ngrams_batch(
    tokenized_texts: &[Vec<String>],
    ngram_range: &[usize],
    separator: &str,
) -> Vec<HashMap<String, usize>> {
    tokenized_texts
        .par_iter()
        .map(|tokens| count_ngrams(tokens, ngram_range, separator))
        .collect()
}

pub fn build_vocabulary(
    ngram_maps: &[HashMap<String, usize>],
) -> DashMap<String, TermStats, ahash::RandomState> {
    let vocab = DashMap::with_hasher(ahash::RandomState::default());

    ngram_maps.par_iter().progress().for_each(|ngrams| {
        for (ngram, &count) in ngrams {
            let mut stats = vocab.entry(ngram.clone()).or_insert_with(TermStats::default);
            stats.df += 1;
            stats.tf += count;
        }
    });
    vocab
}
