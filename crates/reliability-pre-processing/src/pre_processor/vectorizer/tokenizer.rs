use std::{
    borrow::Cow,
    sync::LazyLock,
};

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator, ProgressStyle};
use rayon::prelude::*;
use regex::Regex;
use tracing::debug;

use super::params::{Analyzer, VectorizerParams};

/// Minimum number of texts to consider parallelization
const MIN_TEXTS_FOR_PARALLEL: usize = 100;

/// Minimum total character count to consider parallelization
const MIN_CHARS_FOR_PARALLEL: usize = 10_000;

static WORD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("word token pattern is valid"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\s+").expect("whitespace pattern is valid"));

fn progress_bar_setup(len: usize, message: impl Into<Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}

/// Split a single document into analyzer units.
///
/// Word units are tokens matching `\b\w\w+\b`. Char units are the individual
/// characters of the text after runs of whitespace are collapsed to one space.
fn analyze(text: &str, params: &VectorizerParams) -> Vec<String> {
    let text: Cow<'_, str> = if params.lowercase() {
        Cow::Owned(text.to_lowercase())
    } else {
        Cow::Borrowed(text)
    };

    match params.analyzer() {
        Analyzer::Word => WORD_TOKEN
            .find_iter(&text)
            .map(|m| m.as_str().to_owned())
            .collect(),
        Analyzer::Char => WHITESPACE_RUN
            .replace_all(&text, " ")
            .chars()
            .map(String::from)
            .collect(),
    }
}

fn tokenize_texts_par<T: AsRef<str> + Sync>(
    texts: &[T],
    params: &VectorizerParams,
) -> Vec<Vec<String>> {
    debug!(num_texts = texts.len(), analyzer = %params.analyzer(), "Using parallel tokenization");
    let pb = progress_bar_setup(texts.len(), "Tokenizing texts in parallel");
    let result = texts
        .par_iter()
        .progress_with(pb.clone())
        .map(|text| analyze(text.as_ref(), params))
        .collect();
    pb.finish_and_clear();
    result
}

fn tokenize_texts<T: AsRef<str>>(texts: &[T], params: &VectorizerParams) -> Vec<Vec<String>> {
    debug!(num_texts = texts.len(), analyzer = %params.analyzer(), "Using sequential tokenization");
    let pb = progress_bar_setup(texts.len(), "Tokenizing texts");

    let result = texts
        .iter()
        .progress_with(pb.clone())
        .map(|text| analyze(text.as_ref(), params))
        .collect();
    pb.finish_and_clear();
    result
}

/// Determine if parallel processing should be used based on workload characteristics.
///
/// Parallelization is beneficial when:
/// - There are many texts (>= 100), OR
/// - The total character count is large (>= 10,000 chars)
#[inline]
fn should_use_parallel<T: AsRef<str>>(texts: &[T]) -> bool {
    let num_texts = texts.len();

    if num_texts >= MIN_TEXTS_FOR_PARALLEL {
        return true;
    }

    // Estimate from the first 20 texts when there are more than that
    let total_chars: usize = if num_texts > 20 {
        let sample_chars: usize = texts.iter().take(20).map(|s| s.as_ref().len()).sum();
        (sample_chars * num_texts) / 20
    } else {
        texts.iter().map(|s| s.as_ref().len()).sum()
    };

    total_chars >= MIN_CHARS_FOR_PARALLEL
}

pub fn tokenize<T: AsRef<str> + Sync>(texts: &[T], params: &VectorizerParams) -> Vec<Vec<String>> {
    if should_use_parallel(texts) {
        tokenize_texts_par(texts, params)
    } else {
        tokenize_texts(texts, params)
    }
}
