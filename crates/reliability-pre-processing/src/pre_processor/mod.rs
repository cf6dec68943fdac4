//! Pre-processing module for the reliability report card.
//!
//! This module provides text vectorization using TF-IDF with word or character n-grams.

mod vectorizer;

pub use vectorizer::{Analyzer, ParamsError, TfidfVectorizer, VectorizerParams};
