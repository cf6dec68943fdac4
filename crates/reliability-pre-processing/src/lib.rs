//! Text vectorization for the reliability report card.
//!
//! Provides count and TF-IDF vectorizers over word-level and character-level
//! n-grams. Output matrices are CSR (`sprs::CsMat<f64>`), one row per document.

pub mod pre_processor;

pub use pre_processor::{Analyzer, ParamsError, TfidfVectorizer, VectorizerParams};
