mod count_vectorizer;
mod ngrams;
mod params;
mod tfidf_vectorizer;
mod tokenizer;

pub use params::{Analyzer, ParamsError, VectorizerParams};
pub use tfidf_vectorizer::TfidfVectorizer;
