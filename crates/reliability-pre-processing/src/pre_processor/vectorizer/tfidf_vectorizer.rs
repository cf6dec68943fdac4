use ahash::AHashMap as HashMap;
use sprs::CsMat;
use tracing::debug;

use super::{
    count_vectorizer::CountVectorizer,
    params::{ParamsError, VectorizerParams},
};

#[derive(Clone, Debug)]
pub struct TfidfVectorizer {
    count_vectorizer: CountVectorizer,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn fit<T: AsRef<str> + Sync>(
        texts: &[T],
        count_vectorizer_params: VectorizerParams,
    ) -> Result<Self, ParamsError> {
        Self::fit_transform(texts, count_vectorizer_params).map(|(vectorizer, _)| vectorizer)
    }

    /// Fit the vocabulary and IDF weights, returning the weighted training matrix.
    pub fn fit_transform<T: AsRef<str> + Sync>(
        texts: &[T],
        count_vectorizer_params: VectorizerParams,
    ) -> Result<(Self, CsMat<f64>), ParamsError> {
        debug!(num_texts = texts.len(), "Fitting TfidfVectorizer");
        let (count_vectorizer, tf_matrix) =
            CountVectorizer::fit_transform(texts, count_vectorizer_params)?;
        debug!("Calculating IDF values");

        // Calculate IDF: log((n_docs + 1) / (df + 1)) + 1
        let n_docs = texts.len() as f64;
        let num_features = count_vectorizer.num_features();

        let mut df = vec![0usize; num_features];
        for row_vec in tf_matrix.outer_iterator() {
            for (col_idx, _val) in row_vec.iter() {
                df[col_idx] += 1;
            }
        }
        let idf = df
            .iter()
            .map(|&doc_freq| ((n_docs + 1.0) / (doc_freq as f64 + 1.0)).ln() + 1.0)
            .collect();
        debug!("IDF calculation complete");

        let vectorizer = Self {
            count_vectorizer,
            idf,
        };
        let weighted = vectorizer.weight(tf_matrix);
        Ok((vectorizer, weighted))
    }

    pub fn transform<T: AsRef<str> + Sync>(&self, texts: &[T]) -> CsMat<f64> {
        debug!(
            num_texts = texts.len(),
            "Transforming texts using TfidfVectorizer"
        );
        self.weight(self.count_vectorizer.transform(texts))
    }

    /// Apply sublinear tf (if enabled), IDF and L2 row normalization to raw counts.
    fn weight(&self, mut tf_matrix: CsMat<f64>) -> CsMat<f64> {
        let sublinear = self.count_vectorizer.params().sublinear_tf();

        for mut row_vec in tf_matrix.outer_iterator_mut() {
            for (col_idx, val) in row_vec.iter_mut() {
                if sublinear {
                    *val = 1.0 + val.ln();
                }
                *val *= self.idf[col_idx];
            }
            let norm = row_vec.iter().map(|(_, &v)| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, val) in row_vec.iter_mut() {
                    *val /= norm;
                }
            }
        }
        tf_matrix
    }

    pub fn num_features(&self) -> usize {
        self.count_vectorizer.num_features()
    }

    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        self.count_vectorizer.vocabulary()
    }

    pub fn params(&self) -> &VectorizerParams {
        self.count_vectorizer.params()
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }
}
