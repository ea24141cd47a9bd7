//! Statistical text embeddings for semantic recall.
//!
//! TF-IDF bag-of-words over a corpus-derived vocabulary. Modest accuracy by
//! design: zero network calls, zero marginal cost, and the public surface
//! stays model-shaped so a learned embedding can replace it without touching
//! callers.
//!
//! # Pipeline
//!
//! ```text
//! text → tokenize → tf(term) × idf(term) per vocabulary dimension
//!      → L2-normalize → 768-dim f32
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::{Result, RetrievalError};
use crate::types::tokenize;

/// Output embedding dimensions; also the vocabulary size cap.
pub const EMBEDDING_DIM: usize = 768;

/// Minimum token length on the embedding path.
const MIN_TOKEN_LEN: usize = 3;

/// A corpus-derived term weighting scheme.
///
/// Immutable once built; [`EmbeddingModel`] swaps whole instances behind an
/// `Arc` so concurrent readers never observe a half-updated vocabulary.
#[derive(Debug)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl Vocabulary {
    fn build(documents: &[String]) -> Self {
        let total_docs = documents.len();

        // Document frequency per distinct term, counting each term once per
        // document. The sequence number records first-seen corpus order and
        // breaks document-frequency ties deterministically.
        let mut df: HashMap<String, (usize, usize)> = HashMap::new();
        for doc in documents {
            let mut seen: HashSet<String> = HashSet::new();
            for term in tokenize(doc, MIN_TOKEN_LEN) {
                if seen.insert(term.clone()) {
                    let seq = df.len();
                    df.entry(term).or_insert((0, seq)).0 += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = df
            .into_iter()
            .map(|(term, (count, seq))| (term, count, seq))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(EMBEDDING_DIM);

        let mut terms = Vec::with_capacity(ranked.len());
        let mut index = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (dim, (term, count, _)) in ranked.into_iter().enumerate() {
            idf.push((total_docs.max(1) as f32 / count as f32).ln());
            index.insert(term.clone(), dim);
            terms.push(term);
        }

        Self { terms, index, idf }
    }

    /// Number of terms (≤ 768).
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Shared embedding model with an atomically swappable vocabulary.
#[derive(Debug, Default)]
pub struct EmbeddingModel {
    vocabulary: RwLock<Option<Arc<Vocabulary>>>,
}

impl EmbeddingModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the vocabulary from a corpus snapshot.
    ///
    /// An empty corpus is a warned no-op: a transient empty batch must not
    /// wipe a usable vocabulary.
    pub fn build_vocabulary(&self, documents: &[String]) {
        if documents.is_empty() {
            warn!("build_vocabulary called with an empty corpus; keeping existing vocabulary");
            return;
        }
        let vocab = Arc::new(Vocabulary::build(documents));
        info!(
            documents = documents.len(),
            terms = vocab.len(),
            "vocabulary rebuilt"
        );
        match self.vocabulary.write() {
            Ok(mut slot) => *slot = Some(vocab),
            Err(poisoned) => *poisoned.into_inner() = Some(vocab),
        }
    }

    /// Embed a text string under the current vocabulary.
    ///
    /// The result is L2-normalized, or the all-zero vector when no
    /// vocabulary term appears in the text.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::VocabularyNotBuilt`] if no vocabulary has been
    /// built yet.
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let vocab = self.current().ok_or(RetrievalError::VocabularyNotBuilt)?;

        let mut tf: HashMap<String, f32> = HashMap::new();
        for token in tokenize(text, MIN_TOKEN_LEN) {
            *tf.entry(token).or_insert(0.0) += 1.0;
        }

        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        for (term, count) in &tf {
            if let Some(&dim) = vocab.index.get(term.as_str()) {
                embedding[dim] = count * vocab.idf[dim];
            }
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    /// Whether a vocabulary has been built.
    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Number of terms in the current vocabulary (0 when none is built).
    pub fn vocabulary_size(&self) -> usize {
        self.current().map_or(0, |v| v.len())
    }

    fn current(&self) -> Option<Arc<Vocabulary>> {
        match self.vocabulary.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// L2-normalize in place; the zero vector stays zero.
fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < 1e-12 {
        return;
    }
    for x in vec {
        *x /= norm;
    }
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have equal length");
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < 1e-12 {
        return 0.0;
    }
    dot / denom
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| (*t).to_owned()).collect()
    }

    #[test]
    fn embedding_dim_constant() {
        assert_eq!(EMBEDDING_DIM, 768);
    }

    #[test]
    fn generate_before_build_errors() {
        let model = EmbeddingModel::new();
        let err = model.generate_embedding("anything").unwrap_err();
        assert!(matches!(err, RetrievalError::VocabularyNotBuilt));
    }

    #[test]
    fn embeddings_are_unit_length() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&[
            "sprint planning code review",
            "database migration schema design",
        ]));
        let v = model.generate_embedding("sprint schema").expect("embed");
        assert_eq!(v.len(), EMBEDDING_DIM);
        let sq_sum: f32 = v.iter().map(|x| x * x).sum();
        assert!((sq_sum - 1.0).abs() < 1e-5, "sum of squares = {sq_sum}");
    }

    #[test]
    fn unmatched_text_embeds_to_zero_vector() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&["sprint planning code review"]));
        let v = model.generate_embedding("zzz qqq").expect("embed");
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn empty_corpus_is_a_noop() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&["alpha beta gamma"]));
        let before = model.generate_embedding("alpha").expect("embed");

        model.build_vocabulary(&[]);
        assert!(model.is_ready());
        let after = model.generate_embedding("alpha").expect("embed");
        assert_eq!(before, after);
    }

    #[test]
    fn empty_corpus_before_any_build_leaves_model_unready() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&[]);
        assert!(!model.is_ready());
        assert_eq!(model.vocabulary_size(), 0);
    }

    #[test]
    fn embedding_is_deterministic() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&[
            "authentication security tokens",
            "database migration schema design",
        ]));
        let a = model.generate_embedding("security schema").expect("embed");
        let b = model.generate_embedding("security schema").expect("embed");
        assert_eq!(a, b);
    }

    #[test]
    fn frequent_terms_get_lower_idf_weight() {
        // "shared" appears in both documents (idf = ln(2/2) = 0), "rare"
        // in one (idf = ln(2) > 0), so only the rare dimension survives.
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&["shared rare", "shared other"]));
        let v = model.generate_embedding("shared rare").expect("embed");
        let nonzero = v.iter().filter(|&&x| x != 0.0).count();
        assert_eq!(nonzero, 1);
    }

    #[test]
    fn vocabulary_caps_at_embedding_dim() {
        let doc: String = (0..1000)
            .map(|i| format!("term{i:04}"))
            .collect::<Vec<_>>()
            .join(" ");
        let model = EmbeddingModel::new();
        model.build_vocabulary(&[doc]);
        assert_eq!(model.vocabulary_size(), EMBEDDING_DIM);
    }

    #[test]
    fn similar_texts_are_closer_than_unrelated_ones() {
        let model = EmbeddingModel::new();
        model.build_vocabulary(&docs(&[
            "sprint planning code review",
            "database migration schema design",
            "authentication security tokens",
        ]));
        let query = model.generate_embedding("sprint code").expect("embed");
        let close = model
            .generate_embedding("sprint planning code review")
            .expect("embed");
        let far = model
            .generate_embedding("authentication security tokens")
            .expect("embed");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn cosine_similarity_identical_and_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let mut v = vec![0.0f32; 8];
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
