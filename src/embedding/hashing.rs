//! Feature-hashing embedder
//!
//! Deterministic, dependency-free text vectorizer. Identical text always
//! yields an identical vector, which keeps retrieval reproducible in
//! tests and offline environments.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::embedding::Embedder;
use crate::error::{CognateError, Result};

/// Embedder using the hashing trick over unigrams and bigrams
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// `dimensions` must be > 0; `embed` fails on a zero-dimension
    /// embedder rather than panicking.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Hash a token to a dimension index
    fn bucket(token: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    /// Sign for feature hashing, so collisions partially cancel
    fn sign(token: &str) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        format!("{}#sign", token).hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

/// Tokenize text into lowercase alphanumeric words of length > 1
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 1)
        .map(String::from)
        .collect()
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(CognateError::Config(
                "embedding dimension must be > 0".into(),
            ));
        }

        let tokens = tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        // Term frequencies, dampened so long texts don't dominate.
        // BTreeMap keeps accumulation order fixed: colliding buckets
        // sum in the same order every call, so identical text yields a
        // bitwise-identical vector.
        let mut tf: BTreeMap<&str, f32> = BTreeMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (token, count) in tf {
            let weight = (1.0 + count / doc_len).ln();
            let idx = Self::bucket(token, self.dimensions);
            embedding[idx] += weight * Self::sign(token);
        }

        // Bigrams capture word order at half weight
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            let idx = Self::bucket(&bigram, self.dimensions);
            embedding[idx] += 0.5 * Self::sign(&bigram);
        }

        // L2 normalize so cosine reduces to a dot product
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "feature-hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(384);
        let e1 = embedder.embed("what is the capital of france").unwrap();
        let e2 = embedder.embed("what is the capital of france").unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_deterministic_under_bucket_collisions() {
        // Two buckets force nearly every token to collide; the sums
        // must still come out bitwise-identical on every call
        let embedder = HashEmbedder::new(2);
        let text = "many distinct tokens all crowding into very few buckets here";
        let first = embedder.embed(text).unwrap();
        for _ in 0..16 {
            assert_eq!(embedder.embed(text).unwrap(), first);
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let embedder = HashEmbedder::new(0);
        assert!(embedder.embed("anything").is_err());
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed("what is the capital of france").unwrap();
        let on_topic = embedder.embed("paris is the capital of france").unwrap();
        let off_topic = embedder.embed("thermodynamics of stellar cores").unwrap();

        assert!(
            cosine_similarity(&query, &on_topic) > cosine_similarity(&query, &off_topic),
            "on-topic text should score higher"
        );
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(384);
        let e = embedder.embed("").unwrap();
        assert_eq!(e.len(), 384);
        assert!(e.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_normalized() {
        let embedder = HashEmbedder::new(384);
        let e = embedder.embed("a reasonably long sentence for norms").unwrap();
        let norm: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
