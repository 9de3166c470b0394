/// Mock embedder for tests and offline runs.
///
/// Hashes lower-cased word and identifier-fragment tokens into a fixed
/// number of buckets, so texts sharing vocabulary end up close together.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError, identifier_tokens, l2_normalize};

/// A deterministic bag-of-words embedder.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = identifier_tokens(text);
        if tokens.is_empty() {
            return Err(EmbedderError::EmptyInput);
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            embedding[bucket] += 1.0;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
