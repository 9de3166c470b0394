/// Embedder trait and shared types for text embedding.
///
/// Providers: [`mock::MockEmbedder`] (deterministic, offline),
/// [`onnx::OnnxEmbedder`] (local BGE model) and [`http::HttpEmbedder`]
/// (OpenAI-compatible endpoint). [`batch`] adds batching and bounded retry
/// on top of any of them.
pub mod batch;
pub mod download;
pub mod http;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    /// The provider asked us to slow down; `retry_after` is its hint.
    #[error("rate limited by embedding provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("empty input")]
    EmptyInput,
}

impl EmbedderError {
    /// Whether waiting and trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedderError::RateLimited { .. })
    }
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in vec.iter_mut() {
            *v *= inv;
        }
    }
}

/// Split text into lower-case tokens, breaking `snake_case` and
/// `camelCase` identifiers into their parts.
pub(crate) fn identifier_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_only_rate_limits_are_retryable() {
        assert!(EmbedderError::RateLimited { retry_after: None }.is_retryable());
        assert!(!EmbedderError::Http("500".into()).is_retryable());
        assert!(!EmbedderError::EmptyInput.is_retryable());
    }

    #[test]
    fn test_tokens_split_identifiers() {
        assert_eq!(
            identifier_tokens("parseConfig load_file HTTPServer v2"),
            vec!["parse", "config", "load", "file", "httpserver", "v2"]
        );
    }
}
