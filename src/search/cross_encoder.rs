//! ONNX cross-encoder relevance scorer (e.g. `ms-marco-MiniLM-L-6-v2`).

use std::path::Path;

use tracing::info;

use super::rerank::RelevanceScorer;
use crate::embedder::EmbedderError;
use crate::embedder::onnx::EncoderSession;
use crate::error::Result;

pub struct CrossEncoderScorer {
    encoder: EncoderSession,
}

impl CrossEncoderScorer {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let encoder = EncoderSession::load(model_dir)?;
        info!("Cross-encoder loaded from {}", model_dir.display());
        Ok(Self { encoder })
    }
}

/// Relevance logit from a `[1, labels]` output: the single logit of a
/// regression head, or the positive class of a two-label head.
fn relevance_logit(shape: &[i64], logits: &[f32]) -> std::result::Result<f32, EmbedderError> {
    let labels = shape.last().copied().unwrap_or(1).max(1) as usize;
    logits
        .get(labels - 1)
        .copied()
        .ok_or_else(|| EmbedderError::InferenceFailed("cross-encoder returned no logits".into()))
}

impl RelevanceScorer for CrossEncoderScorer {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            let tokens = self
                .encoder
                .tokenizer()
                .tokenize_pair(query, &format!("passage: {passage}"))?;
            let (shape, logits) = self.encoder.run(&tokens)?;
            scores.push(relevance_logit(&shape, &logits)?);
        }
        Ok(scores)
    }
}
