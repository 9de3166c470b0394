/// BERT-style tokenizer wrapper around HuggingFace `tokenizers`.
///
/// Encodes single texts for the embedding model and `(query, passage)`
/// pairs for the cross-encoder reranker.
use std::path::Path;

use tokenizers::{Encoding, Tokenizer, TruncationParams};

use super::EmbedderError;

/// Maximum sequence length shared by BGE-small and MiniLM cross-encoders.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Model inputs for one encoded sequence.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    /// Segment ids: 0 for the first sequence, 1 for the second of a pair.
    pub token_type_ids: Vec<i64>,
}

impl TokenizerOutput {
    fn from_encoding(encoding: &Encoding) -> Self {
        let widen = |xs: &[u32]| xs.iter().map(|&x| i64::from(x)).collect::<Vec<i64>>();
        Self {
            input_ids: widen(encoding.get_ids()),
            attention_mask: widen(encoding.get_attention_mask()),
            token_type_ids: widen(encoding.get_type_ids()),
        }
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

pub struct BertTokenizer {
    inner: Tokenizer,
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory, truncating to
    /// [`MAX_SEQUENCE_LENGTH`] tokens.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, EmbedderError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(EmbedderError::TokenizerError(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to load tokenizer: {e}")))?;
        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::TokenizerError(format!("bad truncation config: {e}")))?;
        // Sequences run one at a time, so no padding.
        inner.with_padding(None);

        Ok(Self { inner })
    }

    pub fn tokenize(&self, text: &str) -> Result<TokenizerOutput, EmbedderError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to encode text: {e}")))?;
        Ok(TokenizerOutput::from_encoding(&encoding))
    }

    /// Encode a `(first, second)` pair with separator and segment ids.
    pub fn tokenize_pair(&self, first: &str, second: &str) -> Result<TokenizerOutput, EmbedderError> {
        let encoding = self
            .inner
            .encode((first, second), true)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to encode pair: {e}")))?;
        Ok(TokenizerOutput::from_encoding(&encoding))
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Requires the downloaded model files.
    /// Run with: cargo test tokenizer -- --ignored
    #[test]
    #[ignore]
    fn test_tokenize_pair_with_real_model() {
        let model_dir = Path::new("models/ms-marco-MiniLM-L-6-v2");
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(model_dir).unwrap();
        let output = tokenizer.tokenize_pair("where is config parsed", "def parse_config(): ...").unwrap();

        assert_eq!(output.len(), output.attention_mask.len());
        assert_eq!(output.len(), output.token_type_ids.len());
        assert!(output.token_type_ids.contains(&1));
    }

    #[test]
    #[ignore]
    fn test_tokenize_truncates_long_input() {
        let model_dir = Path::new("models/bge-small-en-v1.5");
        if !model_dir.join("tokenizer.json").exists() {
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(model_dir).unwrap();
        let output = tokenizer.tokenize(&"token ".repeat(5000)).unwrap();
        assert_eq!(output.len(), MAX_SEQUENCE_LENGTH);
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"));
        assert!(matches!(result, Err(EmbedderError::TokenizerError(_))));
    }
}
