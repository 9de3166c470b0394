/// ONNX Runtime inference using the `ort` crate.
///
/// [`EncoderSession`] wraps a BERT-family ONNX export together with its
/// tokenizer. [`OnnxEmbedder`] uses it for BGE-small (CLS pooling, then L2
/// normalization); the cross-encoder reranker reuses it for pair scoring.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::tokenizer::{BertTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError, l2_normalize};

/// Output width of bge-small-en-v1.5.
pub const BGE_SMALL_DIMENSIONS: usize = 384;

/// A loaded ONNX encoder plus the tokenizer it was trained with.
pub struct EncoderSession {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
}

impl EncoderSession {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Loading ONNX model from {}", model_dir.display());

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .with_inter_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    pub fn tokenizer(&self) -> &BertTokenizer {
        &self.tokenizer
    }

    /// Run the model on one encoded sequence and return the first output,
    /// flattened, with its shape.
    pub fn run(&self, tokens: &TokenizerOutput) -> Result<(Vec<i64>, Vec<f32>), EmbedderError> {
        let seq_len = tokens.len();
        if seq_len == 0 {
            return Err(EmbedderError::EmptyInput);
        }

        // (shape, data) tuples avoid coupling to an ndarray version.
        let input_ids = Tensor::from_array(([1usize, seq_len], tokens.input_ids.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask = Tensor::from_array(([1usize, seq_len], tokens.attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array(([1usize, seq_len], tokens.token_type_ids.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

/// BGE embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    encoder: EncoderSession,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load a BGE-small model from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        Ok(Self {
            encoder: EncoderSession::load(model_dir)?,
            dimensions: BGE_SMALL_DIMENSIONS,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if text.trim().is_empty() {
            return Err(EmbedderError::EmptyInput);
        }

        let tokens = self.encoder.tokenizer().tokenize(text)?;
        let (shape, hidden) = self.encoder.run(&tokens)?;

        // last_hidden_state: [1, seq_len, hidden_size]
        let hidden_size = shape.last().copied().unwrap_or(0) as usize;
        if hidden_size != self.dimensions {
            return Err(EmbedderError::InferenceFailed(format!(
                "model produced {hidden_size} dimensions, expected {}",
                self.dimensions
            )));
        }

        let mut embedding = cls_pooling(&hidden, hidden_size);
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

/// Take the hidden state of the first (`[CLS]`) token.
///
/// `hidden_data` is a flat array with shape `[1, seq_len, hidden_size]`.
fn cls_pooling(hidden_data: &[f32], hidden_size: usize) -> Vec<f32> {
    hidden_data.iter().take(hidden_size).copied().collect()
}
