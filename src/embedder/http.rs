//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::debug;

use super::{Embedder, EmbedderError};

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeds text by POSTing `{"model", "input"}` to an HTTP endpoint.
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            dimensions,
            timeout: Duration::from_secs(60),
        }
    }

    /// Send `Authorization: Bearer <key>` with each request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn post(&self, texts: &[&str]) -> Result<Response, EmbedderError> {
        // The blocking client owns a runtime, so it lives only for this call.
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbedderError::Http(format!("client build failed: {e}")))?;

        let mut request = client.post(&self.endpoint).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request
            .send()
            .map_err(|e| EmbedderError::Http(format!("request to {} failed: {e}", self.endpoint)))
    }
}

/// Parse a `Retry-After` header given in whole seconds.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn into_vectors(mut body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, EmbedderError> {
    if body.data.len() != expected {
        return Err(EmbedderError::InferenceFailed(format!(
            "expected {expected} embeddings, got {}",
            body.data.len()
        )));
    }
    body.data.sort_by_key(|item| item.index);
    Ok(body.data.into_iter().map(|item| item.embedding).collect())
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbedderError::EmptyInput);
        }

        let response = self.post(texts)?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedderError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbedderError::Http(format!("{status}: {}", body.trim())));
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbedderError::InferenceFailed(format!("invalid response body: {e}")))?;
        debug!("received {} embeddings from {}", body.data.len(), self.endpoint);
        into_vectors(body, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
