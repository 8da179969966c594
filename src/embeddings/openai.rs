//! Embeddings over the OpenAI-compatible `/v1/embeddings` endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::EmbeddingConfig;
use crate::embeddings::transport::{HttpTransport, join_endpoint};
use crate::embeddings::{EmbeddingProvider, embedding_error, ensure_batch_shape};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    model: String,
    api_key: String,
    transport: HttpTransport,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Reads the API key from the variable named in the configuration.
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let base_url = config
            .endpoint()
            .context("Failed to generate OpenAI URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key: api_key.into(),
            transport: HttpTransport::from_config(config),
        })
    }

    #[inline]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.transport = self.transport.with_base_delay(delay);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.transport = self.transport.with_retry_attempts(attempts);
        self
    }

    /// Embeds one batch; results are reordered by the `index` the API reports.
    #[inline]
    pub fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = join_endpoint(&self.base_url, "v1/embeddings")?;
        let request_json = serde_json::to_string(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        })
        .context("Failed to serialize embedding request")?;

        debug!("Requesting {} embeddings from {}", texts.len(), url);

        let response_text = self
            .transport
            .post_json(&url, &request_json, Some(&self.api_key))
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;
        response.data.sort_by_key(|d| d.index);

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        let vectors = self
            .generate_embeddings(texts)
            .map_err(|e| embedding_error(&e))?;
        ensure_batch_shape(texts.len(), &vectors)?;
        Ok(vectors)
    }
}
