// Embeddings module
// Black-box "texts in, vectors out" capability and its HTTP backends

pub mod ollama;
pub mod openai;
pub mod transport;


use tracing::info;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::{KbError, Result};

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use transport::HttpTransport;

/// Something that turns an ordered list of texts into an ordered list of
/// fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input, in input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the embedding model, recorded in built indexes.
    fn model(&self) -> &str;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text as a one-element batch.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(KbError::Embedding(
                "Expected exactly one embedding for a single input".to_string(),
            )),
        }
    }
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Builds the provider selected in the configuration.
#[inline]
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => Box::new(OpenAiClient::new(config)?),
        ProviderKind::Ollama => Box::new(OllamaClient::new(config)?),
    };
    info!(
        "Using {} embeddings with model {}",
        config.provider,
        provider.model()
    );
    Ok(provider)
}

/// Checks the one-vector-per-input contract of a batch response.
pub(crate) fn ensure_batch_shape(requested: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != requested {
        return Err(KbError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            requested,
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        let dimension = first.len();
        if dimension == 0 {
            return Err(KbError::Embedding("Received an empty embedding".to_string()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(KbError::Embedding(format!(
                "Inconsistent embedding dimensions in one batch: {} vs {}",
                dimension,
                bad.len()
            )));
        }
    }
    Ok(())
}

pub(crate) fn embedding_error(error: &anyhow::Error) -> KbError {
    KbError::Embedding(format!("{error:#}"))
}
