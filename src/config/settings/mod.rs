#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::chunking::ChunkParams;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

impl ProviderKind {
    pub const ALL: [Self; 2] = [Self::OpenAi, Self::Ollama];

    #[inline]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

impl fmt::Display for ProviderKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Overrides the provider's default endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub max_chars_per_file: usize,
    pub min_chunk_len: usize,
    /// Plain-text bytes accumulated before a segment is chunked.
    pub text_flush_bytes: usize,
    /// Extracted PDF bytes accumulated before a segment is chunked.
    pub pdf_flush_bytes: usize,
    /// Longest single line a plain-text reader will buffer.
    pub max_line_bytes: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            chunk_overlap: 150,
            batch_size: 80,
            max_chars_per_file: 400_000,
            min_chunk_len: 40,
            text_flush_bytes: 64 * 1024,
            pdf_flush_bytes: 50 * 1024,
            max_line_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub index_path: PathBuf,
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("kb/kb_index.json"),
            top_k: 4,
            min_score: 0.2,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding provider: {0} (must be 'openai' or 'ollama')")]
    InvalidProvider(String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapNotSmallerThanChunk { overlap: usize, size: usize },
    #[error("Minimum chunk length ({min_len}) cannot exceed chunk size ({size})")]
    MinChunkLenTooLarge { min_len: usize, size: usize },
    #[error("Invalid max characters per file: {0} (must be at least 1)")]
    InvalidMaxChars(usize),
    #[error("Invalid buffer size for {name}: {value} (must be at least 1024 bytes)")]
    InvalidBufferSize { name: &'static str, value: usize },
    #[error("Invalid timeout: {0}s (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid top-k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Invalid minimum score: {0} (must be between -1.0 and 1.0)")]
    InvalidMinScore(f32),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnvValue { name: String, value: String },
    #[error("API key variable {0} is not set")]
    MissingApiKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Loads `config.toml` from `config_dir` (defaults if absent), applies
    /// environment overrides and validates the result.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config = Self::load_unvalidated(config_dir)?;
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Like [`Config::load`] but leaves validation to the caller, for
    /// callers that layer further overrides on top.
    #[inline]
    pub fn load_unvalidated<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = config_dir.to_path_buf();

        config
            .apply_env_overrides()
            .context("Invalid environment override")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default configuration directory: `~/.kb-rag`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".kb-rag"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("kb-rag"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.indexing.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// Applies overrides from the process environment.
    #[inline]
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from any variable lookup; unset names are ignored.
    #[inline]
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let indexing = &mut self.indexing;
        override_parsed(&lookup, "KB_CHUNK_SIZE", &mut indexing.chunk_size)?;
        override_parsed(&lookup, "KB_CHUNK_OVERLAP", &mut indexing.chunk_overlap)?;
        override_parsed(&lookup, "KB_BATCH_SIZE", &mut indexing.batch_size)?;
        override_parsed(
            &lookup,
            "KB_MAX_CHARS_PER_FILE",
            &mut indexing.max_chars_per_file,
        )?;
        override_parsed(&lookup, "KB_MIN_CHUNK_LEN", &mut indexing.min_chunk_len)?;

        let embedding = &mut self.embedding;
        override_parsed(&lookup, "KB_EMBEDDING_PROVIDER", &mut embedding.provider)?;
        override_parsed(&lookup, "KB_EMBEDDING_MODEL", &mut embedding.model)?;
        if let Some(url) = lookup("KB_EMBEDDING_URL") {
            embedding.base_url = Some(url);
        }

        let retrieval = &mut self.retrieval;
        override_parsed(&lookup, "KB_INDEX_PATH", &mut retrieval.index_path)?;
        override_parsed(&lookup, "RAG_TOP_K", &mut retrieval.top_k)?;
        override_parsed(&lookup, "RAG_MIN_SCORE", &mut retrieval.min_score)?;

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(name) else {
        return Ok(());
    };
    *target = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value,
        })?;
    Ok(())
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// The configured base URL, or the provider's default.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url());
        let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        Ok(url)
    }

    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }

    pub fn set_provider(&mut self, provider: ProviderKind) {
        if self.provider != provider {
            self.base_url = None;
        }
        self.provider = provider;
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let candidate = Self {
            base_url: Some(base_url.clone()),
            ..self.clone()
        };
        candidate.endpoint()?;
        self.base_url = Some(base_url);
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let params = self.chunk_params()?;

        if self.min_chunk_len > params.size() {
            return Err(ConfigError::MinChunkLenTooLarge {
                min_len: self.min_chunk_len,
                size: params.size(),
            });
        }

        if !(1..=2048).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.max_chars_per_file == 0 {
            return Err(ConfigError::InvalidMaxChars(self.max_chars_per_file));
        }

        for (name, value) in [
            ("text_flush_bytes", self.text_flush_bytes),
            ("pdf_flush_bytes", self.pdf_flush_bytes),
            ("max_line_bytes", self.max_line_bytes),
        ] {
            if value < 1024 {
                return Err(ConfigError::InvalidBufferSize { name, value });
            }
        }

        Ok(())
    }

    #[inline]
    pub fn chunk_params(&self) -> Result<ChunkParams, ConfigError> {
        ChunkParams::new(self.chunk_size, self.chunk_overlap, self.min_chunk_len)
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if !(1..=2048).contains(&batch_size) {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        if !self.min_score.is_finite() || !(-1.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::InvalidMinScore(self.min_score));
        }
        Ok(())
    }
}
