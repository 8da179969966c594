use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("Source directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("No usable source documents (.txt, .md, .pdf) found in {}", .0.display())]
    NoSourceFiles(PathBuf),

    #[error("Failed to extract text from {}: {reason}", .path.display())]
    FileExtractionFailed { path: PathBuf, reason: String },

    #[error("Memory budget exhausted while reading {}: {reason}", .path.display())]
    MemoryExhausted { path: PathBuf, reason: String },

    #[error("Invalid index file: {0}")]
    IndexFileInvalid(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod index;
pub mod indexer;
pub mod retriever;

#[cfg(test)]
pub(crate) mod test_support;
