// Indexer module
// Turns a directory of documents into a persisted knowledge index


use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::{ChunkParams, DocumentChunker, TextChunk};
use crate::config::IndexingConfig;
use crate::embeddings::EmbeddingProvider;
use crate::extract::{
    ExtractLimits, SinkControl, SourceDocument, discover_documents, extract_segments,
};
use crate::index::{ChunkRecord, IndexWriter};
use crate::{KbError, Result};

/// Builds knowledge indexes from source directories.
pub struct Indexer<'a> {
    config: IndexingConfig,
    params: ChunkParams,
    provider: &'a dyn EmbeddingProvider,
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output_path: PathBuf,
    pub model: String,
    pub chunks_written: usize,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// What happened to one source document during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    /// No text survived normalization and the minimum length filter.
    Empty,
    /// Extraction failed; chunks produced before the failure are kept.
    Skipped { chunks: usize, reason: String },
    /// Memory budget exhausted mid-file; the rest of the file was dropped.
    Abandoned { chunks: usize, reason: String },
}

impl FileOutcome {
    #[inline]
    pub fn chunks(&self) -> usize {
        match self {
            Self::Indexed { chunks }
            | Self::Skipped { chunks, .. }
            | Self::Abandoned { chunks, .. } => *chunks,
            Self::Empty => 0,
        }
    }
}

impl BuildReport {
    /// Files that were not indexed completely.
    #[inline]
    pub fn incomplete_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|file| !matches!(file.outcome, FileOutcome::Indexed { .. }))
    }
}

impl<'a> Indexer<'a> {
    /// Validates the configuration up front so no file is touched with bad
    /// chunking parameters.
    #[inline]
    pub fn new(config: IndexingConfig, provider: &'a dyn EmbeddingProvider) -> Result<Self> {
        config.validate()?;
        let params = config.chunk_params()?;
        Ok(Self {
            config,
            params,
            provider,
        })
    }

    #[inline]
    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Indexes every recognized document in `source_dir` and atomically
    /// replaces `output_path` with the result.
    ///
    /// Per-file extraction problems are recorded in the report. Embedding
    /// failures abort the build and leave any existing index untouched.
    #[inline]
    pub fn build(&self, source_dir: &Path, output_path: &Path) -> Result<BuildReport> {
        let documents = discover_documents(source_dir)?;
        if documents.is_empty() {
            return Err(KbError::NoSourceFiles(source_dir.to_path_buf()));
        }
        info!(
            "Indexing {} documents from {}",
            documents.len(),
            source_dir.display()
        );

        let bar = progress_bar(documents.len());
        let writer = IndexWriter::create(output_path, self.provider.model())?;
        let mut batch = BatchSink::new(self.provider, writer, self.config.batch_size);
        let mut files = Vec::with_capacity(documents.len());

        for document in &documents {
            bar.set_message(document.label());
            let outcome = self.index_document(document, &mut batch).inspect_err(|e| {
                error!(
                    "Build aborted while indexing {}: {}",
                    document.path.display(),
                    e
                );
            })?;
            files.push(FileReport {
                path: document.path.clone(),
                outcome,
            });
            bar.inc(1);
        }

        batch.flush()?;
        bar.finish_and_clear();

        let BatchSink { writer, .. } = batch;
        if writer.is_empty() {
            warn!("No chunks produced from {}", source_dir.display());
            return Err(KbError::NoSourceFiles(source_dir.to_path_buf()));
        }

        let chunks_written = writer.len();
        let output_path = writer.finish()?;
        info!(
            "Indexed {} chunks from {} documents",
            chunks_written,
            files.len()
        );

        Ok(BuildReport {
            output_path,
            model: self.provider.model().to_string(),
            chunks_written,
            files,
        })
    }

    fn index_document(
        &self,
        document: &SourceDocument,
        batch: &mut BatchSink<'_>,
    ) -> Result<FileOutcome> {
        debug!("Indexing {}", document.path.display());

        let source = document.label();
        let limits = ExtractLimits::from(&self.config);
        let mut chunker = DocumentChunker::new(self.params, self.config.max_chars_per_file);
        let mut pending = Vec::new();
        let mut produced = 0;

        let extracted = extract_segments(document, &limits, |segment| {
            chunker.push(segment, &mut pending);
            produced += pending.len();
            batch.extend(&source, pending.drain(..))?;
            Ok(if chunker.is_saturated() {
                SinkControl::Stop
            } else {
                SinkControl::Continue
            })
        });

        let failure = match extracted {
            Ok(stats) => {
                if stats.stopped_early {
                    info!(
                        "{} reached the {} character cap; the remainder was dropped",
                        source, self.config.max_chars_per_file
                    );
                }
                if stats.pages_skipped > 0 {
                    warn!("{}: skipped {} unreadable pages", source, stats.pages_skipped);
                }
                None
            }
            Err(KbError::FileExtractionFailed { reason, .. }) => {
                warn!("Skipping {}: {}", source, reason);
                Some(Failure::Extraction(reason))
            }
            Err(KbError::MemoryExhausted { reason, .. }) => {
                warn!("Abandoning the rest of {}: {}", source, reason);
                Some(Failure::Memory(reason))
            }
            Err(e) => return Err(e),
        };

        // Text read before a recoverable failure is still indexed
        chunker.finish(&mut pending);
        produced += pending.len();
        batch.extend(&source, pending.drain(..))?;

        let outcome = match failure {
            None if produced == 0 => FileOutcome::Empty,
            None => FileOutcome::Indexed { chunks: produced },
            Some(Failure::Extraction(reason)) => FileOutcome::Skipped {
                chunks: produced,
                reason,
            },
            Some(Failure::Memory(reason)) => {
                batch.flush()?;
                FileOutcome::Abandoned {
                    chunks: produced,
                    reason,
                }
            }
        };
        debug!("{}: {:?}", source, outcome);
        Ok(outcome)
    }
}

enum Failure {
    Extraction(String),
    Memory(String),
}

/// Accumulates chunks until a batch is full, then embeds and writes them.
struct BatchSink<'a> {
    provider: &'a dyn EmbeddingProvider,
    writer: IndexWriter,
    capacity: usize,
    texts: Vec<String>,
    sources: Vec<String>,
}

impl<'a> BatchSink<'a> {
    fn new(provider: &'a dyn EmbeddingProvider, writer: IndexWriter, capacity: usize) -> Self {
        Self {
            provider,
            writer,
            capacity,
            texts: Vec::with_capacity(capacity),
            sources: Vec::with_capacity(capacity),
        }
    }

    fn extend(&mut self, source: &str, chunks: impl Iterator<Item = TextChunk>) -> Result<()> {
        for chunk in chunks {
            self.texts.push(chunk.text);
            self.sources.push(source.to_string());
            if self.texts.len() >= self.capacity {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.texts.is_empty() {
            return Ok(());
        }

        let vectors = self.provider.embed_batch(&self.texts)?;
        let records: Vec<ChunkRecord> = self
            .texts
            .drain(..)
            .zip(self.sources.drain(..))
            .map(|(text, source)| ChunkRecord {
                id: Uuid::new_v4().simple().to_string(),
                text,
                source,
            })
            .collect();

        self.writer.append(&records, &vectors)?;
        debug!(
            "Embedded batch of {} chunks ({} total)",
            records.len(),
            self.writer.len()
        );
        Ok(())
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_length(u64::try_from(len).unwrap_or(u64::MAX));
    bar
}
