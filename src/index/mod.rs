//! The persisted knowledge index: chunk records, their embedding vectors and
//! the model that produced them, stored as a single JSON document.
//!
//! [`IndexWriter`] builds the document incrementally. Records and vectors are
//! spooled to anonymous temp files as batches arrive, and the final document
//! is assembled next to the destination and renamed over it, so readers never
//! observe a half-written index.

#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{KbError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    /// File name of the originating document.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    pub model: String,
    pub chunks: Vec<ChunkRecord>,
    pub vectors: Vec<Vec<f32>>,
}

impl KnowledgeIndex {
    /// Reads and validates an index file.
    ///
    /// Every failure, including a missing file, is reported as
    /// [`KbError::IndexFileInvalid`].
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            KbError::IndexFileInvalid(format!("cannot open {}: {e}", path.display()))
        })?;
        let index: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            KbError::IndexFileInvalid(format!("cannot parse {}: {e}", path.display()))
        })?;
        index.validate()?;

        debug!(
            "Loaded index {} with {} chunks",
            path.display(),
            index.chunks.len()
        );
        Ok(index)
    }

    /// Checks chunk/vector alignment and a single non-zero dimension.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunks.len() != self.vectors.len() {
            return Err(KbError::IndexFileInvalid(format!(
                "{} chunks but {} vectors",
                self.chunks.len(),
                self.vectors.len()
            )));
        }
        if let Some(first) = self.vectors.first() {
            check_vectors(first.len(), &self.vectors).map_err(KbError::IndexFileInvalid)?;
        }
        Ok(())
    }

    /// Vector dimension, or `None` for an empty index.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk counts per source file, most chunks first.
    #[inline]
    pub fn chunks_per_source(&self) -> Vec<(&str, usize)> {
        self.chunks
            .iter()
            .map(|chunk| chunk.source.as_str())
            .counts()
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
            .collect()
    }

    /// Writes the index through an [`IndexWriter`], replacing `path` atomically.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let mut writer = IndexWriter::create(path, &self.model)?;
        writer.append(&self.chunks, &self.vectors)?;
        writer.finish()?;
        Ok(())
    }
}

/// Incrementally writes an index file with bounded memory.
#[derive(Debug)]
pub struct IndexWriter {
    output_path: PathBuf,
    dir: PathBuf,
    model: String,
    chunk_spool: BufWriter<File>,
    vector_spool: BufWriter<File>,
    count: usize,
    dimension: Option<usize>,
}

impl IndexWriter {
    /// Prepares spool files beside `output_path`, creating its parent
    /// directories.
    #[inline]
    pub fn create(output_path: &Path, model: &str) -> Result<Self> {
        let dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let chunk_spool = tempfile::tempfile_in(&dir).context("Failed to create chunk spool")?;
        let vector_spool = tempfile::tempfile_in(&dir).context("Failed to create vector spool")?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            dir,
            model: model.to_string(),
            chunk_spool: BufWriter::new(chunk_spool),
            vector_spool: BufWriter::new(vector_spool),
            count: 0,
            dimension: None,
        })
    }

    /// Appends one aligned batch of records and vectors.
    #[inline]
    pub fn append(&mut self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<()> {
        if records.len() != vectors.len() {
            return Err(KbError::Embedding(format!(
                "{} chunks but {} vectors in one batch",
                records.len(),
                vectors.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dimension = *self.dimension.get_or_insert(first.len());
        check_vectors(dimension, vectors).map_err(KbError::Embedding)?;

        for (record, vector) in records.iter().zip(vectors) {
            if self.count > 0 {
                self.chunk_spool.write_all(b",")?;
                self.vector_spool.write_all(b",")?;
            }
            serde_json::to_writer(&mut self.chunk_spool, record)
                .context("Failed to serialize chunk record")?;
            serde_json::to_writer(&mut self.vector_spool, vector)
                .context("Failed to serialize vector")?;
            self.count += 1;
        }
        Ok(())
    }

    /// Number of records appended so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Assembles the final document and renames it over the output path.
    #[inline]
    pub fn finish(self) -> Result<PathBuf> {
        let mut chunks = rewind(self.chunk_spool)?;
        let mut vectors = rewind(self.vector_spool)?;

        let staged = NamedTempFile::new_in(&self.dir).context("Failed to stage index file")?;
        {
            let mut out = BufWriter::new(staged.as_file());
            out.write_all(b"{\"model\":")?;
            serde_json::to_writer(&mut out, &self.model).context("Failed to serialize model")?;
            out.write_all(b",\"chunks\":[")?;
            io::copy(&mut chunks, &mut out)?;
            out.write_all(b"],\"vectors\":[")?;
            io::copy(&mut vectors, &mut out)?;
            out.write_all(b"]}\n")?;
            out.flush()?;
        }
        staged.as_file().sync_all()?;

        staged
            .persist(&self.output_path)
            .map_err(|e| KbError::Io(e.error))?;

        info!(
            "Wrote {} chunks to {}",
            self.count,
            self.output_path.display()
        );
        Ok(self.output_path)
    }
}

fn rewind(spool: BufWriter<File>) -> Result<File> {
    let mut file = spool.into_inner().map_err(|e| KbError::Io(e.into_error()))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

fn check_vectors(dimension: usize, vectors: &[Vec<f32>]) -> std::result::Result<(), String> {
    if dimension == 0 {
        return Err("vectors have zero dimension".to_string());
    }
    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(format!(
                "vector {i} has dimension {}, expected {dimension}",
                vector.len()
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(format!("vector {i} contains a non-finite value"));
        }
    }
    Ok(())
}
