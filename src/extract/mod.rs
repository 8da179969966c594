// Source document discovery and streaming text extraction

pub mod pdf;


use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::config::IndexingConfig;
use crate::{KbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    /// Recognizes `.txt`, `.md` and `.pdf`, ignoring case.
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::PlainText),
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

impl SourceDocument {
    /// File name used as the citation source.
    #[inline]
    pub fn label(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

/// Lists the recognized documents directly inside `dir`, sorted by file name.
#[inline]
pub fn discover_documents(dir: &Path) -> Result<Vec<SourceDocument>> {
    if !dir.is_dir() {
        return Err(KbError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match DocumentFormat::from_path(&path) {
            Some(format) => documents.push(SourceDocument { path, format }),
            None => debug!("Skipping unrecognized file {}", path.display()),
        }
    }

    documents.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(documents)
}

/// Buffer sizes that bound memory use while reading one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub text_flush_bytes: usize,
    pub pdf_flush_bytes: usize,
    pub max_line_bytes: usize,
}

impl From<&IndexingConfig> for ExtractLimits {
    #[inline]
    fn from(config: &IndexingConfig) -> Self {
        Self {
            text_flush_bytes: config.text_flush_bytes,
            pdf_flush_bytes: config.pdf_flush_bytes,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

impl Default for ExtractLimits {
    #[inline]
    fn default() -> Self {
        Self::from(&IndexingConfig::default())
    }
}

/// What the consumer of extracted segments wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub bytes_read: usize,
    pub segments: usize,
    pub pages_skipped: usize,
    pub stopped_early: bool,
}

/// Streams a document's raw text to `sink` in bounded segments.
///
/// Reading problems surface as [`KbError::FileExtractionFailed`] or
/// [`KbError::MemoryExhausted`]; errors returned by `sink` pass through
/// unchanged.
#[inline]
pub fn extract_segments<F>(
    document: &SourceDocument,
    limits: &ExtractLimits,
    sink: F,
) -> Result<ExtractStats>
where
    F: FnMut(&str) -> Result<SinkControl>,
{
    match document.format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            extract_plain_text(&document.path, limits, sink)
        }
        DocumentFormat::Pdf => pdf::extract_pdf(&document.path, limits, sink),
    }
}

fn extract_plain_text<F>(path: &Path, limits: &ExtractLimits, mut sink: F) -> Result<ExtractStats>
where
    F: FnMut(&str) -> Result<SinkControl>,
{
    let file = File::open(path).map_err(|e| extraction_failed(path, &e))?;
    let mut reader = BufReader::new(file);
    let mut stats = ExtractStats::default();
    let mut line = Vec::new();
    let mut buffer = String::new();
    let line_limit = u64::try_from(limits.max_line_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);

    loop {
        line.clear();
        let read = match Read::take(&mut reader, line_limit).read_until(b'\n', &mut line) {
            Ok(read) => read,
            Err(e) => {
                let error = extraction_failed(path, &e);
                return flush_then_fail(&buffer, &mut stats, &mut sink, path, error);
            }
        };
        if read == 0 {
            break;
        }
        stats.bytes_read += read;

        if read > limits.max_line_bytes && line.last() != Some(&b'\n') {
            let error = KbError::MemoryExhausted {
                path: path.to_path_buf(),
                reason: format!("line longer than {} bytes", limits.max_line_bytes),
            };
            return flush_then_fail(&buffer, &mut stats, &mut sink, path, error);
        }

        let decoded = String::from_utf8_lossy(&line);
        if let Err(error) = append_bounded(&mut buffer, &decoded, path) {
            return flush_then_fail(&buffer, &mut stats, &mut sink, path, error);
        }

        if buffer.len() >= limits.text_flush_bytes {
            trace!("Flushing {} bytes from {}", buffer.len(), path.display());
            stats.segments += 1;
            if sink(&buffer)? == SinkControl::Stop {
                stats.stopped_early = true;
                return Ok(stats);
            }
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        stats.segments += 1;
        sink(&buffer)?;
    }

    Ok(stats)
}

/// Hands text already buffered to `sink` and then reports `error`.
///
/// An error from `sink` itself takes precedence.
pub(crate) fn flush_then_fail<F>(
    buffer: &str,
    stats: &mut ExtractStats,
    sink: &mut F,
    path: &Path,
    error: KbError,
) -> Result<ExtractStats>
where
    F: FnMut(&str) -> Result<SinkControl>,
{
    if !buffer.is_empty() {
        trace!(
            "Flushing {} bytes from {} before failing",
            buffer.len(),
            path.display()
        );
        stats.segments += 1;
        sink(buffer)?;
    }
    Err(error)
}

/// Appends to a segment buffer, reporting allocation failure instead of
/// aborting the process.
pub(crate) fn append_bounded(buffer: &mut String, text: &str, path: &Path) -> Result<()> {
    buffer
        .try_reserve(text.len())
        .map_err(|e| KbError::MemoryExhausted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    buffer.push_str(text);
    Ok(())
}

pub(crate) fn extraction_failed(path: &Path, error: &dyn std::fmt::Display) -> KbError {
    KbError::FileExtractionFailed {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
