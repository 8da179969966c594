#[cfg(test)]
mod tests;

use tracing::trace;

use crate::config::ConfigError;

/// Sliding-window parameters, all measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
    min_len: usize,
}

impl ChunkParams {
    /// Validates that the window always advances (`size > overlap`).
    #[inline]
    pub fn new(size: usize, overlap: usize, min_len: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::InvalidChunkSize(size));
        }
        if overlap >= size {
            return Err(ConfigError::OverlapNotSmallerThanChunk { overlap, size });
        }
        Ok(Self {
            size,
            overlap,
            min_len,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    #[inline]
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Distance between the starts of two consecutive windows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// A trimmed window of normalized text.
///
/// `start..end` is the character range of the untrimmed window within the
/// normalized document, so consecutive windows overlap by exactly
/// [`ChunkParams::overlap`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Streaming whitespace normalizer.
///
/// Runs of horizontal whitespace become one space, `\r\n` and lone `\r`
/// become `\n`, three or more consecutive newlines become two, and leading
/// and trailing whitespace is dropped. Whitespace is held back until the next
/// visible character arrives, so the concatenated output of any sequence of
/// [`push`](Self::push) calls equals [`normalize_whitespace`] of the
/// concatenated input.
#[derive(Debug, Default)]
pub struct WhitespaceNormalizer {
    started: bool,
    after_cr: bool,
    pending: String,
}

impl WhitespaceNormalizer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, input: &str, out: &mut String) {
        for c in input.chars() {
            if std::mem::take(&mut self.after_cr) && c == '\n' {
                continue;
            }
            match c {
                '\r' => {
                    self.after_cr = true;
                    self.push_newline();
                }
                '\n' => self.push_newline(),
                c if c.is_whitespace() => {
                    if !self.pending.ends_with(' ') {
                        self.pending.push(' ');
                    }
                }
                c => {
                    if self.started {
                        out.push_str(&self.pending);
                    }
                    self.pending.clear();
                    self.started = true;
                    out.push(c);
                }
            }
        }
    }

    fn push_newline(&mut self) {
        if !self.pending.ends_with("\n\n") {
            self.pending.push('\n');
        }
    }
}

/// One-shot form of [`WhitespaceNormalizer`].
#[inline]
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    WhitespaceNormalizer::new().push(text, &mut out);
    out
}

/// Incremental sliding-window chunker.
///
/// Only the characters from the current window start onward are buffered, so
/// memory stays proportional to the chunk size plus the last pushed segment.
#[derive(Debug)]
pub struct ChunkStream {
    params: ChunkParams,
    window: String,
    window_chars: usize,
    offset: usize,
}

impl ChunkStream {
    #[inline]
    pub fn new(params: ChunkParams) -> Self {
        Self {
            params,
            window: String::new(),
            window_chars: 0,
            offset: 0,
        }
    }

    /// Appends normalized text and emits every window that is known not to be
    /// the last one.
    #[inline]
    pub fn push(&mut self, segment: &str, out: &mut Vec<TextChunk>) {
        if segment.is_empty() {
            return;
        }
        self.window.push_str(segment);
        self.window_chars += segment.chars().count();

        let size = self.params.size();
        let stride = self.params.stride();
        while self.window_chars > size {
            let (head, _) = self.window.split_at(byte_index(&self.window, size));
            emit_window(&self.params, head, self.offset, out);

            let stride_bytes = byte_index(&self.window, stride);
            self.window.drain(..stride_bytes);
            self.window_chars -= stride;
            self.offset += stride;
        }
    }

    /// Emits the final window, which ends at the end of the text.
    #[inline]
    pub fn finish(self, out: &mut Vec<TextChunk>) {
        emit_window(&self.params, &self.window, self.offset, out);
    }
}

fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(idx, _)| idx)
}

fn emit_window(params: &ChunkParams, window: &str, start: usize, out: &mut Vec<TextChunk>) {
    let end = start + window.chars().count();
    let trimmed = window.trim();
    let len = trimmed.chars().count();
    if len == 0 || len < params.min_len() {
        trace!("Dropping window {}..{} ({} chars after trim)", start, end, len);
        return;
    }
    out.push(TextChunk {
        text: trimmed.to_string(),
        start,
        end,
    });
}

/// Chunks already-normalized text in one call.
#[inline]
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut stream = ChunkStream::new(*params);
    stream.push(text, &mut chunks);
    stream.finish(&mut chunks);
    chunks
}

/// Normalize, cap and chunk one document as its raw text arrives.
#[derive(Debug)]
pub struct DocumentChunker {
    normalizer: WhitespaceNormalizer,
    stream: ChunkStream,
    remaining_chars: usize,
    scratch: String,
}

impl DocumentChunker {
    #[inline]
    pub fn new(params: ChunkParams, max_chars: usize) -> Self {
        Self {
            normalizer: WhitespaceNormalizer::new(),
            stream: ChunkStream::new(params),
            remaining_chars: max_chars,
            scratch: String::new(),
        }
    }

    /// True once the per-document character cap has been reached; further
    /// input is ignored.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.remaining_chars == 0
    }

    #[inline]
    pub fn push(&mut self, raw: &str, out: &mut Vec<TextChunk>) {
        if self.is_saturated() {
            return;
        }
        self.scratch.clear();
        self.normalizer.push(raw, &mut self.scratch);

        let count = self.scratch.chars().count();
        if count > self.remaining_chars {
            let cut = byte_index(&self.scratch, self.remaining_chars);
            self.scratch.truncate(cut);
            self.remaining_chars = 0;
        } else {
            self.remaining_chars -= count;
        }
        self.stream.push(&self.scratch, out);
    }

    #[inline]
    pub fn finish(self, out: &mut Vec<TextChunk>) {
        self.stream.finish(out);
    }
}

/// Normalizes, truncates to `max_chars` and chunks a whole document.
#[inline]
pub fn chunk_document(raw: &str, params: &ChunkParams, max_chars: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut chunker = DocumentChunker::new(*params, max_chars);
    chunker.push(raw, &mut chunks);
    chunker.finish(&mut chunks);
    chunks
}
