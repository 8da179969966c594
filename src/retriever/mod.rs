//! Similarity search over a loaded knowledge index.
//!
//! A [`Retriever`] owns its embedding provider and, when the index loaded,
//! a read-only [`RetrieverState`]. Without a state every search returns no
//! hits, which lets callers run without a knowledge base.


use std::fmt::Write as _;
use std::path::Path;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::index::{ChunkRecord, KnowledgeIndex};
use crate::{KbError, Result};

/// Prefix of the positional citation tags (`KB1`, `KB2`, ...).
pub const CITATION_PREFIX: &str = "KB";

/// A loaded index with the stored vectors' norms precomputed.
#[derive(Debug, Clone)]
pub struct RetrieverState {
    index: KnowledgeIndex,
    norms: Vec<f32>,
}

/// One ranked result of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    /// Citation tag, fresh for every query.
    pub tag: String,
    pub score: f32,
    /// Position of the chunk in the index.
    pub position: usize,
    pub chunk: &'a ChunkRecord,
}

impl SearchHit<'_> {
    #[inline]
    pub fn text(&self) -> &str {
        &self.chunk.text
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.chunk.source
    }
}

impl RetrieverState {
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_index(KnowledgeIndex::load(path)?)
    }

    #[inline]
    pub fn from_index(index: KnowledgeIndex) -> Result<Self> {
        index.validate()?;
        let norms = index.vectors.iter().map(|v| l2_norm(v)).collect();
        Ok(Self { index, norms })
    }

    #[inline]
    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.index.model
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Scores every stored vector against `query` and returns the best
    /// `top_k` hits scoring at least `min_score`.
    ///
    /// Equal scores keep index order.
    #[inline]
    pub fn rank(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit<'_>>> {
        let Some(dimension) = self.index.dimension() else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(KbError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let hits = self
            .index
            .vectors
            .iter()
            .zip(&self.norms)
            .map(|(vector, norm)| scaled_cosine(query, query_norm, vector, *norm))
            .enumerate()
            .filter(|(_, score)| *score >= min_score)
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .take(top_k)
            .enumerate()
            .map(|(rank, (position, score))| SearchHit {
                tag: format!("{CITATION_PREFIX}{}", rank + 1),
                score,
                position,
                chunk: &self.index.chunks[position],
            })
            .collect();
        Ok(hits)
    }
}

/// Outcome of [`Retriever::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStatus {
    pub loaded: bool,
    pub chunk_count: usize,
}

/// Query front end: embeds queries and ranks them against the loaded index.
pub struct Retriever<P = Box<dyn EmbeddingProvider>> {
    provider: P,
    state: Option<RetrieverState>,
}

impl<P: EmbeddingProvider> Retriever<P> {
    /// Loads the index at `path`.
    ///
    /// A missing or invalid file is not an error: the retriever comes up
    /// without a knowledge base and reports `loaded: false`.
    #[inline]
    pub fn init(provider: P, path: &Path) -> (Self, InitStatus) {
        let state = match RetrieverState::load(path) {
            Ok(state) => {
                if state.model() != provider.model() {
                    warn!(
                        "Index {} was built with model {} but queries use {}",
                        path.display(),
                        state.model(),
                        provider.model()
                    );
                }
                info!(
                    "Knowledge base loaded from {} ({} chunks)",
                    path.display(),
                    state.len()
                );
                Some(state)
            }
            Err(e) => {
                warn!("Knowledge base unavailable: {}", e);
                None
            }
        };

        let status = InitStatus {
            loaded: state.is_some(),
            chunk_count: state.as_ref().map_or(0, RetrieverState::len),
        };
        (Self { provider, state }, status)
    }

    #[inline]
    pub fn with_state(provider: P, state: RetrieverState) -> Self {
        Self {
            provider,
            state: Some(state),
        }
    }

    /// A retriever with no knowledge base; every search is empty.
    #[inline]
    pub fn unloaded(provider: P) -> Self {
        Self {
            provider,
            state: None,
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    #[inline]
    pub fn state(&self) -> Option<&RetrieverState> {
        self.state.as_ref()
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Embeds `query` and returns at most `top_k` hits scoring at least
    /// `min_score`, tagged `KB1`, `KB2`, ... in rank order.
    ///
    /// Returns no hits without a loaded index, for a blank query or when
    /// `top_k` is zero. Embedding failures become
    /// [`KbError::RetrievalUnavailable`].
    #[inline]
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit<'_>>> {
        let Some(state) = &self.state else {
            return Ok(Vec::new());
        };
        if top_k == 0 || query.trim().is_empty() || state.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .provider
            .embed(query)
            .map_err(|e| KbError::RetrievalUnavailable(e.to_string()))?;
        let hits = state.rank(&vector, top_k, min_score)?;
        debug!("Query matched {} chunks", hits.len());
        Ok(hits)
    }

    /// Like [`Retriever::search`], but logs failures and returns no hits.
    #[inline]
    pub fn search_or_empty(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Vec<SearchHit<'_>> {
        self.search(query, top_k, min_score).unwrap_or_else(|e| {
            warn!("Continuing without knowledge base context: {}", e);
            Vec::new()
        })
    }
}

/// Cosine similarity of two vectors; 0.0 when either has zero magnitude or
/// their lengths differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    scaled_cosine(a, l2_norm(a), b, l2_norm(b))
}

fn scaled_cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm <= 0.0 || b_norm <= 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    // Dividing twice keeps small norms from underflowing as a product
    dot / a_norm / b_norm
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Formats hits as `[KBn] text` blocks for a prompt.
#[inline]
pub fn render_context(hits: &[SearchHit<'_>]) -> String {
    hits.iter()
        .map(|hit| format!("[{}] {}", hit.tag, hit.text()))
        .join("\n\n")
}

/// Formats one `KBn: source` line per hit.
#[inline]
pub fn render_citations(hits: &[SearchHit<'_>]) -> String {
    let mut out = String::new();
    for hit in hits {
        let _ = writeln!(out, "{}: {}", hit.tag, hit.source());
    }
    out
}
