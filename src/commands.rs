use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use tracing::info;

use crate::KbError;
use crate::config::{Config, ProviderKind};
use crate::embeddings::{EmbeddingProvider, OllamaClient, provider_from_config};
use crate::extract::discover_documents;
use crate::index::KnowledgeIndex;
use crate::indexer::{BuildReport, FileOutcome, Indexer};
use crate::retriever::{Retriever, render_citations};

/// `build` flags layered over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_chars_per_file: Option<usize>,
    pub min_chunk_len: Option<usize>,
    pub model: Option<String>,
}

impl BuildOverrides {
    #[inline]
    pub fn apply(self, config: &mut Config) -> Result<()> {
        let indexing = &mut config.indexing;
        if let Some(value) = self.chunk_size {
            indexing.chunk_size = value;
        }
        if let Some(value) = self.chunk_overlap {
            indexing.chunk_overlap = value;
        }
        if let Some(value) = self.batch_size {
            indexing.batch_size = value;
        }
        if let Some(value) = self.max_chars_per_file {
            indexing.max_chars_per_file = value;
        }
        if let Some(value) = self.min_chunk_len {
            indexing.min_chunk_len = value;
        }
        if let Some(model) = self.model {
            config.embedding.set_model(model)?;
        }
        Ok(())
    }
}

/// Loads the configuration for `build`: file, then environment, then flags.
/// Validation runs once, on the combined result.
#[inline]
pub fn load_build_config(config_dir: &Path, overrides: BuildOverrides) -> Result<Config> {
    let mut config = Config::load_unvalidated(config_dir)?;
    overrides.apply(&mut config)?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Build an index from `source_dir` into `output_path`
#[inline]
pub fn build_index(
    config: &Config,
    source_dir: &Path,
    output_path: &Path,
) -> Result<BuildReport> {
    info!(
        "Building index {} from {}",
        output_path.display(),
        source_dir.display()
    );

    // Source problems are reported before any backend setup
    if discover_documents(source_dir)?.is_empty() {
        return Err(KbError::NoSourceFiles(source_dir.to_path_buf()).into());
    }

    let provider = provider_from_config(&config.embedding)?;
    let indexer = Indexer::new(config.indexing.clone(), &*provider)?;
    let report = indexer.build(source_dir, output_path)?;

    for file in report.incomplete_files() {
        let name = file.path.display();
        match &file.outcome {
            FileOutcome::Empty => {
                println!("{} {}: no usable text", style("skipped").yellow(), name);
            }
            FileOutcome::Skipped { reason, .. } => {
                println!("{} {}: {}", style("skipped").yellow(), name, reason);
            }
            FileOutcome::Abandoned { chunks, reason } => println!(
                "{} {} after {} chunks: {}",
                style("truncated").yellow(),
                name,
                chunks,
                reason
            ),
            FileOutcome::Indexed { .. } => {}
        }
    }
    println!(
        "OK: {} chunks: {}",
        report.output_path.display(),
        report.chunks_written
    );

    Ok(report)
}

/// Run one query against an index and print the ranked hits
#[inline]
pub fn search_index(
    config: &Config,
    index_path: &Path,
    query: &str,
    top_k: usize,
    min_score: f32,
) -> Result<()> {
    let provider = provider_from_config(&config.embedding)?;
    let (retriever, status) = Retriever::init(provider, index_path);

    if !status.loaded {
        println!(
            "{} no knowledge base at {}; continuing without context",
            style("note:").yellow(),
            index_path.display()
        );
        return Ok(());
    }

    let hits = retriever.search_or_empty(query, top_k, min_score);
    if hits.is_empty() {
        println!("No results above score {min_score}");
        return Ok(());
    }

    for hit in &hits {
        println!(
            "{} {} {}",
            style(format!("[{}]", hit.tag)).bold().cyan(),
            style(format!("{:.3}", hit.score)).dim(),
            style(hit.source()).green()
        );
        println!("{}", hit.text());
        println!();
    }
    print!("{}", render_citations(&hits));

    Ok(())
}

/// Describe an index file without loading an embedding backend
#[inline]
pub fn show_index_info(index_path: &Path) -> Result<()> {
    let index = KnowledgeIndex::load(index_path)?;

    println!("{}", style(index_path.display()).bold());
    println!("  Model: {}", style(&index.model).cyan());
    println!("  Chunks: {}", style(index.len()).cyan());
    match index.dimension() {
        Some(dimension) => println!("  Dimension: {}", style(dimension).cyan()),
        None => println!("  Dimension: {}", style("n/a").dim()),
    }

    let per_source = index.chunks_per_source();
    if !per_source.is_empty() {
        println!("  Sources:");
        for (source, count) in per_source {
            println!("    {source}: {count}");
        }
    }

    Ok(())
}

/// Check that the configured embedding backend answers
#[inline]
pub fn check_backend(config: &Config) -> Result<()> {
    let embedding = &config.embedding;
    println!(
        "Checking {} at {}",
        embedding.provider,
        embedding.endpoint()?
    );

    match embedding.provider {
        ProviderKind::Ollama => {
            OllamaClient::new(embedding)?
                .health_check()
                .context("Ollama health check failed")?;
        }
        ProviderKind::OpenAi => {
            let provider = provider_from_config(embedding)?;
            let vector = provider
                .embed("health check")
                .context("Embedding request failed")?;
            println!("  Dimension: {}", vector.len());
        }
    }

    println!(
        "{} model {} is available",
        style("✓").green(),
        style(&embedding.model).cyan()
    );
    Ok(())
}
