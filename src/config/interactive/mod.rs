
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::time::Duration;

use super::{Config, EmbeddingConfig, IndexingConfig, ProviderKind};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Knowledge Base Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the service that turns text into embedding vectors.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Indexing").bold().yellow());
    configure_indexing(&mut config.indexing)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_endpoint_connection(&config.embedding) {
        eprintln!("{}", style("✓ Embedding endpoint reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding endpoint").yellow()
        );
        eprintln!("You can continue, but make sure it is reachable before building an index.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embedding.provider).cyan());
    match config.embedding.endpoint() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  API key variable: {}", style(&config.embedding.api_key_env).cyan());
    eprintln!(
        "  Timeout / retries: {}s / {} (base delay {}ms)",
        style(config.embedding.timeout_secs).cyan(),
        style(config.embedding.retry_attempts).cyan(),
        style(config.embedding.retry_base_delay_ms).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Indexing Settings:").bold().yellow());
    let indexing = &config.indexing;
    eprintln!("  Chunk size: {}", style(indexing.chunk_size).cyan());
    eprintln!("  Chunk overlap: {}", style(indexing.chunk_overlap).cyan());
    eprintln!("  Min chunk length: {}", style(indexing.min_chunk_len).cyan());
    eprintln!("  Batch size: {}", style(indexing.batch_size).cyan());
    eprintln!(
        "  Max chars per file: {}",
        style(indexing.max_chars_per_file).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Index path: {}",
        style(config.retrieval.index_path.display()).cyan()
    );
    eprintln!("  Top-k: {}", style(config.retrieval.top_k).cyan());
    eprintln!("  Min score: {}", style(config.retrieval.min_score).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("No valid configuration found. Using defaults.").yellow()
        );
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    })
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let providers = ProviderKind::ALL;
    let default_index = providers
        .iter()
        .position(|&p| p == embedding.provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(&providers.map(|p| p.to_string()))
        .interact()?;
    embedding.set_provider(providers[provider_index]);

    let current_url = embedding
        .endpoint()
        .map(|url| url.to_string())
        .unwrap_or_else(|_| embedding.provider.default_base_url().to_string());
    let probe = embedding.clone();
    let base_url: String = Input::new()
        .with_prompt("Endpoint base URL")
        .default(current_url)
        .validate_with(|input: &String| -> Result<(), String> {
            let mut candidate = probe.clone();
            candidate
                .set_base_url(input.clone())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    if embedding.provider == ProviderKind::OpenAi {
        embedding.api_key_env = Input::new()
            .with_prompt("Environment variable holding the API key")
            .default(embedding.api_key_env.clone())
            .interact_text()?;
    }

    if base_url.trim_end_matches('/') != embedding.provider.default_base_url() {
        embedding.set_base_url(base_url)?;
    }
    embedding.set_model(model)?;

    Ok(())
}

fn configure_indexing(indexing: &mut IndexingConfig) -> Result<()> {
    let batch_size: usize = Input::new()
        .with_prompt("Batch size for embedding requests")
        .default(indexing.batch_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(indexing.chunk_size)
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(indexing.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input >= chunk_size {
                Err("Overlap must be smaller than the chunk size")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    indexing.set_batch_size(batch_size)?;
    indexing.chunk_size = chunk_size;
    indexing.chunk_overlap = chunk_overlap;
    indexing.validate()?;

    Ok(())
}

/// Any HTTP response, even an error status, means the endpoint is reachable.
fn test_endpoint_connection(embedding: &EmbeddingConfig) -> bool {
    let Ok(url) = embedding.endpoint() else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) | Err(ureq::Error::StatusCode(_)) => true,
        Err(_) => false,
    }
}
