use anyhow::Result;
use clap::{Parser, Subcommand};
use kb_rag::commands::{
    BuildOverrides, build_index, check_backend, load_build_config, search_index, show_index_info,
};
use kb_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "Build and search a local knowledge base of embedded document chunks")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.kb-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend and indexing settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build an index from a directory of .txt, .md and .pdf files
    Build {
        /// Directory holding the source documents
        #[arg(long, default_value = "kb")]
        source: PathBuf,
        /// Index file to write (defaults to the configured index path)
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Chunks sent to the embedding backend per request
        #[arg(long)]
        batch_size: Option<usize>,
        /// Characters kept from each document; the rest is dropped
        #[arg(long)]
        max_chars_per_file: Option<usize>,
        /// Chunks shorter than this are discarded
        #[arg(long)]
        min_chunk_len: Option<usize>,
        /// Embedding model name
        #[arg(long)]
        model: Option<String>,
    },
    /// Search an index for chunks similar to a query
    Search {
        query: String,
        /// Index file to search (defaults to the configured index path)
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        top_k: Option<usize>,
        /// Hits scoring below this are dropped
        #[arg(long, allow_negative_numbers = true)]
        min_score: Option<f32>,
    },
    /// Show what an index file contains
    Info {
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Check that the embedding backend is reachable
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Build {
            source,
            output,
            chunk_size,
            chunk_overlap,
            batch_size,
            max_chars_per_file,
            min_chunk_len,
            model,
        } => {
            let overrides = BuildOverrides {
                chunk_size,
                chunk_overlap,
                batch_size,
                max_chars_per_file,
                min_chunk_len,
                model,
            };
            let config = load_build_config(&config_dir, overrides)?;

            let output = output.unwrap_or_else(|| config.retrieval.index_path.clone());
            build_index(&config, &source, &output)?;
        }
        Commands::Search {
            query,
            index,
            top_k,
            min_score,
        } => {
            let config = Config::load(&config_dir)?;
            let index = index.unwrap_or_else(|| config.retrieval.index_path.clone());
            search_index(
                &config,
                &index,
                &query,
                top_k.unwrap_or(config.retrieval.top_k),
                min_score.unwrap_or(config.retrieval.min_score),
            )?;
        }
        Commands::Info { index } => {
            let index = match index {
                Some(index) => index,
                None => Config::load(&config_dir)?.retrieval.index_path,
            };
            show_index_info(&index)?;
        }
        Commands::Check => {
            check_backend(&Config::load(&config_dir)?)?;
        }
    }

    Ok(())
}
