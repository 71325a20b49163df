mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sounding::config::SoundingConfig;

#[derive(Parser)]
#[command(name = "sounding", version, about = "Semantic similarity search over observation records")]
struct Cli {
    /// Config file (defaults to ~/.sounding/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank the records in a JSON file against a free-text query
    Search {
        /// JSON array of records ({id?, text|description, metadata?})
        records: PathBuf,
        /// Query text
        query: String,
        /// Number of results (defaults to retrieval.default_top_n)
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        top_n: Option<i64>,
        /// Metadata equality filter, e.g. --where region=north (repeatable)
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        conditions: Vec<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed the records in a JSON file into the embedding cache
    Ingest {
        records: PathBuf,
    },
    /// Recompute embeddings for a JSON file, ignoring cached vectors
    ReEmbed {
        records: PathBuf,
    },
    /// Check provider setup and embedding cache health
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download embedding.model to ~/.sounding/models/<model>/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SoundingConfig::load_from(path)?,
        None => SoundingConfig::load()?,
    };

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search {
            records,
            query,
            top_n,
            conditions,
            json,
        } => {
            cli::search::search(
                &config,
                cli::search::SearchArgs {
                    records: &records,
                    query: &query,
                    top_n,
                    conditions: &conditions,
                    json,
                },
            )
            .await?;
        }
        Command::Ingest { records } => cli::ingest::ingest(&config, &records).await?,
        Command::ReEmbed { records } => cli::re_embed::re_embed(&config, &records).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
