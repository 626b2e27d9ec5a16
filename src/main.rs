use lakejoin::config::Config;
use lakejoin::pipeline::{build_and_save, query_and_save, JOINABLE_FILE};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lakejoin")]
#[command(about = "Semantic joinable-column discovery over a folder of tables")]
#[command(version)]
struct Args {
    /// JSON configuration file (defaults apply for missing fields)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a folder of CSV/TSV tables
    Build {
        /// Folder of tables to index
        #[arg(short, long, default_value = "data/dataset")]
        dataset_dir: PathBuf,

        /// Where index artifacts are written
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Query a built index with every column of every query table
    Query {
        /// Folder of query tables
        #[arg(short, long, default_value = "data/query")]
        query_dir: PathBuf,

        /// Folder holding the index artifacts; joinable.csv is written here
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Build, then query
    Run {
        #[arg(short, long, default_value = "data/dataset")]
        dataset_dir: PathBuf,

        #[arg(short, long, default_value = "data/query")]
        query_dir: PathBuf,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Commands::Build { dataset_dir, output_dir } => build(&dataset_dir, &output_dir, &config),
        Commands::Query { query_dir, output_dir } => query(&query_dir, &output_dir, &config),
        Commands::Run { dataset_dir, query_dir, output_dir } => {
            build(&dataset_dir, &output_dir, &config)?;
            query(&query_dir, &output_dir, &config)
        }
    }
}

fn build(dataset_dir: &Path, output_dir: &Path, config: &Config) -> Result<()> {
    info!("Building index from {}", dataset_dir.display());
    let report = build_and_save(dataset_dir, output_dir, config)
        .with_context(|| format!("Build failed for {}", dataset_dir.display()))?;

    println!("\n=== Build Report ===");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn query(query_dir: &Path, output_dir: &Path, config: &Config) -> Result<()> {
    info!("Querying index in {} with {}", output_dir.display(), query_dir.display());
    let report = query_and_save(query_dir, output_dir, config)
        .with_context(|| format!("Query failed for {}", query_dir.display()))?;

    println!("\n=== Query Report ===");
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("Results saved to {}", output_dir.join(JOINABLE_FILE).display());
    Ok(())
}
