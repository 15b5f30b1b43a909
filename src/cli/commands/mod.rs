//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod annotate;
mod mapping;
mod models;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use indexner::config::Config;

#[derive(Parser)]
#[command(name = "indexner")]
#[command(about = "Named-entity annotation for search index documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "INDEXNER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate every document of an index and write the results back
    Annotate(AnnotateArgs),

    /// Declare the annotated field and filter field mappings only
    Mapping {
        /// Index name
        #[arg(short, long)]
        index: String,
        /// Source field whose annotated copy gets declared
        #[arg(short = 'f', long = "field-name", alias = "field_name", default_value = "text")]
        field_name: String,
        /// Report what would be declared without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// List configured language and model keys
    Models {
        /// Also probe each model's backend for availability
        #[arg(long)]
        check: bool,
    },
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Index to read documents from and write annotations to
    #[arg(short, long)]
    pub index: String,

    /// Source field holding the text to annotate
    #[arg(short = 'f', long = "field-name", alias = "field_name", default_value = "text")]
    pub field_name: String,

    /// Language or model key selecting the recognizer
    #[arg(short, long, default_value = "english")]
    pub language: String,

    /// Directory for the raw entity archive
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Documents per page (overrides config)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Scroll cursor lease in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    pub scroll: Option<u64>,

    /// Limit number of documents to annotate (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: usize,

    /// Annotate without writing mappings or documents
    #[arg(long)]
    pub dry_run: bool,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_with(cli.config.as_deref()).await?;

    if let Some(ref path) = config.source_path {
        tracing::info!("Using config file {}", path.display());
    }

    match cli.command {
        Commands::Annotate(args) => annotate::cmd_annotate(config, args).await,
        Commands::Mapping {
            index,
            field_name,
            dry_run,
        } => mapping::cmd_mapping(config, &index, &field_name, dry_run).await,
        Commands::Models { check } => models::cmd_models(&config, check).await,
    }
}
