//! Conflux CLI
//!
//! Developer tool for analysing and validating pipeline definitions.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod project;

/// Conflux - dataflow pipeline analysis
#[derive(Parser)]
#[command(name = "conflux")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "conflux.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Conflux project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Classify transport modes and propagate metadata
    Analyze {
        /// Pipeline name or definition file (defaults to every project pipeline)
        pipeline: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check pipelines for structural errors
    Validate {
        /// Pipeline name or definition file (defaults to every project pipeline)
        pipeline: Option<String>,

        /// Fail when an edge has no resolvable metadata
        #[arg(long)]
        require_metadata: bool,
    },
}

/// How analysis reports are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    Text,
    /// One JSON document for all pipelines
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for reports
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Analyze { pipeline, format } => {
            commands::analyze::run(&cli.config, pipeline.as_deref(), format).await?;
        }
        Commands::Validate {
            pipeline,
            require_metadata,
        } => {
            commands::validate::run(&cli.config, pipeline.as_deref(), require_metadata).await?;
        }
    }

    Ok(())
}
