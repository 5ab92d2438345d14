//! Ragent CLI: ask questions about your documents from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Ragent: retrieval-augmented answers over your own documents
#[derive(Parser, Debug)]
#[command(name = "ragent", version, about, long_about = None)]
struct Cli {
    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory (holds `.ragent/config.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Index the given sources and answer a question about them
    Ask {
        /// The question to answer
        query: String,

        /// A URL, a `.txt` file, or a directory of PDFs (repeatable)
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// Answer with the tool-using agent instead of a single completion
        #[arg(long)]
        agentic: bool,

        /// Number of chunks to retrieve
        #[arg(short)]
        k: Option<usize>,

        /// Print the final workflow state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and chunk sources, then print a per-source summary
    Ingest {
        /// A URL, a `.txt` file, or a directory of PDFs (repeatable)
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Write the defaults to `<workspace>/.ragent/config.toml`
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "ragent", "ragent")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragent.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = ragent_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    config.validate()?;

    commands::handle_command(cli.command, config, &workspace).await
}
