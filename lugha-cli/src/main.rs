//! Lugha CLI: offline evaluation harness for the Lugha tutor's RAG pipeline.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Lugha: retrieval and generation quality evaluation
#[derive(Parser, Debug)]
#[command(name = "lugha", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads .lugha/config.toml from here)
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
    /// Evaluate a batch of samples and print a summary
    Eval(EvalArgs),
    /// Print the summary of a saved report
    Report {
        /// Report JSON written by `lugha eval --output`
        file: PathBuf,
    },
    /// Parse a tutor correction reply and apply the configured term corrections
    Validate {
        /// Reply text
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// Read the reply from a file (stdin when neither is given)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct EvalArgs {
    /// Batch file (.jsonl or .json)
    #[arg(short, long)]
    input: PathBuf,

    /// Write the full report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Samples evaluated concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Latency gate in seconds
    #[arg(long)]
    threshold: Option<f64>,

    /// NDCG cut-off
    #[arg(long)]
    k: Option<usize>,

    /// Use the local embedder and skip LLM-graded metrics
    #[arg(long)]
    offline: bool,

    /// Omit per-sample results from the JSON report
    #[arg(long)]
    summary_only: bool,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default .lugha/config.toml in the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "lugha", "lugha")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "lugha.log");
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

    commands::handle_command(cli.command, &workspace).await
}
