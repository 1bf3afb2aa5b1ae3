//! Adwatch CLI - Headless session replay
//!
//! Features:
//! - Replay scripted viewing sessions and inspect emitted events
//! - Drive the async tracker in real time against a log or beacon sink
//! - Print and validate tracker configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

mod commands;
mod output;

/// Adwatch CLI - Video ad engagement tracking toolkit
#[derive(Parser)]
#[command(name = "adwatch")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Replay and inspect video ad tracking sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print the emitted events
    Simulate {
        /// Scenario file (.toml or .json)
        scenario: PathBuf,

        /// Also write records as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print only the session summary
        #[arg(long)]
        summary_only: bool,
    },

    /// Replay a scenario in real time through the async driver
    Live {
        /// Scenario file (.toml or .json)
        scenario: PathBuf,

        /// Playback speed multiplier
        #[arg(short, long, default_value = "1.0")]
        speed: f64,

        /// POST events to this collection endpoint instead of logging them
        #[arg(short, long, env = "ADWATCH_ENDPOINT")]
        endpoint: Option<Url>,
    },

    /// Print the effective tracker configuration
    Config {
        /// Configuration file (.toml or .json)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(level).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(level).init();
    }
    adwatch_core::init();

    match cli.command {
        Commands::Simulate { scenario, output, summary_only } => {
            commands::simulate(&scenario, output, summary_only, &cli.format)?;
        }
        Commands::Live { scenario, speed, endpoint } => {
            commands::live(&scenario, speed, endpoint, &cli.format).await?;
        }
        Commands::Config { file } => {
            commands::config(file, &cli.format)?;
        }
    }

    Ok(())
}
