//! Tarantino CLI: record composited screen/camera sessions.
//!
//! Usage:
//!   tarantino record [OPTIONS]    Record until Ctrl+C or --duration
//!   tarantino check               Check ffmpeg and GStreamer elements
//!   tarantino config [--init]     Show (or write) the effective configuration

use clap::{Parser, Subcommand};
use tarantino_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "tarantino",
    about = "Real-time screen and camera recorder with live effects",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session
    Record(commands::record::RecordArgs),

    /// Check system capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app = AppConfig::load();
    if cli.verbose {
        app.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        app.logging.json = true;
    }
    tarantino_common::logging::init_logging(&app.logging);

    match cli.command {
        Commands::Record(args) => commands::record::run(args, app).await,
        Commands::Check => commands::check::run(),
        Commands::Config { init } => commands::config::run(&app, init),
    }
}
