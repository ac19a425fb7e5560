//! Duet CLI - Headless driver for the dual-session playback coordinator
//!
//! Features:
//! - Run a full foreground interval against the simulated pipeline engine
//! - Background / foreground round trips
//! - Source resolution and DRM scheme checks
//! - Effective configuration dump

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Duet CLI - Primary stream with timed overlay reveal
#[derive(Parser)]
#[command(name = "duet")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Dual-session playback coordinator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

/// Content selection shared by `run` and `resolve`
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Primary locator (defaults to the bundled base video)
    pub locator: Option<String>,

    /// Explicit extension / content-type hint
    #[arg(short, long)]
    pub extension: Option<String>,

    /// DRM scheme name or system UUID
    #[arg(long, requires = "drm_license_url")]
    pub drm_scheme: Option<String>,

    /// License server URL
    #[arg(long, requires = "drm_scheme")]
    pub drm_license_url: Option<String>,

    /// Pretend the platform has no secure video output
    #[arg(long)]
    pub no_secure_surface: bool,

    /// Pretend the platform has no DRM framework
    #[arg(long)]
    pub no_drm: bool,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the primary stream and reveal the overlay
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Override the reveal threshold (milliseconds)
        #[arg(short, long)]
        threshold_ms: Option<u64>,

        /// How long to stay in foreground (seconds)
        #[arg(short, long, default_value = "75")]
        duration: u64,

        /// Make the overlay pipeline stall once, this long after prepare
        #[arg(long)]
        overlay_stall_after_ms: Option<u64>,

        /// Use resume/pause instead of start/stop as the foreground boundary
        #[arg(long)]
        single_window: bool,

        /// Send the app to background after this many seconds
        #[arg(long)]
        suspend_at: Option<u64>,

        /// Seconds spent in background before returning
        #[arg(long, default_value = "5")]
        suspend_for: u64,
    },

    /// Show how a locator would be played
    Resolve {
        #[command(flatten)]
        source: SourceArgs,

        /// Fail instead of warning when no secure surface is available
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    duet_core::init();

    match cli.command {
        Commands::Run {
            source,
            threshold_ms,
            duration,
            overlay_stall_after_ms,
            single_window,
            suspend_at,
            suspend_for,
        } => {
            let options = commands::RunOptions {
                threshold_ms,
                duration,
                overlay_stall_after_ms,
                single_window,
                suspend: suspend_at.map(|at| (at, suspend_for)),
            };
            commands::run(&source, options, &cli.format).await?;
        }
        Commands::Resolve { source, strict } => {
            commands::resolve(&source, strict, &cli.format)?;
        }
        Commands::Config { config } => {
            commands::config(config, &cli.format)?;
        }
    }

    Ok(())
}
