//! seqlog CLI
//!
//! Command-line front ends for a seqlog log.
//!
//! # Commands
//!
//! - `input` - Append lines from stdin as records
//! - `output` - Tail records to stdout
//! - `inspect` - Display log layout and record counts
//! - `verify` - Check index and segment consistency

mod commands;

use clap::{Parser, Subcommand};
use seqlog_core::{DurabilityPolicy, LogConfig, StartPosition};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// seqlog command-line tools.
#[derive(Parser)]
#[command(name = "seqlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append lines from stdin until an empty line
    Input {
        /// When appended records are synced (every-write, interval, none)
        #[arg(short, long, default_value = "interval")]
        durability: DurabilityPolicy,

        /// Segment capacity in bytes
        #[arg(long, default_value_t = LogConfig::default().segment_capacity_bytes)]
        segment_size: u64,

        /// Largest accepted line in bytes
        #[arg(long, default_value_t = LogConfig::default().max_payload_bytes)]
        max_payload: u32,
    },

    /// Print records as they are appended
    Output {
        /// Where to start (beginning, end, or an index)
        #[arg(short, long, default_value = "beginning")]
        from: StartPosition,

        /// Milliseconds to wait when caught up
        #[arg(long, default_value = "10")]
        poll_ms: u64,

        /// Exit once caught up instead of waiting for more records
        #[arg(long)]
        no_follow: bool,
    },

    /// Display log layout and record counts
    Inspect {
        /// Show segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log consistency
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Input {
            durability,
            segment_size,
            max_payload,
        } => {
            let path = cli.path.ok_or("Log path required for input")?;
            let config = LogConfig::default()
                .durability(durability)
                .segment_capacity_bytes(segment_size)
                .max_payload_bytes(max_payload);
            let stdin = std::io::stdin();
            commands::input::run(&path, config, stdin.lock(), std::io::stdout().lock())?;
        }
        Commands::Output {
            from,
            poll_ms,
            no_follow,
        } => {
            let path = cli.path.ok_or("Log path required for output")?;
            let options = commands::output::Options {
                start: from,
                poll_interval: std::time::Duration::from_millis(poll_ms),
                follow: !no_follow,
            };
            commands::output::run(&path, &options, std::io::stdout().lock())?;
        }
        Commands::Inspect { segments, format } => {
            let path = cli.path.ok_or("Log path required for inspect")?;
            commands::inspect::run(&path, segments, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("seqlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("seqlog core v{}", seqlog_core::VERSION);
        }
    }

    Ok(())
}
