//! Sluice CLI - parallel image downscaling on a dataflow pipeline.
//!
//! Every image in the input directory is loaded, halved in size and written
//! to the output directory as PNG, spread across a fixed number of worker
//! threads.
//!
//! # Usage
//!
//! ```bash
//! # Downscale a directory with 8 workers
//! sluice resize --input ./photos --output ./mipmaps --threads 8
//!
//! # Write a per-image report
//! sluice resize -i ./photos -o ./mipmaps --report report.jsonl --format jsonl
//!
//! # View configuration
//! sluice config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Sluice - parallel image downscaling on a dataflow pipeline.
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Downscale every image in a directory
    Resize(cli::resize::ResizeArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(sluice_core::Config::default_path);

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let loaded = if cli.config.is_some() {
        sluice_core::Config::load_from(&config_path)
    } else {
        sluice_core::Config::load()
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `sluice config path`."
            );
            sluice_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Sluice v{}", sluice_core::VERSION);

    match cli.command {
        Commands::Resize(args) => cli::resize::execute(args, config),
        Commands::Config(args) => cli::config::execute(args, &config, &config_path),
    }
}
