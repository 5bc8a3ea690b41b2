// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod config;
mod error;
mod formats;
mod metrics;
mod simulate;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// MSE Adapter CLI - Format tables, configuration checks, and loopback simulation
#[derive(Parser)]
#[command(name = "mse-adapter")]
#[command(version)]
#[command(about = "MSE Adapter CLI - Format tables, configuration checks, and loopback simulation")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=debug for more)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported pixel formats and frame sizes
    Formats(formats::Args),

    /// Validate and print the device collection configuration
    Config(config::Args),

    /// Stream buffers through a device over the loopback engine and report metrics
    Simulate(simulate::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Formats(args) => formats::execute(args, cli.json),
        Commands::Config(args) => config::execute(args, cli.json),
        Commands::Simulate(args) => simulate::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}
