//! CLI definitions for Beadline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Beadline CLI.
#[derive(Parser)]
#[command(name = "beadline")]
#[command(about = "Lane-budgeted work item daemon")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "beadline.toml", global = true, env = "BEADLINE_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the daemon and API server in the foreground (default)
    Run {
        /// Override the configured server host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured server port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate the configuration file and exit
    CheckConfig,
}
