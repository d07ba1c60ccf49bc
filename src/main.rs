//! Beadline - lane-budgeted work item daemon.
//!
//! Main entry point for the Beadline CLI and server.

use std::path::Path;

use clap::Parser;

use beadline_config::{Config, ConfigLoader, ConfigValidator};

mod cli;
mod server;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::load_or_default(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run {
        host: None,
        port: None,
    }) {
        Commands::Run { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let _guard = server::init_tracing(&config.logging)?;
            server::run_server(config).await
        }
        Commands::CheckConfig => check_config(&cli.config, &config),
    }
}

fn check_config(path: &Path, config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }
    if !result.is_valid() {
        anyhow::bail!("{} is invalid", path.display());
    }
    println!(
        "{} is valid ({} lanes)",
        path.display(),
        config.lanes.len()
    );
    Ok(())
}
