//! mcpwire - Model Context Protocol client CLI
//!
#![doc = "Main entry point for the mcpwire command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpwire::cli::Cli;
use mcpwire::commands;
use mcpwire::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(cli.verbose, config.logging.json);

    // Validate configuration
    config.validate()?;

    tracing::debug!("Using {:?} transport", config.server.transport);
    commands::run(cli.command, &config).await
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins; otherwise `mcpwire=info`, or `mcpwire=debug` with
/// `--verbose`. Logs go to stderr so command output stays clean.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "mcpwire=debug" } else { "mcpwire=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
