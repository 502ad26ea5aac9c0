/*!
Command handlers for the CLI

This module dispatches parsed subcommands to the handlers in [`mcp`]. Every
handler opens its own client session and closes it before returning.
*/

use anyhow::Result;

use crate::cli::Commands;
use crate::config::Config;

pub mod mcp;

/// Run one CLI command against the configured server.
///
/// # Errors
///
/// Returns the handler's error with command-level context attached.
pub async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Tools => mcp::list_tools(config).await,
        Commands::Call { name, args } => mcp::call_tool(config, &name, &args).await,
        Commands::Resources => mcp::list_resources(config).await,
        Commands::Templates => mcp::list_resource_templates(config).await,
        Commands::Read { uri } => mcp::read_resource(config, &uri).await,
        Commands::Prompts => mcp::list_prompts(config).await,
        Commands::Prompt { name, args } => mcp::get_prompt(config, &name, args).await,
        Commands::PingInfo => mcp::ping_info(config).await,
    }
}
