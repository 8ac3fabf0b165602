//! Command routing and execution
//!
//! This module handles routing CLI commands to their respective implementations.

use crate::cli::args::Commands;
use crate::cli::commands::*;
use crate::config::PipelineConfig;
use anyhow::Result;

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands, config: PipelineConfig) -> Result<()> {
    match command {
        Commands::Process {
            events,
            categories,
            from,
            to,
            page,
            page_size,
            no_cache,
            pretty,
        } => {
            run_process_command(
                ProcessParams {
                    events,
                    categories,
                    from,
                    to,
                    page,
                    page_size,
                    no_cache,
                    pretty,
                },
                config,
            )
            .await
        }
        Commands::Cache { command } => run_cache_command(command, config).await,
    }
}
