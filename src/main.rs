use clap::Parser;
use storymap_telemetry::cli::{execute_command, get_log_level, Cli};
use storymap_telemetry::config::PipelineConfig;
use tracing::{debug, error, trace};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_level = get_log_level(cli.verbose, &config.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("storymap-telemetry started with verbosity level: {}", cli.verbose);
    trace!("Effective configuration: {:?}", config);

    if let Err(e) = execute_command(cli.command, config).await {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
