//! Command-line interface

pub mod args;
pub mod commands;
pub mod router;

pub use args::{CacheCommands, Cli, Commands};
pub use router::execute_command;

/// Tracing filter for the given `-v` count
///
/// Without `-v` the configured level applies.
pub fn get_log_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        2 => "storymap_telemetry=trace,info".to_string(),
        _ => "trace".to_string(),
    }
}
