//! CLI argument structures

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::pagination::DEFAULT_PAGE_SIZE;

/// Aggregate Storymap editor telemetry
#[derive(Parser, Debug)]
#[command(name = "storymap-telemetry")]
#[command(about = "storymap-telemetry - Chunked aggregation of editor telemetry with a result cache", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate one page of events and print it as JSON
    #[command(name = "process")]
    Process {
        /// JSON array or JSON-lines file of event records
        #[arg(short = 'e', long, value_name = "FILE")]
        events: PathBuf,

        /// Category to include (repeatable); none means totals only
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Events per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache counters
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached entry
    Clear,
}
