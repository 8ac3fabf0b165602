//! Command implementations

pub mod cache;
pub mod process;

pub use cache::run_cache_command;
pub use process::{run_process_command, ProcessParams};
