//! `storymap-telemetry cache`

use anyhow::{Context, Result};

use crate::cache::{AnalyticsCache, CacheStats};
use crate::cli::args::CacheCommands;
use crate::config::PipelineConfig;

pub async fn run_cache_command(command: CacheCommands, config: PipelineConfig) -> Result<()> {
    let cache = AnalyticsCache::open(&config.cache).await;

    match command {
        CacheCommands::Stats { json } => {
            let stats = cache.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", render_stats(&stats));
            }
        }
        CacheCommands::Clear => {
            if !cache.is_enabled() {
                println!("Cache is disabled; nothing to clear");
                return Ok(());
            }
            cache.clear().await.context("failed to clear cache")?;
            println!("Cache cleared");
        }
    }
    Ok(())
}

fn render_stats(stats: &CacheStats) -> String {
    if !stats.enabled {
        return "Cache: disabled\n".to_string();
    }
    format!(
        "Cache: enabled\n  Raw days:          {}\n  Processed entries: {}\n",
        stats.raw_entries, stats.processed_entries
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_stats() {
        assert_eq!(render_stats(&CacheStats::default()), "Cache: disabled\n");

        let stats = CacheStats {
            enabled: true,
            raw_entries: 2,
            processed_entries: 7,
            ..Default::default()
        };
        let text = render_stats(&stats);
        assert!(text.contains("Raw days:          2"));
        assert!(text.contains("Processed entries: 7"));
    }
}
