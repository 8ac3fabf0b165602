//! Pipeline configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `STORYMAP_*` environment variables.
//!
//! ```toml
//! chunk_size = 1000
//! worker_count = 4
//! log_level = "info"
//!
//! [cache]
//! enabled = true
//! ttl = "1h"
//! max_entries = 100
//! backend = "file"
//!
//! [merge]
//! average_strategy = "pairwise"
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pipeline::chunk::DEFAULT_CHUNK_SIZE;
use crate::pipeline::merger::AverageStrategy;
use crate::pipeline::pool::MAX_WORKERS;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per chunk
    pub chunk_size: usize,
    pub worker_count: usize,
    pub log_level: String,
    pub cache: CacheSettings,
    pub merge: MergeSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_count: default_worker_count(),
            log_level: "info".to_string(),
            cache: CacheSettings::default(),
            merge: MergeSettings::default(),
        }
    }
}

/// Where processed and raw cache entries are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time-to-live of cached entries
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Cache directory; defaults to the platform cache dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub backend: CacheBackendKind,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: default_cache_ttl(),
            max_entries: default_max_entries(),
            dir: None,
            backend: CacheBackendKind::default(),
        }
    }
}

impl CacheSettings {
    /// Configured directory, or the platform default
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(default_cache_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    #[serde(default)]
    pub average_strategy: AverageStrategy,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_max_entries() -> usize {
    100
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, MAX_WORKERS)
}

fn default_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "storymap", "storymap-telemetry")
        .map(|dirs| dirs.cache_dir().to_path_buf())
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Read a TOML file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, then `path` when given, then the environment; validated
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(path).await?
            }
            None => Self::default(),
        };
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("STORYMAP_CHUNK_SIZE") {
            self.chunk_size = parse_env("STORYMAP_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = lookup("STORYMAP_WORKER_COUNT") {
            self.worker_count = parse_env("STORYMAP_WORKER_COUNT", &value)?;
        }
        if let Some(value) = lookup("STORYMAP_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = lookup("STORYMAP_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("STORYMAP_CACHE_ENABLED") {
            self.cache.enabled = parse_env("STORYMAP_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = lookup("STORYMAP_CACHE_TTL") {
            self.cache.ttl = humantime_serde::re::humantime::parse_duration(&value)
                .map_err(|e| Error::config(format!("STORYMAP_CACHE_TTL={}: {}", value, e)))?;
        }
        if let Some(value) = lookup("STORYMAP_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("STORYMAP_CACHE_MAX_ENTRIES", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be at least 1"));
        }
        if self.worker_count == 0 {
            return Err(Error::config("worker_count must be at least 1"));
        }
        if self.worker_count > MAX_WORKERS {
            return Err(Error::config(format!(
                "worker_count must be at most {}",
                MAX_WORKERS
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "unknown log_level '{}' (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(Error::config("cache.max_entries must be at least 1"));
        }
        if self.cache.ttl.is_zero() {
            return Err(Error::config("cache.ttl must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{}={}: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.chunk_size, 1000);
        assert!((1..=MAX_WORKERS).contains(&config.worker_count));
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.merge.average_strategy, AverageStrategy::Pairwise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            chunk_size = 250
            worker_count = 3

            [cache]
            ttl = "30m"
            max_entries = 10
            backend = "memory"

            [merge]
            average_strategy = "weighted"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.log_level, "info");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.merge.average_strategy, AverageStrategy::Weighted);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result = PipelineConfig::from_toml_str("[merge]\naverage_strategy = \"median\"\n");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config
            .merge_env_from(env(&[
                ("STORYMAP_CHUNK_SIZE", "10"),
                ("STORYMAP_WORKER_COUNT", "2"),
                ("STORYMAP_LOG_LEVEL", "debug"),
                ("STORYMAP_CACHE_DIR", "/tmp/storymap-cache"),
                ("STORYMAP_CACHE_ENABLED", "false"),
                ("STORYMAP_CACHE_TTL", "5m"),
                ("STORYMAP_CACHE_MAX_ENTRIES", "7"),
            ]))
            .unwrap();

        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/storymap-cache")));
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, 7);
    }

    #[test]
    fn test_malformed_env_value_is_a_config_error() {
        let mut config = PipelineConfig::default();
        let err = config
            .merge_env_from(env(&[("STORYMAP_CHUNK_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.log_level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.worker_count = MAX_WORKERS + 1;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("storymap.toml");
        std::fs::write(&path, "chunk_size = 42\n").unwrap();

        let config = PipelineConfig::from_file(&path).await.unwrap();
        assert_eq!(config.chunk_size, 42);

        let missing = PipelineConfig::from_file(&temp.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let settings = CacheSettings {
            dir: Some(PathBuf::from("/var/cache/storymap")),
            ..CacheSettings::default()
        };
        assert_eq!(
            settings.resolved_dir(),
            Some(PathBuf::from("/var/cache/storymap"))
        );
    }
}
