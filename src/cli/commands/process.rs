//! `storymap-telemetry process`

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::pipeline::{AggregateRequest, AnalyticsProcessor};
use crate::telemetry::{CategoryFilter, DateRange, EventRecord};

/// Arguments of the process command
#[derive(Debug, Clone)]
pub struct ProcessParams {
    pub events: PathBuf,
    pub categories: Vec<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: usize,
    pub page_size: usize,
    pub no_cache: bool,
    pub pretty: bool,
}

pub async fn run_process_command(params: ProcessParams, mut config: PipelineConfig) -> Result<()> {
    let events = load_events(&params.events).await?;
    info!("Loaded {} events from {}", events.len(), params.events.display());

    if params.no_cache {
        config.cache.enabled = false;
    }
    let request = build_request(&params)?;
    debug!("Request: {:?}", request);

    let processor = AnalyticsProcessor::new(&config).await;
    let outcome = processor.process_request(&events, &request).await;
    processor.shutdown();
    let result = outcome?;

    let output = if params.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");
    Ok(())
}

/// Build the request; a single bound leaves the other side open
pub fn build_request(params: &ProcessParams) -> Result<AggregateRequest> {
    let categories = CategoryFilter::with_active(params.categories.iter().map(String::as_str));
    let mut request = AggregateRequest::new(categories).with_page(params.page, params.page_size);

    if params.from.is_some() || params.to.is_some() {
        let start = params.from.unwrap_or(NaiveDate::MIN);
        let end = params.to.unwrap_or(NaiveDate::MAX);
        let range = DateRange::new(start, end).context("invalid --from/--to")?;
        request = request.with_date_range(range);
    }
    Ok(request)
}

async fn load_events(path: &Path) -> Result<Vec<EventRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read events from {}", path.display()))?;
    parse_events(&content).with_context(|| format!("malformed events in {}", path.display()))
}

/// Accept either a JSON array or one JSON record per line
pub fn parse_events(content: &str) -> Result<Vec<EventRecord>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}
