//! Normalized telemetry event records
//!
//! Records arrive from the editor's event log as JSON. They are read-only once
//! produced; every accessor here is a lenient view over the raw fields so that a
//! single malformed record degrades to a zero contribution instead of failing the
//! request it belongs to.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Category tag for application errors
pub const ERROR_CATEGORY: &str = "error";
/// Category tag for navigation events
pub const NAVIGATION_CATEGORY: &str = "navigation";
/// Category tag for the auto-update subsystem
pub const AUTO_UPDATE_CATEGORY: &str = "auto-update";
/// Action name marking a failure
pub const ERROR_ACTION: &str = "error";

/// Date format used for day buckets and raw-store keys
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// A single telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Category tag (e.g. "error", "navigation", "auto-update")
    pub category: String,
    /// Action within the category
    pub action: String,
    /// Numeric payload; non-numeric input is treated as absent
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<f64>,
    /// Open key/value metadata
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub metadata: Map<String, Value>,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arch: String,
}

/// Explicit `null` reads the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(numeric))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

impl EventRecord {
    /// Create a record with no value, metadata or host fields
    pub fn new(category: impl Into<String>, action: impl Into<String>, timestamp: i64) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            value: None,
            metadata: Map::new(),
            timestamp,
            platform: String::new(),
            app_version: String::new(),
            arch: String::new(),
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_host(
        mut self,
        platform: impl Into<String>,
        app_version: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        self.platform = platform.into();
        self.app_version = app_version.into();
        self.arch = arch.into();
        self
    }

    /// Value contribution of this record, zero when absent
    pub fn amount(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// UTC calendar day of the record, if the timestamp is representable
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp).map(|dt| dt.date_naive())
    }

    /// Day key in `YYYY-MM-DD` form
    pub fn day_key(&self) -> Option<String> {
        self.date().map(|d| d.format(DAY_FORMAT).to_string())
    }

    /// String metadata value, ignoring empty strings
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Numeric metadata value; numeric strings are accepted
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(numeric)
    }

    /// Category or action marks a failure
    pub fn is_error(&self) -> bool {
        self.category == ERROR_CATEGORY || self.action == ERROR_ACTION
    }

    pub fn is_crash(&self) -> bool {
        self.meta_str("type") == Some("crash")
    }

    /// An auto-update attempt that failed
    pub fn is_update_error(&self) -> bool {
        self.category == AUTO_UPDATE_CATEGORY && self.action == ERROR_ACTION
    }

    /// Platform tag; metadata wins over the record field
    pub fn platform_tag(&self) -> Option<&str> {
        self.meta_str("platform").or(non_empty(&self.platform))
    }

    /// App version tag; metadata wins over the record field
    pub fn version_tag(&self) -> Option<&str> {
        self.meta_str("appVersion").or(non_empty(&self.app_version))
    }

    /// Architecture tag; metadata wins over the record field
    pub fn arch_tag(&self) -> Option<&str> {
        self.meta_str("arch").or(non_empty(&self.arch))
    }

    /// Pattern key `category:action[:type]` used for error correlation
    pub fn pattern_key(&self) -> String {
        match self.meta_str("type") {
            Some(kind) => format!("{}:{}:{}", self.category, self.action, kind),
            None => format!("{}:{}", self.category, self.action),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_value_deserializes_as_absent() {
        let record: EventRecord = serde_json::from_value(json!({
            "category": "navigation",
            "action": "open",
            "value": "not a number",
            "timestamp": 1_704_067_200_000i64
        }))
        .unwrap();

        assert_eq!(record.value, None);
        assert_eq!(record.amount(), 0.0);
    }

    #[test]
    fn test_null_optional_fields_deserialize_as_defaults() {
        let record: EventRecord = serde_json::from_value(json!({
            "category": "error",
            "action": "save",
            "value": null,
            "metadata": null,
            "timestamp": 1_704_067_200_000i64,
            "platform": null,
            "appVersion": null,
            "arch": null
        }))
        .unwrap();

        assert!(record.metadata.is_empty());
        assert_eq!(record.platform, "");
        assert_eq!(record.app_version, "");
        assert_eq!(record.arch, "");
        assert_eq!(record.platform_tag(), None);
    }

    #[test]
    fn test_numeric_string_value_is_accepted() {
        let record: EventRecord = serde_json::from_value(json!({
            "category": "navigation",
            "action": "open",
            "value": " 2.5 ",
            "timestamp": 0
        }))
        .unwrap();

        assert_eq!(record.value, Some(2.5));
    }

    #[test]
    fn test_day_key_uses_utc_calendar_day() {
        // 2024-01-01T23:59:59Z
        let record = EventRecord::new("error", "crash", 1_704_153_599_000);
        assert_eq!(record.day_key().as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_unrepresentable_timestamp_has_no_date() {
        let record = EventRecord::new("error", "crash", i64::MAX);
        assert!(record.date().is_none());
    }

    #[test]
    fn test_pattern_key_includes_type_when_present() {
        let plain = EventRecord::new("error", "save", 0);
        let typed = EventRecord::new("error", "save", 0).with_meta("type", "crash");

        assert_eq!(plain.pattern_key(), "error:save");
        assert_eq!(typed.pattern_key(), "error:save:crash");
        assert!(typed.is_crash());
    }

    #[test]
    fn test_host_tags_prefer_metadata() {
        let record = EventRecord::new("navigation", "open", 0)
            .with_host("linux", "1.0.0", "x64")
            .with_meta("platform", "darwin");

        assert_eq!(record.platform_tag(), Some("darwin"));
        assert_eq!(record.version_tag(), Some("1.0.0"));
        assert_eq!(record.arch_tag(), Some("x64"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = EventRecord::new("navigation", "open", 5).with_host("linux", "2.1.0", "arm64");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["appVersion"], "2.1.0");
        assert!(value.get("value").is_none());
    }
}
