use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of a simulated device.
pub type EntityId = String;

/// Identifier of a device parameter (one metric column).
pub type ParamId = String;

/// Severity attached to a sample's log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric view for plotting. Booleans map to 0/1, text has no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{}", b),
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// One timestamped telemetry record. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metrics: IndexMap<ParamId, MetricValue>,
    #[serde(default)]
    pub log_message: String,
    #[serde(default)]
    pub severity: Severity,
}

impl TelemetrySample {
    /// Create a sample with no metrics and an empty info-level log line.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        TelemetrySample {
            timestamp,
            metrics: IndexMap::new(),
            log_message: String::new(),
            severity: Severity::Info,
        }
    }

    /// Builder-style helper to add a metric.
    pub fn with_metric(mut self, param: impl Into<ParamId>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(param.into(), value.into());
        self
    }

    /// Builder-style helper to set the log line.
    pub fn with_log(mut self, message: impl Into<String>, severity: Severity) -> Self {
        self.log_message = message.into();
        self.severity = severity;
        self
    }

    pub fn metric(&self, param: &str) -> Option<&MetricValue> {
        self.metrics.get(param)
    }
}

/// Stable ascending sort by timestamp. Samples sharing a timestamp keep arrival order.
pub fn sort_by_timestamp(samples: &mut [TelemetrySample]) {
    samples.sort_by_key(|s| s.timestamp);
}

/// Inclusive time range for historical loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRange { start, end }
    }

    /// The window of `length` ending at `end`. A window reaching past the
    /// earliest representable time starts there instead.
    pub fn ending_at(end: DateTime<Utc>, length: std::time::Duration) -> Self {
        let start = chrono::Duration::from_std(length)
            .ok()
            .and_then(|length| end.checked_sub_signed(length))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        TimeRange { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Operational status of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Running,
    #[default]
    Stopped,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Running => "running",
            DeviceStatus::Stopped => "stopped",
            DeviceStatus::Error => "error",
        }
    }

    /// Start/stop toggle target. A device in error is restarted.
    pub fn toggled(&self) -> DeviceStatus {
        match self {
            DeviceStatus::Running => DeviceStatus::Stopped,
            DeviceStatus::Stopped | DeviceStatus::Error => DeviceStatus::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, DeviceStatus::Running)
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(DeviceStatus::Running),
            "stopped" => Ok(DeviceStatus::Stopped),
            "error" => Ok(DeviceStatus::Error),
            other => Err(format!("Unknown device status: {}", other)),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device parameter definition. Generation settings are kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ParamId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A simulated device as listed by the server.
///
/// Fields this client does not interpret are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u64,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_sampling_rate() -> u64 {
    1000
}

impl Device {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Device {
            id: id.into(),
            name: name.into(),
            device_type: String::new(),
            model: None,
            status: DeviceStatus::Stopped,
            sampling_rate: default_sampling_rate(),
            parameters: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        self
    }
}

/// Ids of the devices currently running, in list order.
pub fn running_ids(devices: &[Device]) -> Vec<EntityId> {
    devices
        .iter()
        .filter(|d| d.status.is_running())
        .map(|d| d.id.clone())
        .collect()
}
