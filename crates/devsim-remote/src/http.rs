use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use devsim_config::ApiConfig;
use devsim_core::{
    ApiError, Device, DeviceDirectory, DeviceStatus, MetricValue, Severity, TelemetrySample,
    TelemetrySource, TimeRange,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Columns that never become metrics.
const RESERVED_COLUMNS: &[&str] = &[
    "ts",
    "timestamp",
    "log_message",
    "message",
    "severity",
    "level",
    "device_id",
    "device_name",
    "device_model",
];

/// Client for the device simulator REST API.
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::with_timeouts(
            &config.base_url,
            config.timeout.as_duration(),
            config.connect_timeout.as_duration(),
        )
    }

    pub fn with_timeouts(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn device_url(&self, entity_id: &str) -> String {
        format!("{}/api/device/{}", self.base_url, urlencoding::encode(entity_id))
    }

    fn data_url(&self, entity_id: &str) -> String {
        format!(
            "{}/api/data/devices/{}/data",
            self.base_url,
            urlencoding::encode(entity_id)
        )
    }

    async fn send(&self, request: RequestBuilder, operation: &str, target: &str) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    operation: operation.to_string(),
                    target: target.to_string(),
                }
            } else if e.is_connect() {
                ApiError::ConnectionFailed {
                    endpoint: self.base_url.clone(),
                    source: Box::new(e),
                }
            } else {
                ApiError::Other(format!("{} failed: {}", operation, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(target.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_rows(
        &self,
        entity_id: &str,
        limit: usize,
        range: Option<TimeRange>,
    ) -> Result<Vec<TelemetrySample>, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(range) = range {
            query.push(("start_time", format_query_time(range.start)));
            query.push(("end_time", format_query_time(range.end)));
        }

        let request = self.client.get(self.data_url(entity_id)).query(&query);
        let rows: Vec<Map<String, Value>> = self
            .send(request, "fetch telemetry", entity_id)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_row(row) {
                Ok(sample) => samples.push(sample),
                Err(e) => warn!(entity_id, error = %e, "skipping undecodable telemetry row"),
            }
        }
        debug!(entity_id, rows = rows.len(), decoded = samples.len(), "telemetry rows fetched");
        Ok(samples)
    }
}

#[async_trait]
impl TelemetrySource for HttpApi {
    async fn fetch_range(
        &self,
        entity_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, ApiError> {
        let samples = self.fetch_rows(entity_id, limit, Some(range)).await?;
        // Older servers ignore the time bounds.
        Ok(samples
            .into_iter()
            .filter(|s| range.contains(s.timestamp))
            .collect())
    }

    async fn fetch_latest(&self, entity_id: &str) -> Result<Option<TelemetrySample>, ApiError> {
        let samples = self.fetch_rows(entity_id, 1, None).await?;
        Ok(samples.into_iter().next())
    }
}

#[async_trait]
impl DeviceDirectory for HttpApi {
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        let request = self.client.get(format!("{}/api/device/", self.base_url));
        self.send(request, "list devices", "/api/device/")
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, ApiError> {
        let url = format!("{}/status/{}", self.device_url(entity_id), status.as_str());
        self.send(self.client.patch(url), "set status", entity_id)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn delete_device(&self, entity_id: &str) -> Result<(), ApiError> {
        self.send(self.client.delete(self.device_url(entity_id)), "delete device", entity_id)
            .await?;
        Ok(())
    }

    async fn create_device(&self, device: &Device) -> Result<Device, ApiError> {
        let request = self
            .client
            .post(format!("{}/api/device/", self.base_url))
            .json(device);
        self.send(request, "create device", &device.id)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn format_query_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Parse a row timestamp: RFC 3339, a naive `YYYY-MM-DD HH:MM:SS[.fff]` taken
/// as UTC, or epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Decode one row of the telemetry endpoint into a sample.
///
/// Columns other than the timestamp, log, severity, and device tags become
/// metrics in column order; nulls and nested values are skipped.
pub fn decode_row(row: &Map<String, Value>) -> Result<TelemetrySample, ApiError> {
    let raw_ts = row
        .get("ts")
        .or_else(|| row.get("timestamp"))
        .ok_or_else(|| ApiError::Decode("row has no timestamp".to_string()))?;
    let timestamp = parse_timestamp(raw_ts)
        .ok_or_else(|| ApiError::Decode(format!("unrecognized timestamp: {}", raw_ts)))?;

    let mut sample = TelemetrySample::new(timestamp);

    if let Some(message) = text_field(row, &["log_message", "message"]) {
        sample.log_message = message.to_string();
    }
    if let Some(level) = text_field(row, &["severity", "level"]) {
        sample.severity = level.parse::<Severity>().unwrap_or_default();
    }

    for (column, value) in row {
        if RESERVED_COLUMNS.contains(&column.as_str()) {
            continue;
        }
        let metric = match value {
            Value::Bool(b) => MetricValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => MetricValue::Number(f),
                None => continue,
            },
            Value::String(s) => MetricValue::Text(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => continue,
        };
        sample.metrics.insert(column.clone(), metric);
    }

    Ok(sample)
}

fn text_field<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| row.get(*k).and_then(Value::as_str))
}
