//! In-process collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::traits::{DeviceDirectory, TelemetrySource};
use crate::types::{Device, DeviceStatus, TelemetrySample, TimeRange};

/// Sample at `secs` past the epoch with one `value` metric.
pub fn sample_at(secs: i64) -> TelemetrySample {
    TelemetrySample::new(Utc.timestamp_opt(secs, 0).unwrap()).with_metric("value", secs as f64)
}

fn injected(id: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        body: format!("injected failure for {id}"),
    }
}

#[derive(Default)]
pub struct StubSource {
    samples: Mutex<HashMap<String, Vec<TelemetrySample>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    range_calls: AtomicUsize,
    latest_calls: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_samples(&self, id: &str, samples: Vec<TelemetrySample>) {
        self.samples.lock().insert(id.to_string(), samples);
    }

    pub fn set_delay(&self, id: &str, delay: Duration) {
        self.delays.lock().insert(id.to_string(), delay);
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().remove(id);
    }

    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    async fn settle(&self, id: &str) -> Result<(), ApiError> {
        let delay = self.delays.lock().get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(id) {
            return Err(injected(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySource for StubSource {
    async fn fetch_range(
        &self,
        entity_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, ApiError> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.settle(entity_id).await?;
        let samples = self.samples.lock();
        Ok(samples
            .get(entity_id)
            .map(|all| {
                all.iter()
                    .filter(|s| range.contains(s.timestamp))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_latest(&self, entity_id: &str) -> Result<Option<TelemetrySample>, ApiError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.settle(entity_id).await?;
        let samples = self.samples.lock();
        Ok(samples
            .get(entity_id)
            .and_then(|all| all.iter().max_by_key(|s| s.timestamp).cloned()))
    }
}

#[derive(Default)]
pub struct StubDirectory {
    devices: Mutex<Vec<Device>>,
    reject_status: Mutex<HashSet<String>>,
    list_fails: Mutex<bool>,
    list_calls: AtomicUsize,
}

impl StubDirectory {
    pub fn with_devices(devices: Vec<Device>) -> Self {
        StubDirectory {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn reject_status(&self, id: &str) {
        self.reject_status.lock().insert(id.to_string());
    }

    pub fn set_list_fails(&self, fails: bool) {
        *self.list_fails.lock() = fails;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, id: &str) -> Option<DeviceStatus> {
        self.devices
            .lock()
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.status)
    }
}

#[async_trait]
impl DeviceDirectory for StubDirectory {
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.list_fails.lock() {
            return Err(ApiError::ConnectionFailed {
                endpoint: "stub".to_string(),
                source: "unreachable".into(),
            });
        }
        Ok(self.devices.lock().clone())
    }

    async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, ApiError> {
        if self.reject_status.lock().contains(entity_id) {
            return Err(injected(entity_id));
        }
        let mut devices = self.devices.lock();
        let device = devices
            .iter_mut()
            .find(|d| d.id == entity_id)
            .ok_or_else(|| ApiError::NotFound(entity_id.to_string()))?;
        device.status = status;
        Ok(device.clone())
    }

    async fn delete_device(&self, entity_id: &str) -> Result<(), ApiError> {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|d| d.id != entity_id);
        if devices.len() == before {
            return Err(ApiError::NotFound(entity_id.to_string()));
        }
        Ok(())
    }

    async fn create_device(&self, device: &Device) -> Result<Device, ApiError> {
        self.devices.lock().push(device.clone());
        Ok(device.clone())
    }
}
