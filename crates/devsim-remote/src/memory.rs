use std::collections::HashMap;

use async_trait::async_trait;
use devsim_core::{
    ApiError, Device, DeviceDirectory, DeviceStatus, EntityId, TelemetrySample, TelemetrySource,
    TimeRange,
};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// In-memory simulator for demos and tests.
///
/// Range queries answer newest-first, like the real server, so callers
/// exercise their own sorting.
#[derive(Default)]
pub struct MemoryApi {
    devices: RwLock<IndexMap<EntityId, Device>>,
    samples: RwLock<HashMap<EntityId, Vec<TelemetrySample>>>,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let api = Self::new();
        for device in devices {
            api.insert_device(device);
        }
        api
    }

    /// Insert or replace a device.
    pub fn insert_device(&self, device: Device) {
        self.devices.write().insert(device.id.clone(), device);
    }

    pub fn device(&self, entity_id: &str) -> Option<Device> {
        self.devices.read().get(entity_id).cloned()
    }

    /// Record samples for an entity, in any order.
    pub fn push_samples(&self, entity_id: &str, samples: impl IntoIterator<Item = TelemetrySample>) {
        self.samples
            .write()
            .entry(entity_id.to_string())
            .or_default()
            .extend(samples);
    }

    pub fn sample_count(&self, entity_id: &str) -> usize {
        self.samples.read().get(entity_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl TelemetrySource for MemoryApi {
    async fn fetch_range(
        &self,
        entity_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, ApiError> {
        let samples = self.samples.read();
        let mut rows: Vec<TelemetrySample> = samples
            .get(entity_id)
            .map(|all| {
                all.iter()
                    .filter(|s| range.contains(s.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn fetch_latest(&self, entity_id: &str) -> Result<Option<TelemetrySample>, ApiError> {
        Ok(self
            .samples
            .read()
            .get(entity_id)
            .and_then(|all| all.iter().max_by_key(|s| s.timestamp).cloned()))
    }
}

#[async_trait]
impl DeviceDirectory for MemoryApi {
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        Ok(self.devices.read().values().cloned().collect())
    }

    async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, ApiError> {
        let mut devices = self.devices.write();
        let device = devices
            .get_mut(entity_id)
            .ok_or_else(|| ApiError::NotFound(entity_id.to_string()))?;
        device.status = status;
        Ok(device.clone())
    }

    async fn delete_device(&self, entity_id: &str) -> Result<(), ApiError> {
        if self.devices.write().shift_remove(entity_id).is_none() {
            return Err(ApiError::NotFound(entity_id.to_string()));
        }
        self.samples.write().remove(entity_id);
        Ok(())
    }

    async fn create_device(&self, device: &Device) -> Result<Device, ApiError> {
        let mut devices = self.devices.write();
        if devices.contains_key(&device.id) {
            return Err(ApiError::Status {
                status: 400,
                body: format!("device {} already exists", device.id),
            });
        }
        devices.insert(device.id.clone(), device.clone());
        Ok(device.clone())
    }
}
