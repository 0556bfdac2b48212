use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{Device, DeviceStatus, TelemetrySample, TimeRange};

/// Source of recorded telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Fetch up to `limit` samples of `entity_id` within `range`.
    /// No ordering is guaranteed; callers sort.
    async fn fetch_range(
        &self,
        entity_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, ApiError>;

    /// Fetch the most recent sample of `entity_id`, if any.
    async fn fetch_latest(&self, entity_id: &str) -> Result<Option<TelemetrySample>, ApiError>;
}

/// Source of truth for the device list and its mutations.
#[async_trait]
pub trait DeviceDirectory: Send + Sync + 'static {
    /// List every device.
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    /// Change the status of one device; returns the server's view of it.
    async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, ApiError>;

    /// Delete one device.
    async fn delete_device(&self, entity_id: &str) -> Result<(), ApiError>;

    /// Create one device; returns the stored device.
    async fn create_device(&self, device: &Device) -> Result<Device, ApiError>;
}
