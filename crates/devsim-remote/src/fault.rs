use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use devsim_core::{
    ApiError, Device, DeviceDirectory, DeviceStatus, TelemetrySample, TelemetrySource, TimeRange,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;

/// Prefix used in error messages to distinguish injected faults from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Configuration for random fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of failing any one call (0.0-1.0).
    pub error_rate: f64,
}

/// Statistics about injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultStats {
    pub fault_count: usize,
}

/// Whether `err` was produced by a [`FaultyApi`].
pub fn is_injected(err: &ApiError) -> bool {
    err.to_string().contains(FAULT_PREFIX)
}

/// Collaborator wrapper that fails chosen entities and random calls.
pub struct FaultyApi<T: ?Sized> {
    inner: Arc<T>,
    rng: Mutex<ChaCha8Rng>,
    config: FaultConfig,
    failing: parking_lot::RwLock<HashSet<String>>,
    fault_count: AtomicUsize,
}

impl<T: ?Sized> FaultyApi<T> {
    pub fn new(inner: Arc<T>, rng: ChaCha8Rng, config: FaultConfig) -> Self {
        FaultyApi {
            inner,
            rng: Mutex::new(rng),
            config,
            failing: parking_lot::RwLock::new(HashSet::new()),
            fault_count: AtomicUsize::new(0),
        }
    }

    /// Wrapper that only fails targeted entities.
    pub fn targeted(inner: Arc<T>) -> Self {
        use rand::SeedableRng;
        Self::new(inner, ChaCha8Rng::seed_from_u64(0), FaultConfig::default())
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    /// Fail every call that names `entity_id` until [`heal`](Self::heal).
    pub fn fail(&self, entity_id: &str) {
        self.failing.write().insert(entity_id.to_string());
    }

    pub fn heal(&self, entity_id: &str) {
        self.failing.write().remove(entity_id);
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            fault_count: self.fault_count.load(Ordering::Relaxed),
        }
    }

    /// Decide whether this call fails, and how.
    async fn check(&self, op: &str, entity_id: Option<&str>) -> Result<(), ApiError> {
        if let Some(id) = entity_id {
            if self.failing.read().contains(id) {
                self.fault_count.fetch_add(1, Ordering::Relaxed);
                return Err(ApiError::Status {
                    status: 500,
                    body: format!("{} {} rejected for {}", FAULT_PREFIX, op, id),
                });
            }
        }

        if self.config.error_rate <= 0.0 {
            return Ok(());
        }
        let mut rng = self.rng.lock().await;
        let roll: f64 = rng.gen();
        if roll >= self.config.error_rate {
            return Ok(());
        }

        self.fault_count.fetch_add(1, Ordering::Relaxed);
        let target = entity_id.unwrap_or("*").to_string();
        if rng.gen::<bool>() {
            Err(ApiError::Timeout {
                operation: format!("{} {}", FAULT_PREFIX, op),
                target,
            })
        } else {
            Err(ApiError::ConnectionFailed {
                endpoint: format!("{} faulty", FAULT_PREFIX),
                source: Box::new(std::io::Error::other(format!(
                    "{} connection failed during {}",
                    FAULT_PREFIX, op
                ))),
            })
        }
    }
}

#[async_trait]
impl<T> TelemetrySource for FaultyApi<T>
where
    T: TelemetrySource + ?Sized,
{
    async fn fetch_range(
        &self,
        entity_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, ApiError> {
        self.check("fetch_range", Some(entity_id)).await?;
        self.inner.fetch_range(entity_id, range, limit).await
    }

    async fn fetch_latest(&self, entity_id: &str) -> Result<Option<TelemetrySample>, ApiError> {
        self.check("fetch_latest", Some(entity_id)).await?;
        self.inner.fetch_latest(entity_id).await
    }
}

#[async_trait]
impl<T> DeviceDirectory for FaultyApi<T>
where
    T: DeviceDirectory + ?Sized,
{
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.check("list_devices", None).await?;
        self.inner.list_devices().await
    }

    async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, ApiError> {
        self.check("set_status", Some(entity_id)).await?;
        self.inner.set_status(entity_id, status).await
    }

    async fn delete_device(&self, entity_id: &str) -> Result<(), ApiError> {
        self.check("delete_device", Some(entity_id)).await?;
        self.inner.delete_device(entity_id).await
    }

    async fn create_device(&self, device: &Device) -> Result<Device, ApiError> {
        self.check("create_device", Some(&device.id)).await?;
        self.inner.create_device(device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryApi;
    use rand::SeedableRng;

    #[tokio::test]
    async fn test_targeted_failures_are_deterministic() {
        let inner = Arc::new(MemoryApi::with_devices([Device::new("a", "A"), Device::new("b", "B")]));
        let api = FaultyApi::targeted(inner);
        api.fail("b");

        assert!(api.set_status("a", DeviceStatus::Running).await.is_ok());
        let err = api.set_status("b", DeviceStatus::Running).await.unwrap_err();
        assert!(is_injected(&err));
        assert!(api.list_devices().await.is_ok());

        api.heal("b");
        assert!(api.set_status("b", DeviceStatus::Running).await.is_ok());
        assert_eq!(api.stats().fault_count, 1);
    }

    #[tokio::test]
    async fn test_random_faults_follow_seed() {
        let run = |seed: u64| async move {
            let api = FaultyApi::new(
                Arc::new(MemoryApi::new()),
                ChaCha8Rng::seed_from_u64(seed),
                FaultConfig { error_rate: 0.5 },
            );
            let mut pattern = Vec::new();
            for _ in 0..32 {
                pattern.push(api.fetch_latest("x").await.is_err());
            }
            (pattern, api.stats().fault_count)
        };

        let (first, faults) = run(7).await;
        let (second, _) = run(7).await;
        assert_eq!(first, second);
        assert_eq!(faults, first.iter().filter(|f| **f).count());
        assert!(faults > 0 && faults < 32);
    }

    #[tokio::test]
    async fn test_injected_errors_are_transient() {
        let api = FaultyApi::new(
            Arc::new(MemoryApi::new()),
            ChaCha8Rng::seed_from_u64(1),
            FaultConfig { error_rate: 1.0 },
        );
        for _ in 0..8 {
            let err = api.list_devices().await.unwrap_err();
            assert!(err.is_transient());
            assert!(is_injected(&err));
        }
    }
}
