//! Optimistic state changes reconciled by refetch.
//!
//! A change becomes visible before the server confirms it. When the server
//! rejects it, the canonical state is fetched again and shown instead; if that
//! refetch fails as well, the state the change replaced is restored.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, MutationError, Recovery};
use crate::metrics::SharedMetrics;
use crate::traits::DeviceDirectory;
use crate::types::{Device, DeviceStatus};

/// A pending change and the state it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent<S> {
    pub previous: S,
    pub desired: S,
}

#[derive(Debug)]
struct Visible<S> {
    value: S,
    /// Bumped on every canonical replacement; a refetch that started before
    /// the latest replacement is discarded.
    generation: u64,
}

/// Visible state with optimistic updates.
#[derive(Debug)]
pub struct OptimisticMutator<S> {
    visible: RwLock<Visible<S>>,
    metrics: Option<SharedMetrics>,
}

impl<S> OptimisticMutator<S>
where
    S: Clone + PartialEq + Send + Sync,
{
    pub fn new(initial: S) -> Self {
        OptimisticMutator {
            visible: RwLock::new(Visible {
                value: initial,
                generation: 0,
            }),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn visible(&self) -> S {
        self.visible.read().value.clone()
    }

    /// Borrow the visible state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.visible.read().value)
    }

    /// Install canonical state from the source of truth.
    pub fn replace(&self, canonical: S) {
        let mut visible = self.visible.write();
        visible.value = canonical;
        visible.generation += 1;
    }

    /// Make `change` visible immediately.
    pub fn apply(&self, change: impl FnOnce(&S) -> S) -> MutationIntent<S> {
        let mut visible = self.visible.write();
        let desired = change(&visible.value);
        let previous = std::mem::replace(&mut visible.value, desired.clone());
        MutationIntent { previous, desired }
    }

    /// Apply `change`, then await `commit`. On rejection, reconcile through
    /// `refetch` and return [`MutationError::Rejected`].
    pub async fn mutate<T, C, Fut, R, RFut>(
        &self,
        entity_id: &str,
        change: C,
        commit: Fut,
        refetch: R,
    ) -> Result<T, MutationError>
    where
        C: FnOnce(&S) -> S,
        Fut: Future<Output = Result<T, ApiError>>,
        R: FnOnce() -> RFut,
        RFut: Future<Output = Result<S, ApiError>>,
    {
        let intent = self.apply(change);

        match commit.await {
            Ok(value) => {
                if let Some(m) = &self.metrics {
                    m.record_mutation(false);
                }
                Ok(value)
            }
            Err(e) => {
                error!(entity_id, error = %e, "mutation rejected; reconciling");
                if let Some(m) = &self.metrics {
                    m.record_mutation(true);
                }
                let recovery = self.reconcile(entity_id, intent, refetch).await;
                Err(MutationError::Rejected {
                    entity_id: entity_id.to_string(),
                    source: e,
                    recovery,
                })
            }
        }
    }

    async fn reconcile<R, RFut>(&self, entity_id: &str, intent: MutationIntent<S>, refetch: R) -> Recovery
    where
        R: FnOnce() -> RFut,
        RFut: Future<Output = Result<S, ApiError>>,
    {
        let generation = self.visible.read().generation;
        let fetched = refetch().await;
        if let Some(m) = &self.metrics {
            m.record_reconciliation();
        }

        match fetched {
            Ok(canonical) => {
                let mut visible = self.visible.write();
                if visible.generation == generation {
                    visible.value = canonical;
                    visible.generation += 1;
                } else {
                    debug!(entity_id, "newer canonical state already visible; discarding refetch");
                    if let Some(m) = &self.metrics {
                        m.record_stale_discard();
                    }
                }
                Recovery::Refetched
            }
            Err(e) => {
                warn!(entity_id, error = %e, "reconciliation refetch failed; restoring previous state");
                let mut visible = self.visible.write();
                // A later change already replaced our guess; leave it.
                if visible.value == intent.desired {
                    visible.value = intent.previous;
                }
                Recovery::RolledBack
            }
        }
    }
}

/// Optimistic device status changes against a [`DeviceDirectory`].
pub struct DeviceStatusMutator {
    directory: Arc<dyn DeviceDirectory>,
    state: OptimisticMutator<Vec<Device>>,
}

impl DeviceStatusMutator {
    pub fn new(directory: Arc<dyn DeviceDirectory>, devices: Vec<Device>) -> Self {
        DeviceStatusMutator {
            directory,
            state: OptimisticMutator::new(devices),
        }
    }

    /// Start from the directory's current device list.
    pub async fn load(directory: Arc<dyn DeviceDirectory>) -> Result<Self, ApiError> {
        let devices = directory.list_devices().await?;
        Ok(Self::new(directory, devices))
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.state = self.state.with_metrics(metrics);
        self
    }

    pub fn devices(&self) -> Vec<Device> {
        self.state.visible()
    }

    pub fn status_of(&self, entity_id: &str) -> Option<DeviceStatus> {
        self.state
            .read(|devices| devices.iter().find(|d| d.id == entity_id).map(|d| d.status))
    }

    /// Replace the visible list with the directory's.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let devices = self.directory.list_devices().await?;
        self.state.replace(devices);
        Ok(())
    }

    /// Show `status` for `entity_id` at once, then ask the server to apply it.
    pub async fn set_status(&self, entity_id: &str, status: DeviceStatus) -> Result<Device, MutationError> {
        let previous = self
            .status_of(entity_id)
            .ok_or_else(|| MutationError::UnknownEntity(entity_id.to_string()))?;

        let directory = Arc::clone(&self.directory);
        let updated = self
            .state
            .mutate(
                entity_id,
                |devices| {
                    devices
                        .iter()
                        .map(|d| {
                            if d.id == entity_id {
                                d.clone().with_status(status)
                            } else {
                                d.clone()
                            }
                        })
                        .collect()
                },
                self.directory.set_status(entity_id, status),
                move || async move { directory.list_devices().await },
            )
            .await?;

        info!(entity_id, from = %previous, to = %status, "device status updated");
        Ok(updated)
    }

    /// Flip between running and stopped. Returns the requested status.
    pub async fn toggle(&self, entity_id: &str) -> Result<DeviceStatus, MutationError> {
        let current = self
            .status_of(entity_id)
            .ok_or_else(|| MutationError::UnknownEntity(entity_id.to_string()))?;
        let target = current.toggled();
        self.set_status(entity_id, target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::create_metrics;
    use crate::testing::StubDirectory;

    fn rejected() -> ApiError {
        ApiError::Status {
            status: 409,
            body: "conflict".to_string(),
        }
    }

    #[tokio::test]
    async fn test_change_is_visible_before_commit_resolves() {
        let mutator = OptimisticMutator::new(1u32);
        let seen = mutator
            .mutate(
                "counter",
                |v| v + 1,
                async { Ok::<_, ApiError>(mutator.visible()) },
                || async { Ok(0) },
            )
            .await
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(mutator.visible(), 2);
    }

    #[tokio::test]
    async fn test_rejection_shows_refetched_state() {
        let metrics = create_metrics();
        let mutator = OptimisticMutator::new(vec!["a"]).with_metrics(metrics.clone());
        let err = mutator
            .mutate(
                "list",
                |v| {
                    let mut next = v.clone();
                    next.push("guess");
                    next
                },
                async { Err::<(), _>(rejected()) },
                || async { Ok(vec!["a", "server"]) },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MutationError::Rejected {
                recovery: Recovery::Refetched,
                ..
            }
        ));
        assert_eq!(mutator.visible(), vec!["a", "server"]);
        let snap = metrics.snapshot();
        assert_eq!((snap.mutations, snap.mutation_rejections, snap.reconciliations), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failed_refetch_rolls_back() {
        let mutator = OptimisticMutator::new(10i32);
        let err = mutator
            .mutate(
                "n",
                |v| v * 2,
                async { Err::<(), _>(rejected()) },
                || async { Err(ApiError::Other("offline".to_string())) },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MutationError::Rejected {
                recovery: Recovery::RolledBack,
                ..
            }
        ));
        assert_eq!(mutator.visible(), 10);
    }

    #[tokio::test]
    async fn test_refetch_older_than_visible_canonical_is_discarded() {
        let mutator = OptimisticMutator::new(0i32);
        let _ = mutator
            .mutate(
                "n",
                |_| 1,
                async { Err::<(), _>(rejected()) },
                || async {
                    // A concurrent refresh lands while the refetch is in flight.
                    mutator.replace(7);
                    Ok(3)
                },
            )
            .await;
        assert_eq!(mutator.visible(), 7);
    }

    fn directory() -> Arc<StubDirectory> {
        Arc::new(StubDirectory::with_devices(vec![
            Device::new("d1", "Pump"),
            Device::new("d2", "Valve").with_status(DeviceStatus::Running),
        ]))
    }

    #[tokio::test]
    async fn test_rejected_toggle_reconciles_to_server_state() {
        let dir = directory();
        dir.reject_status("d1");
        let mutator = DeviceStatusMutator::load(dir.clone()).await.unwrap();

        let err = mutator.toggle("d1").await.unwrap_err();
        assert!(matches!(err, MutationError::Rejected { ref entity_id, .. } if entity_id == "d1"));
        assert_eq!(mutator.status_of("d1"), Some(DeviceStatus::Stopped));
        assert_eq!(dir.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_accepted_toggle_needs_no_refetch() {
        let dir = directory();
        let mutator = DeviceStatusMutator::load(dir.clone()).await.unwrap();

        assert_eq!(mutator.toggle("d2").await.unwrap(), DeviceStatus::Stopped);
        assert_eq!(mutator.status_of("d2"), Some(DeviceStatus::Stopped));
        assert_eq!(dir.status_of("d2"), Some(DeviceStatus::Stopped));
        assert_eq!(dir.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let mutator = DeviceStatusMutator::load(directory()).await.unwrap();
        assert!(matches!(
            mutator.set_status("nope", DeviceStatus::Running).await,
            Err(MutationError::UnknownEntity(id)) if id == "nope"
        ));
    }

    #[tokio::test]
    async fn test_rejection_with_unreachable_list_rolls_back() {
        let dir = directory();
        let mutator = DeviceStatusMutator::load(dir.clone()).await.unwrap();
        dir.reject_status("d2");
        dir.set_list_fails(true);

        let err = mutator.set_status("d2", DeviceStatus::Error).await.unwrap_err();
        assert!(matches!(
            err,
            MutationError::Rejected {
                recovery: Recovery::RolledBack,
                ..
            }
        ));
        assert_eq!(mutator.status_of("d2"), Some(DeviceStatus::Running));
    }
}
