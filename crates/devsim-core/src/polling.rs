//! Live latest-sample cache for the running entities.
//!
//! Every change of the running set cancels the armed timer, bumps the
//! registry epoch, and arms a new timer whose first round runs immediately.
//! Rounds fetch the latest sample of every id concurrently and upsert the
//! successful results; a round that finishes after its epoch was overtaken is
//! discarded whole. Per-id failures only leave that id's entry stale.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::batch::fan_out;
use crate::error::ApiError;
use crate::metrics::SharedMetrics;
use crate::ticker::{TickFlow, TickFn, Ticker, TickerHandle};
use crate::traits::{DeviceDirectory, TelemetrySource};
use crate::types::{running_ids, Device, EntityId, TelemetrySample};

/// Default period between polling rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Outcome of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Ids whose latest sample was fetched.
    pub fetched: usize,
    /// Ids that have no sample yet.
    pub empty: usize,
    pub failed: usize,
    /// The running set changed while the round was in flight; nothing merged.
    pub discarded: bool,
}

#[derive(Default)]
struct Shared {
    cache: RwLock<HashMap<EntityId, TelemetrySample>>,
    running: RwLock<BTreeSet<EntityId>>,
    epoch: AtomicU64,
}

/// Keeps the latest sample of every running entity fresh.
pub struct PollingRegistry {
    source: Arc<dyn TelemetrySource>,
    ticker: Arc<dyn Ticker>,
    interval: Duration,
    shared: Arc<Shared>,
    timer: Mutex<Option<TickerHandle>>,
    metrics: Option<SharedMetrics>,
}

impl PollingRegistry {
    pub fn new(source: Arc<dyn TelemetrySource>, ticker: Arc<dyn Ticker>, interval: Duration) -> Self {
        PollingRegistry {
            source,
            ticker,
            interval,
            shared: Arc::new(Shared::default()),
            timer: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the running set. Returns false when the set is unchanged, in
    /// which case the armed timer keeps running untouched.
    pub fn set_running<I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = EntityId>,
    {
        let ids: BTreeSet<EntityId> = ids.into_iter().collect();
        let epoch = {
            let mut running = self.shared.running.write();
            if *running == ids {
                return false;
            }
            *running = ids.clone();
            self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.cancel_timer();

        if ids.is_empty() {
            debug!("running set empty; polling idle");
            return true;
        }

        info!(entities = ids.len(), epoch, "polling running set");
        let handle = self.ticker.start(self.interval, self.round_fn(epoch, ids));
        let mut slot = self.timer.lock();
        if self.shared.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(handle);
        }
        true
    }

    /// Derive the running set from a device list.
    pub fn sync_devices(&self, devices: &[Device]) -> bool {
        self.set_running(running_ids(devices))
    }

    /// Fetch the device list and derive the running set from it. On failure
    /// the current set and timer stay as they are.
    pub async fn refresh_from(&self, directory: &dyn DeviceDirectory) -> Result<bool, ApiError> {
        match directory.list_devices().await {
            Ok(devices) => Ok(self.sync_devices(&devices)),
            Err(e) => {
                warn!(error = %e, "device list fetch failed; keeping running set");
                Err(e)
            }
        }
    }

    /// Run one round for the current set outside the timer.
    pub async fn poll_once(&self) -> PollReport {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let ids: Vec<EntityId> = self.shared.running.read().iter().cloned().collect();
        poll_round(
            &self.shared,
            self.source.as_ref(),
            &ids,
            epoch,
            self.metrics.as_ref(),
        )
        .await
    }

    pub fn latest(&self, entity_id: &str) -> Option<TelemetrySample> {
        self.shared.cache.read().get(entity_id).cloned()
    }

    /// Copy of the whole cache, ordered by id.
    pub fn snapshot(&self) -> BTreeMap<EntityId, TelemetrySample> {
        self.shared
            .cache
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    pub fn running_ids(&self) -> Vec<EntityId> {
        self.shared.running.read().iter().cloned().collect()
    }

    /// Whether a polling timer is armed.
    pub fn is_polling(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(TickerHandle::is_active)
    }

    /// Cancel the timer and forget the running set. Cached samples are kept.
    pub fn shutdown(&self) {
        self.shared.running.write().clear();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_timer();
        debug!("polling shut down");
    }

    fn cancel_timer(&self) {
        let previous = self.timer.lock().take();
        if let Some(mut handle) = previous {
            handle.cancel();
        }
    }

    fn round_fn(&self, epoch: u64, ids: BTreeSet<EntityId>) -> TickFn {
        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let metrics = self.metrics.clone();
        let ids: Arc<[EntityId]> = ids.into_iter().collect();

        Box::new(move || {
            let shared = Arc::clone(&shared);
            let source = Arc::clone(&source);
            let metrics = metrics.clone();
            let ids = Arc::clone(&ids);
            async move {
                let report = poll_round(&shared, source.as_ref(), &ids, epoch, metrics.as_ref()).await;
                if report.discarded {
                    TickFlow::Stop
                } else {
                    TickFlow::Continue
                }
            }
            .boxed()
        })
    }
}

async fn poll_round(
    shared: &Shared,
    source: &dyn TelemetrySource,
    ids: &[EntityId],
    epoch: u64,
    metrics: Option<&SharedMetrics>,
) -> PollReport {
    let outcomes = fan_out(ids.iter().cloned(), |id: EntityId| async move {
        source.fetch_latest(&id).await
    })
    .await;

    let mut report = PollReport::default();
    let mut fresh = Vec::with_capacity(ids.len());
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Ok(Some(sample)) => fresh.push((id.clone(), sample)),
            Ok(None) => report.empty += 1,
            Err(e) => {
                report.failed += 1;
                warn!(entity_id = %id, error = %e, "latest sample fetch failed; keeping cached value");
            }
        }
    }

    let current = shared.epoch.load(Ordering::SeqCst);
    if current != epoch {
        debug!(epoch, current, "discarding stale polling round");
        if let Some(m) = metrics {
            m.record_stale_discard();
        }
        report.discarded = true;
        return report;
    }

    report.fetched = fresh.len();
    {
        let mut cache = shared.cache.write();
        for (id, sample) in fresh {
            // Never move an entry backwards in time.
            let newer = cache
                .get(&id)
                .map_or(true, |cached| cached.timestamp <= sample.timestamp);
            if newer {
                cache.insert(id, sample);
            }
        }
    }

    if let Some(m) = metrics {
        m.record_poll_tick(
            report.fetched as u64,
            report.empty as u64,
            report.failed as u64,
        );
    }
    report
}
