//! Concurrent fan-out with isolated failure domains.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{ApiError, TaskError};
use crate::metrics::SharedMetrics;
use crate::traits::DeviceDirectory;
use crate::types::Device;

/// Run `op` for every item concurrently and wait for all of them.
///
/// Returns one outcome per item, in input order. A task that panics yields
/// [`TaskError::Panicked`] and does not disturb its siblings.
pub async fn fan_out<I, T, R, E, F, Fut>(items: I, op: F) -> Vec<Result<R, TaskError<E>>>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let tasks: Vec<_> = items
        .into_iter()
        .map(|item| AssertUnwindSafe(op(item)).catch_unwind())
        .collect();

    join_all(tasks)
        .await
        .into_iter()
        .map(|outcome| match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskError::Failed(e)),
            Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Human-readable tally, e.g. "3 of 5 succeeded".
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded, self.total)
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Runs independent per-item operations and reports only the tally.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    metrics: Option<SharedMetrics>,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `op` over every item. Failures are logged and counted, never
    /// returned.
    pub async fn run<I, T, R, E, F, Fut>(&self, items: I, op: F) -> BatchResult
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display + Clone,
        E: fmt::Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let outcomes = fan_out(items.iter().cloned(), op).await;

        let mut result = BatchResult {
            total: items.len(),
            ..Default::default()
        };
        for (item, outcome) in items.iter().zip(&outcomes) {
            match outcome {
                Ok(_) => result.succeeded += 1,
                Err(e) => {
                    result.failed += 1;
                    warn!(item = %item, error = %e, "batch item failed");
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.record_batch(result.total as u64, result.failed as u64);
        }
        debug!(total = result.total, failed = result.failed, "batch settled");
        result
    }

    /// [`run`](Self::run), then refetch the canonical device list whatever the
    /// tally. The refetch error, if any, is returned alongside the tally.
    pub async fn run_then_refresh<I, T, R, E, F, Fut>(
        &self,
        items: I,
        op: F,
        directory: &dyn DeviceDirectory,
    ) -> (BatchResult, Result<Vec<Device>, ApiError>)
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display + Clone,
        E: fmt::Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let result = self.run(items, op).await;
        let devices = directory.list_devices().await;
        if let Err(e) = &devices {
            warn!(error = %e, "device list refresh after batch failed");
        }
        (result, devices)
    }
}
