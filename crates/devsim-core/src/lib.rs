mod batch;
mod chart;
mod error;
mod metrics;
mod optimistic;
mod playback;
mod polling;
mod ticker;
mod timebase;
mod traits;
mod types;

#[cfg(test)]
mod testing;

pub use batch::{fan_out, BatchResult, BatchRunner};
pub use chart::{ChartPoint, ChartWindow};
pub use error::{ApiError, MutationError, PlaybackError, Recovery, TaskError};
pub use metrics::{create_metrics, MetricsSnapshot, SharedMetrics, SyncMetrics};
pub use optimistic::{DeviceStatusMutator, MutationIntent, OptimisticMutator};
pub use playback::{PlaybackConfig, PlaybackSession, PlaybackSnapshot, PlaybackState};
pub use polling::{PollReport, PollingRegistry, DEFAULT_POLL_INTERVAL};
pub use ticker::{ManualTicker, TickFlow, TickFn, TickFuture, Ticker, TickerHandle, TokioTicker};
pub use timebase::{should_advance, step_threshold, SpeedMultiplier, TimeBase, DEFAULT_BASE_INTERVAL};
pub use traits::{DeviceDirectory, TelemetrySource};
pub use types::{
    running_ids, sort_by_timestamp, Device, DeviceStatus, EntityId, MetricValue, ParamId, Parameter,
    Severity, TelemetrySample, TimeRange,
};
