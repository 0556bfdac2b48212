//! Replay of a recorded, time-ordered sample sequence.
//!
//! A [`PlaybackSession`] owns the loaded samples and the current position.
//! While playing, one scheduled advance loop ticks once per step threshold
//! (`base_interval / speed`) and asks the [`TimeBase`] whether to step by
//! exactly one index. Every transition that stops
//! playback or replaces the samples bumps the advance generation and cancels
//! the loop before returning, so a stale loop can never move the index.
//! Range loads carry their own epoch; a response whose epoch was overtaken by
//! a newer load is discarded.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::chart::ChartWindow;
use crate::error::PlaybackError;
use crate::metrics::SharedMetrics;
use crate::ticker::{TickFlow, TickFn, Ticker, TickerHandle};
use crate::timebase::{step_threshold, SpeedMultiplier, TimeBase};
use crate::traits::TelemetrySource;
use crate::types::{sort_by_timestamp, EntityId, TelemetrySample, TimeRange};

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No samples loaded.
    Idle,
    /// Samples loaded, positioned at the first one, not yet played.
    Loaded,
    Playing,
    Paused,
    /// Positioned at the last sample; playback cannot continue.
    Ended,
}

/// Runtime playback settings.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Step cadence at 1x.
    pub base_interval: Duration,
    /// Maximum samples requested per load.
    pub range_limit: usize,
    /// Speed of a fresh session.
    pub default_speed: SpeedMultiplier,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            base_interval: Duration::from_millis(100),
            range_limit: 1000,
            default_speed: SpeedMultiplier::X1,
        }
    }
}

impl From<&devsim_config::PlaybackConfig> for PlaybackConfig {
    fn from(cfg: &devsim_config::PlaybackConfig) -> Self {
        PlaybackConfig {
            base_interval: cfg.base_interval.as_duration(),
            range_limit: cfg.range_limit,
            default_speed: cfg.default_speed,
        }
    }
}

/// Immutable view of a session at one instant.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub entity_id: Option<EntityId>,
    pub range: Option<TimeRange>,
    /// Loaded samples, ascending by timestamp.
    pub samples: Arc<[TelemetrySample]>,
    /// `None` exactly when `samples` is empty.
    pub current_index: Option<usize>,
    pub speed: SpeedMultiplier,
    pub playing: bool,
    pub state: PlaybackState,
}

impl PlaybackSnapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn current_sample(&self) -> Option<&TelemetrySample> {
        self.current_index.and_then(|i| self.samples.get(i))
    }

    pub fn at_end(&self) -> bool {
        match self.current_index {
            Some(i) => i + 1 >= self.samples.len(),
            None => false,
        }
    }

    /// Fraction of samples revealed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match self.current_index {
            Some(i) => (i + 1) as f64 / self.samples.len() as f64,
            None => 0.0,
        }
    }

    /// Future-masked view of this snapshot.
    pub fn chart(&self) -> ChartWindow {
        ChartWindow::new(Arc::clone(&self.samples), self.current_index)
    }
}

#[derive(Debug)]
struct SessionState {
    entity_id: Option<EntityId>,
    range: Option<TimeRange>,
    samples: Arc<[TelemetrySample]>,
    current_index: Option<usize>,
    speed: SpeedMultiplier,
    state: PlaybackState,
    /// Bumped whenever the armed advance loop must stop acting.
    advance_gen: u64,
    /// Bumped by every load; responses from older loads are discarded.
    load_epoch: u64,
}

impl SessionState {
    fn empty(speed: SpeedMultiplier) -> Self {
        SessionState {
            entity_id: None,
            range: None,
            samples: Arc::from(Vec::new()),
            current_index: None,
            speed,
            state: PlaybackState::Idle,
            advance_gen: 0,
            load_epoch: 0,
        }
    }

    fn last_index(&self) -> Option<usize> {
        self.samples.len().checked_sub(1)
    }

    fn at_end(&self) -> bool {
        matches!((self.current_index, self.last_index()), (Some(i), Some(last)) if i >= last)
    }

    /// Invalidate the armed loop and leave the playing state.
    fn halt(&mut self, next: PlaybackState) {
        self.advance_gen += 1;
        if self.state == PlaybackState::Playing {
            self.state = next;
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            entity_id: self.entity_id.clone(),
            range: self.range,
            samples: Arc::clone(&self.samples),
            current_index: self.current_index,
            speed: self.speed,
            playing: self.state == PlaybackState::Playing,
            state: self.state,
        }
    }
}

/// Stateful replay of one entity's samples over one time range.
pub struct PlaybackSession {
    source: Arc<dyn TelemetrySource>,
    ticker: Arc<dyn Ticker>,
    config: PlaybackConfig,
    state: Arc<Mutex<SessionState>>,
    /// The armed advance loop and the generation it was armed for.
    advance: Mutex<Option<(u64, TickerHandle)>>,
    metrics: Option<SharedMetrics>,
}

impl PlaybackSession {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        ticker: Arc<dyn Ticker>,
        config: PlaybackConfig,
    ) -> Self {
        let state = SessionState::empty(config.default_speed);
        PlaybackSession {
            source,
            ticker,
            config,
            state: Arc::new(Mutex::new(state)),
            advance: Mutex::new(None),
            metrics: None,
        }
    }

    /// Attach a shared metrics sink.
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Fetch `range` for `entity_id`, sort it, and reset to the first sample.
    ///
    /// Any armed advance loop is cancelled before the fetch starts. On failure
    /// the previously loaded samples stay in place. Returns the sample count.
    pub async fn load(&self, entity_id: &str, range: TimeRange) -> Result<usize, PlaybackError> {
        if !range.is_valid() {
            return Err(PlaybackError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        let epoch = {
            let mut st = self.state.lock();
            st.halt(PlaybackState::Paused);
            st.load_epoch += 1;
            st.load_epoch
        };
        self.cancel_advance();

        let result = self
            .source
            .fetch_range(entity_id, range, self.config.range_limit)
            .await;

        let mut st = self.state.lock();
        if st.load_epoch != epoch {
            debug!(entity_id, epoch, current = st.load_epoch, "discarding superseded load");
            if let Some(m) = &self.metrics {
                m.record_stale_discard();
            }
            return Err(PlaybackError::Superseded {
                entity_id: entity_id.to_string(),
            });
        }

        let mut samples = match result {
            Ok(samples) => samples,
            Err(e) => {
                error!(entity_id, error = %e, "telemetry range load failed");
                if let Some(m) = &self.metrics {
                    m.record_load(false);
                }
                return Err(PlaybackError::Load {
                    entity_id: entity_id.to_string(),
                    source: e,
                });
            }
        };

        sort_by_timestamp(&mut samples);
        let count = samples.len();
        let (current_index, state) = if count == 0 {
            (None, PlaybackState::Idle)
        } else {
            (Some(0), PlaybackState::Loaded)
        };

        let (speed, advance_gen, load_epoch) = (st.speed, st.advance_gen + 1, st.load_epoch);
        *st = SessionState {
            entity_id: Some(entity_id.to_string()),
            range: Some(range),
            samples: Arc::from(samples),
            current_index,
            speed,
            state,
            advance_gen,
            load_epoch,
        };
        drop(st);

        if let Some(m) = &self.metrics {
            m.record_load(true);
        }
        info!(entity_id, samples = count, "telemetry range loaded");
        Ok(count)
    }

    /// Start advancing. Returns whether the session is playing afterwards.
    ///
    /// Does nothing when no samples are loaded or the position is already at
    /// the last sample.
    pub fn play(&self) -> bool {
        let (generation, speed) = {
            let mut st = self.state.lock();
            match st.state {
                PlaybackState::Idle => return false,
                PlaybackState::Playing => return true,
                _ if st.at_end() => {
                    st.state = PlaybackState::Ended;
                    return false;
                }
                _ => {}
            }
            st.advance_gen += 1;
            st.state = PlaybackState::Playing;
            debug!(index = ?st.current_index, speed = %st.speed, "playback started");
            (st.advance_gen, st.speed)
        };

        self.arm(generation, speed);
        true
    }

    /// Stop advancing and keep the current position.
    pub fn pause(&self) {
        {
            let mut st = self.state.lock();
            st.halt(PlaybackState::Paused);
        }
        self.cancel_advance();
    }

    /// Stop advancing and rewind to the first sample.
    pub fn stop(&self) {
        {
            let mut st = self.state.lock();
            st.halt(PlaybackState::Loaded);
            if !st.samples.is_empty() {
                st.current_index = Some(0);
                st.state = PlaybackState::Loaded;
            }
        }
        self.cancel_advance();
    }

    /// Jump to `index`, clamped into the loaded range. Always pauses.
    /// Returns the new position, or `None` when nothing is loaded.
    pub fn seek(&self, index: usize) -> Option<usize> {
        let position = {
            let mut st = self.state.lock();
            let last = st.last_index()?;
            st.halt(PlaybackState::Paused);
            let target = index.min(last);
            st.current_index = Some(target);
            st.state = if target == last {
                PlaybackState::Ended
            } else {
                PlaybackState::Paused
            };
            target
        };
        self.cancel_advance();
        Some(position)
    }

    /// Change the speed. While playing, the advance loop is re-armed at the
    /// new step threshold and the next step is due one threshold from now.
    pub fn set_speed(&self, speed: SpeedMultiplier) {
        let generation = {
            let mut st = self.state.lock();
            if st.speed == speed {
                return;
            }
            st.speed = speed;
            if st.state != PlaybackState::Playing {
                return;
            }
            st.advance_gen += 1;
            st.advance_gen
        };
        debug!(speed = %speed, "playback speed changed");
        self.arm(generation, speed);
    }

    /// Cancel any armed loop; the position is kept.
    pub fn close(&self) {
        self.pause();
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.lock().snapshot()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.lock().state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().current_index
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().state == PlaybackState::Playing
    }

    pub fn current_sample(&self) -> Option<TelemetrySample> {
        let st = self.state.lock();
        st.current_index.and_then(|i| st.samples.get(i).cloned())
    }

    /// Future-masked view of the current position.
    pub fn chart(&self) -> ChartWindow {
        self.snapshot().chart()
    }

    /// Replace the armed loop with one ticking at the step threshold.
    fn arm(&self, generation: u64, speed: SpeedMultiplier) {
        self.cancel_advance();
        let period = step_threshold(self.config.base_interval, speed);
        let handle = self.ticker.start(period, self.advance_fn(generation));
        self.install(generation, handle);
    }

    fn advance_fn(&self, generation: u64) -> TickFn {
        let state = Arc::clone(&self.state);
        let metrics = self.metrics.clone();
        let mut timebase = TimeBase::new(self.config.base_interval, Instant::now());

        Box::new(move || {
            let flow = advance_once(&state, generation, &mut timebase, metrics.as_ref());
            futures::future::ready(flow).boxed()
        })
    }

    fn install(&self, generation: u64, handle: TickerHandle) {
        let mut slot = self.advance.lock();
        match slot.as_ref() {
            // A newer play() already installed its loop; ours is stale.
            Some((installed, _)) if *installed > generation => drop(handle),
            _ => *slot = Some((generation, handle)),
        }
    }

    fn cancel_advance(&self) {
        let previous = self.advance.lock().take();
        if let Some((_, mut handle)) = previous {
            handle.cancel();
        }
    }
}

/// One scheduler frame: step by at most one index if the time base allows.
fn advance_once(
    state: &Mutex<SessionState>,
    generation: u64,
    timebase: &mut TimeBase,
    metrics: Option<&SharedMetrics>,
) -> TickFlow {
    let mut st = state.lock();
    if st.advance_gen != generation || st.state != PlaybackState::Playing {
        return TickFlow::Stop;
    }
    if !timebase.poll(Instant::now(), st.speed) {
        return TickFlow::Continue;
    }

    let last = match st.last_index() {
        Some(last) => last,
        None => {
            st.state = PlaybackState::Idle;
            return TickFlow::Stop;
        }
    };
    let next = st.current_index.map_or(0, |i| i + 1).min(last);
    st.current_index = Some(next);
    if let Some(m) = metrics {
        m.record_advance();
    }

    if next == last {
        st.state = PlaybackState::Ended;
        debug!(index = next, "playback reached the end");
        TickFlow::Stop
    } else {
        TickFlow::Continue
    }
}
