//! Recurring scheduling behind an injectable interface.
//!
//! A [`Ticker`] invokes a callback once immediately and then once per period
//! until the callback returns [`TickFlow::Stop`] or the returned
//! [`TickerHandle`] is cancelled. Each tick's future is awaited before the next
//! tick is considered, so ticks of one loop never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Whether a recurring loop should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Future produced by one tick.
pub type TickFuture = BoxFuture<'static, TickFlow>;

/// Callback invoked on every tick.
pub type TickFn = Box<dyn FnMut() -> TickFuture + Send + 'static>;

/// A scheduler of recurring callbacks.
pub trait Ticker: Send + Sync + 'static {
    /// Arm a recurring loop. The first tick happens immediately.
    fn start(&self, period: Duration, on_tick: TickFn) -> TickerHandle;
}

/// Owner of one armed loop. Cancelling is synchronous; dropping cancels.
#[derive(Debug)]
pub struct TickerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl TickerHandle {
    fn new(cancelled: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        TickerHandle { cancelled, task }
    }

    /// Stop the loop. No tick starts after this returns.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True until the loop is cancelled or stops itself.
    pub fn is_active(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        match &self.task {
            Some(task) => !task.is_finished(),
            None => true,
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Ticker backed by a tokio task and `tokio::time::interval`.
///
/// Honors tokio's paused clock, which is what tests use as a virtual clock.
#[derive(Debug, Clone)]
pub struct TokioTicker {
    runtime: Handle,
}

impl TokioTicker {
    pub fn new(runtime: Handle) -> Self {
        TokioTicker { runtime }
    }

    /// Ticker on the runtime of the calling task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        TokioTicker::new(Handle::current())
    }
}

impl Ticker for TokioTicker {
    fn start(&self, period: Duration, mut on_tick: TickFn) -> TickerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let period = period.max(Duration::from_millis(1));

        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if on_tick().await == TickFlow::Stop {
                    break;
                }
            }
        });

        TickerHandle::new(cancelled, Some(task))
    }
}

struct ManualSlot {
    cancelled: Arc<AtomicBool>,
    on_tick: Arc<Mutex<TickFn>>,
}

/// Ticker driven by explicit [`ManualTicker::tick`] calls.
///
/// Every live loop runs once per call regardless of its period, which makes
/// scheduling fully deterministic in tests.
#[derive(Default)]
pub struct ManualTicker {
    slots: Mutex<Vec<ManualSlot>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loops still armed.
    pub fn active(&self) -> usize {
        let mut slots = self.slots.lock();
        slots.retain(|s| !s.cancelled.load(Ordering::Acquire));
        slots.len()
    }

    /// Run one tick of every armed loop, in arming order. Returns how many ran.
    pub async fn tick(&self) -> usize {
        let live: Vec<(Arc<AtomicBool>, Arc<Mutex<TickFn>>)> = {
            let mut slots = self.slots.lock();
            slots.retain(|s| !s.cancelled.load(Ordering::Acquire));
            slots
                .iter()
                .map(|s| (Arc::clone(&s.cancelled), Arc::clone(&s.on_tick)))
                .collect()
        };

        let mut ran = 0;
        for (cancelled, on_tick) in live {
            // An earlier callback in this round may have cancelled this one.
            if cancelled.load(Ordering::Acquire) {
                continue;
            }
            let fut = {
                let mut f = on_tick.lock();
                (*f)()
            };
            ran += 1;
            if fut.await == TickFlow::Stop {
                cancelled.store(true, Ordering::Release);
            }
        }
        ran
    }
}

impl Ticker for ManualTicker {
    fn start(&self, _period: Duration, on_tick: TickFn) -> TickerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.slots.lock().push(ManualSlot {
            cancelled: Arc::clone(&cancelled),
            on_tick: Arc::new(Mutex::new(on_tick)),
        });
        TickerHandle::new(cancelled, None)
    }
}
