use std::time::Duration;

use tokio::time::Instant;

pub use devsim_config::SpeedMultiplier;

/// Default step cadence at 1x: ten decisions per second.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum wall-clock gap between two steps at `speed`.
pub fn step_threshold(base_interval: Duration, speed: SpeedMultiplier) -> Duration {
    base_interval / speed.factor()
}

/// Whether `elapsed` since the previous step is enough for one more step.
pub fn should_advance(elapsed: Duration, base_interval: Duration, speed: SpeedMultiplier) -> bool {
    elapsed >= step_threshold(base_interval, speed)
}

/// Converts scheduler ticks into single-index steps at a constant rate.
///
/// Pacing ignores the spacing between sample timestamps; every step takes
/// `base_interval / speed` regardless of how far apart the samples are.
#[derive(Debug, Clone)]
pub struct TimeBase {
    base_interval: Duration,
    last_step: Instant,
}

impl TimeBase {
    /// Anchor a time base at `now`; the first step is due one threshold later.
    pub fn new(base_interval: Duration, now: Instant) -> Self {
        TimeBase {
            base_interval,
            last_step: now,
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Decide whether to step at `now`. At most one step per call.
    ///
    /// A step moves the anchor forward by exactly one threshold, so late
    /// ticks do not stretch the cadence. When the caller fell more than one
    /// threshold behind, the anchor jumps to `now` instead of replaying the
    /// missed steps.
    pub fn poll(&mut self, now: Instant, speed: SpeedMultiplier) -> bool {
        let elapsed = now.saturating_duration_since(self.last_step);
        if !should_advance(elapsed, self.base_interval, speed) {
            return false;
        }
        let threshold = step_threshold(self.base_interval, speed);
        self.last_step += threshold;
        if should_advance(now.saturating_duration_since(self.last_step), self.base_interval, speed) {
            self.last_step = now;
        }
        true
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        TimeBase::new(DEFAULT_BASE_INTERVAL, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_per_speed() {
        let base = DEFAULT_BASE_INTERVAL;
        assert_eq!(step_threshold(base, SpeedMultiplier::X1), Duration::from_millis(100));
        assert_eq!(step_threshold(base, SpeedMultiplier::X2), Duration::from_millis(50));
        assert_eq!(step_threshold(base, SpeedMultiplier::X5), Duration::from_millis(20));
        assert_eq!(step_threshold(base, SpeedMultiplier::X10), Duration::from_millis(10));
        assert_eq!(step_threshold(base, SpeedMultiplier::X50), Duration::from_millis(2));
    }

    #[test]
    fn test_should_advance_boundary() {
        let base = DEFAULT_BASE_INTERVAL;
        assert!(!should_advance(Duration::from_millis(99), base, SpeedMultiplier::X1));
        assert!(should_advance(Duration::from_millis(100), base, SpeedMultiplier::X1));
        assert!(should_advance(Duration::from_millis(10), base, SpeedMultiplier::X10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_steps_at_most_once_per_call() {
        let start = Instant::now();
        let mut tb = TimeBase::new(DEFAULT_BASE_INTERVAL, start);

        assert!(!tb.poll(start, SpeedMultiplier::X1));
        assert!(!tb.poll(start + Duration::from_millis(60), SpeedMultiplier::X1));
        // Long gap: still only one step, and the anchor jumps to now.
        assert!(tb.poll(start + Duration::from_millis(450), SpeedMultiplier::X1));
        assert!(!tb.poll(start + Duration::from_millis(500), SpeedMultiplier::X1));
        assert!(tb.poll(start + Duration::from_millis(550), SpeedMultiplier::X1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_polls_keep_the_cadence() {
        let start = Instant::now();
        let mut tb = TimeBase::new(DEFAULT_BASE_INTERVAL, start);

        // Polled on 16ms frames: steps land on the first frame past each
        // multiple of 100ms, never drifting later.
        let steps: Vec<u64> = (1..=63u64)
            .map(|frame| frame * 16)
            .filter(|ms| tb.poll(start + Duration::from_millis(*ms), SpeedMultiplier::X1))
            .collect();
        assert_eq!(steps, vec![112, 208, 304, 400, 512, 608, 704, 800, 912, 1008]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_applies_to_next_decision() {
        let start = Instant::now();
        let mut tb = TimeBase::new(DEFAULT_BASE_INTERVAL, start);
        assert!(!tb.poll(start + Duration::from_millis(30), SpeedMultiplier::X1));
        assert!(tb.poll(start + Duration::from_millis(30), SpeedMultiplier::X5));
    }
}
