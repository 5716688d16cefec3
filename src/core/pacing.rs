//! Frame pacing - when each frame of a source goes on the panel.
//!
//! # Timing Model
//!
//! The schedule of a source is anchored at the wall-clock time its first
//! frame is ready. Frame `n + 1` is latched at:
//!
//! - `start + timestamp(n)` when the source supplies the timing, where the
//!   timestamp of a frame is the moment it ends;
//! - `previous + 1s / rate` when a frame rate override is set.
//!
//! Frames are never dropped. A target that already passed is a no-op wait.
//! [`PacingPolicy`] decides whether lateness carries over to later frames.

use std::num::NonZeroU32;
use std::thread;
use std::time::{Duration, Instant};

/// What to do with the schedule after a wait overshoots its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PacingPolicy {
    /// Keep targets relative to the first frame; late frames go out
    /// immediately until the schedule is met again.
    #[default]
    Anchored,
    /// Shift the rest of the schedule by the overshoot so every frame keeps
    /// its full display time.
    Rebase,
}

/// Per-source frame clock.
#[derive(Debug, Clone)]
pub struct Pacer {
    rate: Option<NonZeroU32>,
    policy: PacingPolicy,
    start: Option<Instant>,
    next: Option<Instant>,
}

impl Pacer {
    pub fn new(rate: Option<NonZeroU32>, policy: PacingPolicy) -> Self {
        Self {
            rate,
            policy,
            start: None,
            next: None,
        }
    }

    /// Fixed frame period of the override rate, if any.
    pub fn period(&self) -> Option<Duration> {
        self.rate.map(|rate| Duration::from_secs(1) / rate.get())
    }

    /// Anchor the schedule at `now` if this is the first frame of the source.
    /// Returns the target for the frame about to be latched.
    pub fn begin_frame(&mut self, now: Instant) -> Instant {
        if self.start.is_none() {
            self.start = Some(now);
            self.next = Some(now);
        }
        self.next.unwrap_or(now)
    }

    /// Record that the frame with the given end `timestamp` was latched at
    /// `latched_at`, and compute the target of the next frame.
    pub fn end_frame(&mut self, timestamp: Duration, latched_at: Instant) -> Instant {
        let start = *self.start.get_or_insert(latched_at);
        let target = self.next.unwrap_or(start);

        if self.policy == PacingPolicy::Rebase {
            if let Some(late) = latched_at.checked_duration_since(target) {
                self.start = Some(start + late);
            }
        }

        let next = match self.period() {
            Some(period) => {
                let base = match self.policy {
                    PacingPolicy::Anchored => target,
                    PacingPolicy::Rebase => target.max(latched_at),
                };
                base + period
            }
            None => self.start.unwrap_or(start) + timestamp,
        };

        self.next = Some(next);
        next
    }

    /// Time the schedule was anchored, once the first frame has begun.
    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    /// Target of the next frame, or `None` before the first frame.
    pub fn next_target(&self) -> Option<Instant> {
        self.next
    }
}

/// Sleep until `target` on the monotonic clock. No-op if it already passed.
pub fn sleep_until(target: Instant) {
    let now = Instant::now();
    if let Some(delay) = target.checked_duration_since(now) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_override_spacing_ignores_timestamps() {
        let rate = NonZeroU32::new(30);
        let mut pacer = Pacer::new(rate, PacingPolicy::Anchored);
        let t0 = Instant::now();

        let mut targets = vec![pacer.begin_frame(t0)];
        for (n, timestamp) in [ms(5), ms(900), ms(1), ms(42)].into_iter().enumerate() {
            let latched = targets[n];
            targets.push(pacer.end_frame(timestamp, latched));
        }

        let period = Duration::from_secs(1) / 30;
        for pair in targets.windows(2) {
            assert_eq!(pair[1] - pair[0], period);
        }
    }

    #[test]
    fn test_source_timestamps_are_relative_to_first_frame() {
        let mut pacer = Pacer::new(None, PacingPolicy::Anchored);
        let t0 = Instant::now();

        assert_eq!(pacer.begin_frame(t0), t0);
        assert_eq!(pacer.end_frame(ms(100), t0), t0 + ms(100));

        // Second frame latched late: the schedule stays anchored at t0
        assert_eq!(pacer.begin_frame(t0 + ms(150)), t0 + ms(100));
        assert_eq!(pacer.end_frame(ms(200), t0 + ms(150)), t0 + ms(200));
        assert_eq!(pacer.start(), Some(t0));
    }

    #[test]
    fn test_rebase_shifts_schedule_by_overshoot() {
        let mut pacer = Pacer::new(None, PacingPolicy::Rebase);
        let t0 = Instant::now();

        pacer.begin_frame(t0);
        assert_eq!(pacer.end_frame(ms(100), t0), t0 + ms(100));

        pacer.begin_frame(t0 + ms(130));
        assert_eq!(pacer.end_frame(ms(200), t0 + ms(130)), t0 + ms(230));
        assert_eq!(pacer.start(), Some(t0 + ms(30)));
    }

    #[test]
    fn test_rebase_with_override_spaces_from_actual_latch() {
        let mut pacer = Pacer::new(NonZeroU32::new(10), PacingPolicy::Rebase);
        let t0 = Instant::now();

        pacer.begin_frame(t0);
        assert_eq!(pacer.end_frame(ms(0), t0), t0 + ms(100));
        assert_eq!(pacer.end_frame(ms(0), t0 + ms(180)), t0 + ms(280));
    }

    #[test]
    fn test_sleep_until_past_target_returns() {
        let before = Instant::now();
        sleep_until(before);
        assert!(before.elapsed() < ms(50));

        sleep_until(before + ms(20));
        assert!(before.elapsed() >= ms(20));
    }
}
