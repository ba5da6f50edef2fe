//! Crash schedule and timer.
//!
//! A crash round's current step is derived from wall-clock time on demand;
//! nothing ticks in the background. Steps are never paused or rewound.

use crate::config::CrashConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rand_core::{CryptoRng, OsRng, RngCore};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Multiplier schedule and crash step distribution
#[derive(Debug, Clone, PartialEq)]
pub struct CrashSchedule {
    pub step_increment: f64,
    pub min_crash_step: i64,
    pub max_crash_step: i64,
}

impl CrashSchedule {
    pub fn from_config(config: &CrashConfig) -> Self {
        Self {
            step_increment: config.step_increment,
            min_crash_step: config.min_crash_step,
            max_crash_step: config.max_crash_step,
        }
    }

    /// `1 + step * step_increment`; negative steps count as 0
    pub fn multiplier(&self, step: i64) -> f64 {
        1.0 + step.max(0) as f64 * self.step_increment
    }

    /// Uniform crash step in `[min_crash_step, max_crash_step]` from the OS CSPRNG
    pub fn draw_crash_step(&self) -> i64 {
        self.draw_crash_step_with(&mut OsRng)
    }

    pub fn draw_crash_step_with<R: RngCore + CryptoRng>(&self, rng: &mut R) -> i64 {
        rng.gen_range(self.min_crash_step..=self.max_crash_step)
    }
}

impl Default for CrashSchedule {
    fn default() -> Self {
        Self::from_config(&CrashConfig::default())
    }
}

/// Derives the elapsed step of a round from its start time
#[derive(Clone)]
pub struct CrashTimer {
    step_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl CrashTimer {
    pub fn new(step_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { step_duration, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn step_duration(&self) -> Duration {
        self.step_duration
    }

    /// `floor((now - started_at) / step_duration)`, floored at 0
    pub fn elapsed_step(&self, started_at: DateTime<Utc>) -> i64 {
        self.step_at(started_at, self.clock.now())
    }

    pub fn step_at(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let step_ms = self.step_duration.as_millis().max(1) as i64;
        let elapsed_ms = (now - started_at).num_milliseconds();
        if elapsed_ms <= 0 {
            return 0;
        }
        elapsed_ms / step_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn timer(clock: &ManualClock) -> CrashTimer {
        CrashTimer::new(Duration::from_millis(100), Arc::new(clock.clone()))
    }

    #[test]
    fn test_multiplier_is_linear() {
        let schedule = CrashSchedule::default();
        assert_eq!(schedule.multiplier(0), 1.0);
        assert!((schedule.multiplier(30) - 1.30).abs() < 1e-9);
        assert!((schedule.multiplier(400) - 5.00).abs() < 1e-9);
        assert_eq!(schedule.multiplier(-3), 1.0);
    }

    #[test]
    fn test_crash_steps_stay_in_range() {
        let schedule = CrashSchedule::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..50_000 {
            let step = schedule.draw_crash_step_with(&mut rng);
            assert!((10..=400).contains(&step));
            seen_min |= step == 10;
            seen_max |= step == 400;
        }
        assert!(seen_min && seen_max, "both bounds are inclusive");
    }

    #[test]
    fn test_degenerate_range_is_fixed() {
        let schedule = CrashSchedule {
            step_increment: 0.01,
            min_crash_step: 50,
            max_crash_step: 50,
        };
        for _ in 0..10 {
            assert_eq!(schedule.draw_crash_step(), 50);
        }
    }

    #[test]
    fn test_elapsed_step_floors() {
        let clock = ManualClock::default();
        let timer = timer(&clock);
        let started = clock.now();

        assert_eq!(timer.elapsed_step(started), 0);
        clock.advance(Duration::from_millis(99));
        assert_eq!(timer.elapsed_step(started), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(timer.elapsed_step(started), 1);
        clock.advance(Duration::from_millis(2_949));
        assert_eq!(timer.elapsed_step(started), 30);
    }

    #[test]
    fn test_elapsed_step_never_negative() {
        let clock = ManualClock::default();
        let timer = timer(&clock);
        let future_start = clock.now() + ChronoDuration::seconds(5);
        assert_eq!(timer.elapsed_step(future_start), 0);
    }
}
