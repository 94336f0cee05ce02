//! Wall-clock and randomness sources injected into the scheduler.

use std::sync::Mutex;

use palco_core::notification_policy::TimeOfDay;

use crate::lock;

/// Source of the current local time of day.
pub trait Clock: Send + Sync {
    fn local_time_of_day(&self) -> TimeOfDay;
}

/// Reads the host's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_naive(chrono::Local::now().time())
    }
}

/// A clock that reports whatever time it was last set to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<TimeOfDay>,
}

impl ManualClock {
    pub fn new(now: TimeOfDay) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: TimeOfDay) {
        *lock(&self.now) = now;
    }
}

impl Clock for ManualClock {
    fn local_time_of_day(&self) -> TimeOfDay {
        *lock(&self.now)
    }
}

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reports_last_set_time() {
        let clock = ManualClock::new(TimeOfDay::new(8, 0).expect("valid"));
        assert_eq!(clock.local_time_of_day().to_string(), "08:00");

        clock.set(TimeOfDay::new(21, 45).expect("valid"));
        assert_eq!(clock.local_time_of_day().to_string(), "21:45");
    }

    #[test]
    fn thread_random_stays_in_unit_interval() {
        let rng = ThreadRandom;
        for _ in 0..1000 {
            let x = rng.next_unit();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
