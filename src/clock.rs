use std::thread;
use std::time::Duration;

use nix::time::{clock_gettime, ClockId};

/// Time source for the coordinator's settle delays, read-cycle waits and
/// poll bounds.
pub trait Clock {
    /// Monotonic time since an arbitrary fixed point.
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// `CLOCK_MONOTONIC` plus a thread sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => Duration::new(ts.tv_sec() as u64, ts.tv_nsec() as u32),

            Err(_) => Duration::ZERO, // never expecting this
        }
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Monotonic time in seconds, for timestamping readings.
pub fn monotime() -> f64 {
    MonotonicClock.now().as_secs_f64()
}
