use std::fmt::Debug;
use std::time::Duration;

pub use chrono::{DateTime, Utc};

/// A wall-clock source. Components take `Arc<dyn Clock>` so tests can inject
/// a controllable clock; use [`DefaultClock`] outside of tests.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Seconds since the unix epoch.
    fn unix_now(&self) -> u64 {
        self.now().timestamp().unsigned_abs()
    }

    /// Milliseconds since the unix epoch.
    fn unix_now_millis(&self) -> u64 {
        self.now().timestamp_millis().unsigned_abs()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClock;

impl Clock for DefaultClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Milliseconds elapsed on `clock` since `start_unix_millis`.
/// Saturates at zero if the clock moved backwards.
pub fn elapsed_millis(clock: &dyn Clock, start_unix_millis: u64) -> u64 {
    clock.unix_now_millis().saturating_sub(start_unix_millis)
}

/// Convenience conversion for configs that carry millisecond durations.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).expect("Duration in millis overflows u64")
}
