use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::time::Clock;

/// A clock that only moves when told to. `new` takes a base unix timestamp in
/// milliseconds; `advance` moves the clock forward.
#[derive(Debug)]
pub struct FakeClock {
    base_unix_millis: u64,
    offset: Mutex<Duration>,
}

impl FakeClock {
    pub fn new(base_unix_millis: u64) -> Self {
        FakeClock { base_unix_millis, offset: Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap();
        *offset = offset.saturating_add(duration);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock::new(0)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock().unwrap();
        let unix_millis = self.base_unix_millis + u64::try_from(offset.as_millis()).unwrap();
        DateTime::from_timestamp_millis(i64::try_from(unix_millis).unwrap())
            .expect("fake clock timestamp out of chrono range")
    }
}
