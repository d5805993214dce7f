//! Clock abstraction used by retry policies and the operation executor.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock abstraction so timing can be faked in tests.
///
/// Retry-interval alignment, request-result timestamps, and the overall
/// operation deadline all read time through this trait; substituting
/// [`FakeClock`] makes every one of them deterministic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Advance the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).expect("advance out of range");
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Utc.timestamp_opt(0, 0).unwrap())
    }
}

impl Clock for FakeClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
