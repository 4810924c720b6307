//! Wall-clock abstraction.
//!
//! Scheduling decisions, cache expiry, and batch timestamps all read the time
//! through [`Clock`], so tests can drive the loop with a [`ManualClock`]
//! instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> OffsetDateTime;
}

/// The system clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
///
/// Resolution is one millisecond.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use edgepoll_core::{Clock, ManualClock};
///
/// let clock = ManualClock::at_unix(0);
/// clock.advance(Duration::from_millis(1500));
/// assert_eq!(clock.now().unix_timestamp(), 1);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    unix_millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock set to `secs` seconds after the Unix epoch.
    pub fn at_unix(secs: i64) -> Self {
        Self {
            unix_millis: AtomicI64::new(secs.saturating_mul(1000)),
        }
    }

    /// Create a clock set to `at`.
    pub fn at(at: OffsetDateTime) -> Self {
        let millis = (at.unix_timestamp_nanos() / 1_000_000) as i64;
        Self {
            unix_millis: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.unix_millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute number of milliseconds since the epoch.
    pub fn set_unix_millis(&self, millis: i64) {
        self.unix_millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        let millis = self.unix_millis.load(Ordering::SeqCst);
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}
