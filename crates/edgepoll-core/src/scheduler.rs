//! Interval scheduling.
//!
//! A group is due when at least one interval has elapsed since its last
//! *actual* dispatch. There is no fixed grid and no catch-up: if a tick runs
//! late, the next interval is measured from the late dispatch, so sustained
//! overload stretches the cadence instead of producing bursts.
//!
//! The scheduler holds no state. The owner of a group records the dispatch
//! time itself after deciding to sample.

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;

/// Whether a group last dispatched at `last_run` is due at `now`.
///
/// A group that has never run is treated as if it last ran at the Unix epoch.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use edgepoll_core::scheduler::is_due;
/// use time::OffsetDateTime;
///
/// let at = |s| OffsetDateTime::from_unix_timestamp(s).unwrap();
/// let interval = Duration::from_secs(5);
///
/// assert!(!is_due(None, at(4), interval));
/// assert!(is_due(None, at(5), interval));
/// assert!(!is_due(Some(at(5)), at(9), interval));
/// assert!(is_due(Some(at(5)), at(10), interval));
/// ```
#[must_use]
pub fn is_due(last_run: Option<OffsetDateTime>, now: OffsetDateTime, interval: Duration) -> bool {
    let last = last_run.unwrap_or(OffsetDateTime::UNIX_EPOCH);
    now - last >= interval
}

/// Last dispatch time per group.
///
/// Lives for the lifetime of the process; a restart starts from an empty table,
/// which can cause one early sample per group and nothing worse.
#[derive(Debug, Clone, Default)]
pub struct LastRunTable {
    runs: HashMap<String, OffsetDateTime>,
}

impl LastRunTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last dispatch time for `sensor_type`, if any.
    #[must_use]
    pub fn get(&self, sensor_type: &str) -> Option<OffsetDateTime> {
        self.runs.get(sensor_type).copied()
    }

    /// Whether `sensor_type` is due at `now`.
    #[must_use]
    pub fn is_due(&self, sensor_type: &str, now: OffsetDateTime, interval: Duration) -> bool {
        is_due(self.get(sensor_type), now, interval)
    }

    /// Record a dispatch of `sensor_type` at `now`.
    pub fn record(&mut self, sensor_type: &str, now: OffsetDateTime) {
        self.runs.insert(sensor_type.to_string(), now);
    }

    /// Number of groups that have dispatched at least once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no group has dispatched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
