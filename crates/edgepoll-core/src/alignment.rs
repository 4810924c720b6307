//! Batch timestamp alignment.
//!
//! In [`TimestampAlignment::GridAligned`] mode the dispatch time is rounded to
//! the nearest multiple of the group interval since the Unix epoch, so a
//! dispatch at 299.6 s with a 300 s interval is stamped 300 s. Ties round up.
//! In [`TimestampAlignment::WallClock`] mode the dispatch time is kept and
//! truncated to milliseconds.

use std::time::Duration;

use time::OffsetDateTime;

use edgepoll_types::TimestampAlignment;

/// Derive the batch timestamp for a dispatch at `now`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use edgepoll_core::alignment::align;
/// use edgepoll_types::TimestampAlignment;
/// use time::OffsetDateTime;
///
/// let now = OffsetDateTime::from_unix_timestamp_nanos(299_600_000_000).unwrap();
/// let stamped = align(TimestampAlignment::GridAligned, now, Duration::from_secs(300));
/// assert_eq!(stamped.unix_timestamp(), 300);
/// ```
#[must_use]
pub fn align(mode: TimestampAlignment, now: OffsetDateTime, interval: Duration) -> OffsetDateTime {
    match mode {
        TimestampAlignment::GridAligned => round_to_grid(now, interval),
        TimestampAlignment::WallClock => truncate_to_millis(now),
    }
}

/// Round `now` to the nearest multiple of `interval` since the epoch.
///
/// A zero interval leaves the time untouched apart from millisecond truncation.
#[must_use]
pub fn round_to_grid(now: OffsetDateTime, interval: Duration) -> OffsetDateTime {
    let step = interval.as_millis() as i128;
    if step == 0 {
        return truncate_to_millis(now);
    }

    let millis = now.unix_timestamp_nanos().div_euclid(1_000_000);
    let rounded = (millis + step / 2).div_euclid(step) * step;
    OffsetDateTime::from_unix_timestamp_nanos(rounded * 1_000_000)
        .unwrap_or_else(|_| truncate_to_millis(now))
}

/// Drop everything below one millisecond.
#[must_use]
pub fn truncate_to_millis(now: OffsetDateTime) -> OffsetDateTime {
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_millis(millis: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).unwrap()
    }

    #[test]
    fn test_grid_rounds_jitter_forward() {
        let stamped = round_to_grid(at_millis(299_600), Duration::from_secs(300));
        assert_eq!(stamped, at_millis(300_000));
    }

    #[test]
    fn test_grid_rounds_late_dispatch_back() {
        let stamped = round_to_grid(at_millis(301_400), Duration::from_secs(300));
        assert_eq!(stamped, at_millis(300_000));
    }

    #[test]
    fn test_grid_tie_rounds_up() {
        let stamped = round_to_grid(at_millis(2_500), Duration::from_secs(5));
        assert_eq!(stamped, at_millis(5_000));
    }

    #[test]
    fn test_grid_below_half_rounds_down() {
        let stamped = round_to_grid(at_millis(2_499), Duration::from_secs(5));
        assert_eq!(stamped, at_millis(0));
    }

    #[test]
    fn test_wall_clock_keeps_millis() {
        let now = at_millis(299_600) + time::Duration::microseconds(750);
        let stamped = align(TimestampAlignment::WallClock, now, Duration::from_secs(300));
        assert_eq!(stamped, at_millis(299_600));
    }

    #[test]
    fn test_zero_interval_falls_back_to_wall_clock() {
        let stamped = round_to_grid(at_millis(1_234), Duration::ZERO);
        assert_eq!(stamped, at_millis(1_234));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn grid_timestamps_are_interval_multiples(
                millis in 0i64..4_102_444_800_000,
                interval in 1u64..86_400,
            ) {
                let stamped = round_to_grid(at_millis(millis), Duration::from_secs(interval));
                prop_assert_eq!(stamped.unix_timestamp() % interval as i64, 0);
                prop_assert_eq!(stamped.nanosecond(), 0);
            }

            #[test]
            fn grid_moves_at_most_half_an_interval(
                millis in 0i64..4_102_444_800_000,
                interval in 1u64..86_400,
            ) {
                let now = at_millis(millis);
                let stamped = round_to_grid(now, Duration::from_secs(interval));
                let shift = (stamped - now).whole_milliseconds().abs();
                prop_assert!(shift <= (interval as i128 * 1000) / 2);
            }
        }
    }
}
