//! Core types for edge telemetry data.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Static identity of the device running the poller.
///
/// Both values come from process configuration and are never re-derived at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Device identifier used to look up per-group configuration (e.g. `RP1`).
    pub device_id: String,
    /// Site name stamped onto every uploaded record (e.g. `SiteA`).
    pub site: String,
}

impl DeviceIdentity {
    /// Create a new device identity.
    pub fn new(device_id: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            site: site.into(),
        }
    }
}

/// A named collection of sensors sampled and uploaded together.
///
/// Groups are declared statically in the process configuration and are not
/// mutated at runtime. Member order is preserved in uploaded batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorGroup {
    /// Group identity, also the `sensor_type` column in the remote tables.
    pub sensor_type: String,
    /// Ordered member sensor identities.
    pub sensors: Vec<String>,
}

impl SensorGroup {
    /// Create a new sensor group.
    ///
    /// # Examples
    ///
    /// ```
    /// use edgepoll_types::SensorGroup;
    ///
    /// let group = SensorGroup::new("turbidity", ["Sensor1", "Sensor2"]);
    /// assert_eq!(group.sensor_type, "turbidity");
    /// assert_eq!(group.len(), 2);
    /// ```
    pub fn new<I, S>(sensor_type: impl Into<String>, sensors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sensor_type: sensor_type.into(),
            sensors: sensors.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of member sensors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the group has no member sensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Operational configuration for one (device, group) pair.
///
/// Created and edited outside the poller; immutable once fetched.
/// The interval is always positive: construction rejects zero, and so does
/// deserialization, which goes through [`ConfigRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ConfigRow", into = "ConfigRow"))]
pub struct GroupConfig {
    interval_seconds: u64,
    /// Whether the group should be sampled at all.
    pub enabled: bool,
}

impl GroupConfig {
    /// Create a new group configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidInterval`] if `interval_seconds` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use edgepoll_types::GroupConfig;
    ///
    /// let config = GroupConfig::new(5, true).unwrap();
    /// assert_eq!(config.interval_seconds(), 5);
    /// assert!(GroupConfig::new(0, true).is_err());
    /// ```
    pub fn new(interval_seconds: u64, enabled: bool) -> ParseResult<Self> {
        if interval_seconds == 0 {
            return Err(ParseError::InvalidInterval(0));
        }
        Ok(Self {
            interval_seconds,
            enabled,
        })
    }

    /// Sampling interval in whole seconds.
    #[must_use]
    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    /// Sampling interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// A configuration row as returned by the remote config source.
///
/// Rows are validated into a [`GroupConfig`] with [`TryFrom`]; the remote
/// table does not enforce a positive interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigRow {
    /// Interval in seconds.
    pub interval_sec: i64,
    /// Whether sampling is enabled.
    pub enabled: bool,
}

impl TryFrom<ConfigRow> for GroupConfig {
    type Error = ParseError;

    fn try_from(row: ConfigRow) -> Result<Self, Self::Error> {
        match u64::try_from(row.interval_sec) {
            Ok(secs) if secs > 0 => GroupConfig::new(secs, row.enabled),
            _ => Err(ParseError::InvalidInterval(row.interval_sec)),
        }
    }
}

impl From<GroupConfig> for ConfigRow {
    fn from(config: GroupConfig) -> Self {
        Self {
            interval_sec: i64::try_from(config.interval_seconds).unwrap_or(i64::MAX),
            enabled: config.enabled,
        }
    }
}

/// A single sample from one sensor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Identity of the sensor that produced the sample.
    pub sensor_id: String,
    /// Raw ADC value.
    pub raw_value: i64,
    /// Voltage derived from the raw value.
    pub voltage: f64,
}

impl Reading {
    /// Create a new reading.
    pub fn new(sensor_id: impl Into<String>, raw_value: i64, voltage: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            raw_value,
            voltage,
        }
    }
}

/// One row as inserted into the remote telemetry table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetryRecord {
    pub sensor_id: String,
    /// ISO-8601 instant with millisecond precision.
    pub timestamp: String,
    pub raw_value: i64,
    pub voltage: f64,
    pub site: String,
    pub sensor_type: String,
}

/// Readings from one group sampled in the same tick.
///
/// Every reading in a batch shares exactly one timestamp so that samples
/// taken together stay comparable downstream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UploadBatch {
    /// Readings in group member order.
    pub readings: Vec<Reading>,
    /// Shared batch timestamp (ISO-8601, millisecond precision, UTC).
    pub timestamp: String,
    /// Site identity.
    pub site: String,
    /// Group identity.
    pub sensor_type: String,
}

impl UploadBatch {
    /// Build a batch stamped with `at`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidTimestamp`] if `at` cannot be formatted.
    pub fn new(
        sensor_type: impl Into<String>,
        site: impl Into<String>,
        at: OffsetDateTime,
        readings: Vec<Reading>,
    ) -> ParseResult<Self> {
        Ok(Self {
            readings,
            timestamp: format_timestamp(at)?,
            site: site.into(),
            sensor_type: sensor_type.into(),
        })
    }

    /// Number of readings in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the batch has no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Flatten the batch into wire records, one per reading.
    #[must_use]
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.readings
            .iter()
            .map(|reading| TelemetryRecord {
                sensor_id: reading.sensor_id.clone(),
                timestamp: self.timestamp.clone(),
                raw_value: reading.raw_value,
                voltage: reading.voltage,
                site: self.site.clone(),
                sensor_type: self.sensor_type.clone(),
            })
            .collect()
    }
}

/// Format an instant as ISO-8601 UTC with millisecond precision.
///
/// # Examples
///
/// ```
/// use edgepoll_types::format_timestamp;
/// use time::OffsetDateTime;
///
/// let at = OffsetDateTime::from_unix_timestamp(300).unwrap();
/// assert_eq!(format_timestamp(at).unwrap(), "1970-01-01T00:05:00.000Z");
/// ```
pub fn format_timestamp(at: OffsetDateTime) -> ParseResult<String> {
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    at.to_offset(UtcOffset::UTC)
        .format(&format)
        .map_err(|e| ParseError::InvalidTimestamp(e.to_string()))
}

/// How batch timestamps are derived from the dispatch time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TimestampAlignment {
    /// Round to the nearest multiple of the group interval since the epoch.
    #[default]
    GridAligned,
    /// Use the dispatch time as-is, truncated to milliseconds.
    WallClock,
}

impl TimestampAlignment {
    /// The configuration name of this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampAlignment::GridAligned => "grid-aligned",
            TimestampAlignment::WallClock => "wall-clock",
        }
    }
}

impl fmt::Display for TimestampAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimestampAlignment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid-aligned" | "grid" => Ok(TimestampAlignment::GridAligned),
            "wall-clock" | "wall" => Ok(TimestampAlignment::WallClock),
            _ => Err(ParseError::UnknownAlignment(s.to_string())),
        }
    }
}
