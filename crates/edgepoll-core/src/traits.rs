//! Trait abstractions at the edges of the ingestion scheduler.
//!
//! The scheduler never talks to a network client or a sensor bus directly.
//! Each external collaborator is consumed through one of these traits, which
//! are constructed once at startup and injected as `Arc<dyn Trait>`:
//!
//! - [`ConfigSource`]: per-group operational configuration
//! - [`TelemetrySink`]: remote table that stores uploaded records
//! - [`SensorReader`]: the capability that produces a raw reading
//!
//! [`crate::mock`] provides in-memory implementations of all three for tests.

use async_trait::async_trait;

use edgepoll_types::{ConfigRow, Reading, TelemetryRecord};

use crate::error::Result;

/// Remote source of per-group configuration.
///
/// # Example
///
/// ```ignore
/// use edgepoll_core::{ConfigSource, Result};
///
/// async fn show<S: ConfigSource>(source: &S) -> Result<()> {
///     let rows = source.fetch_config("RP1", "turbidity").await?;
///     println!("{} row(s)", rows.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch every configuration row matching `(device_id, sensor_type)`.
    ///
    /// Implementations return the rows as-is; deciding what zero or several
    /// rows mean is the caller's job. Transport and remote failures are
    /// reported as [`crate::Error::ConfigFetch`].
    async fn fetch_config(&self, device_id: &str, sensor_type: &str) -> Result<Vec<ConfigRow>>;
}

/// Remote sink for telemetry records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Insert all records in a single remote call.
    ///
    /// Failures are reported as [`crate::Error::Upload`].
    async fn insert(&self, records: &[TelemetryRecord]) -> Result<()>;
}

/// Capability that samples one sensor.
///
/// This is the seam where a real hardware or bus driver replaces the
/// simulated reader. It is never special-cased by group.
#[async_trait]
pub trait SensorReader: Send + Sync {
    /// Read the current value of `sensor_id` in group `sensor_type`.
    ///
    /// Failures are reported as [`crate::Error::SensorRead`] and only affect
    /// this sensor.
    async fn read(&self, sensor_type: &str, sensor_id: &str) -> Result<Reading>;
}
