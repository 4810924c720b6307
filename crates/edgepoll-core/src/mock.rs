//! In-memory collaborators for testing.
//!
//! [`MockConfigSource`], [`MockSink`] and [`MockReader`] implement the traits
//! in [`crate::traits`] without a network or a sensor bus, so the cache and
//! the ingestion loop can be exercised end to end.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, the next `n` calls, or calls for
//!   a specific group or sensor
//! - **Latency simulation**: delay calls to exercise timeouts
//! - **Call accounting**: count calls and record what was sent
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use edgepoll_core::mock::MockConfigSource;
//! use edgepoll_core::ConfigSource;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(MockConfigSource::new());
//!     source.set_config("turbidity", 5, true).await;
//!
//!     let rows = source.fetch_config("RP1", "turbidity").await.unwrap();
//!     assert_eq!(rows.len(), 1);
//!     assert_eq!(source.fetch_count(), 1);
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use edgepoll_types::{ConfigRow, Reading, TelemetryRecord};

use crate::error::{Error, Result, UploadFailureReason};
use crate::reader::SimulatedReader;
use crate::traits::{ConfigSource, SensorReader, TelemetrySink};

async fn simulate_latency(latency_ms: &AtomicU64) {
    let ms = latency_ms.load(Ordering::Relaxed);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Take one failure from a "fail the next n calls" counter.
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
}

// ==================== Config source ====================

/// A [`ConfigSource`] backed by an in-memory table.
#[derive(Default)]
pub struct MockConfigSource {
    rows: RwLock<HashMap<String, Vec<ConfigRow>>>,
    fetches: RwLock<HashMap<String, u32>>,
    last_device_id: RwLock<Option<String>>,
    fetch_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConfigSource")
            .field("fetch_count", &self.fetch_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockConfigSource {
    /// Create an empty source. Every group starts with zero rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store exactly one row for `sensor_type`.
    pub async fn set_config(&self, sensor_type: &str, interval_sec: i64, enabled: bool) {
        self.set_rows(
            sensor_type,
            vec![ConfigRow {
                interval_sec,
                enabled,
            }],
        )
        .await;
    }

    /// Store arbitrary rows for `sensor_type`, including zero or several.
    pub async fn set_rows(&self, sensor_type: &str, rows: Vec<ConfigRow>) {
        self.rows.write().await.insert(sensor_type.to_string(), rows);
    }

    /// Remove every row for `sensor_type`.
    pub async fn remove(&self, sensor_type: &str) {
        self.rows.write().await.remove(sensor_type);
    }

    /// Make every fetch fail with a transport error.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches, then recover.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total number of fetches, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Number of fetches for one group.
    pub async fn fetch_count_for(&self, sensor_type: &str) -> u32 {
        self.fetches
            .read()
            .await
            .get(sensor_type)
            .copied()
            .unwrap_or(0)
    }

    /// The device id passed to the most recent fetch.
    pub async fn last_device_id(&self) -> Option<String> {
        self.last_device_id.read().await.clone()
    }
}

#[async_trait]
impl ConfigSource for MockConfigSource {
    async fn fetch_config(&self, device_id: &str, sensor_type: &str) -> Result<Vec<ConfigRow>> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        *self
            .fetches
            .write()
            .await
            .entry(sensor_type.to_string())
            .or_default() += 1;
        *self.last_device_id.write().await = Some(device_id.to_string());

        simulate_latency(&self.latency_ms).await;

        if self.should_fail.load(Ordering::Relaxed) || take_failure(&self.remaining_failures) {
            return Err(Error::config_fetch("mock config source unavailable"));
        }

        Ok(self
            .rows
            .read()
            .await
            .get(sensor_type)
            .cloned()
            .unwrap_or_default())
    }
}

// ==================== Telemetry sink ====================

/// A [`TelemetrySink`] that keeps every accepted batch in memory.
pub struct MockSink {
    batches: RwLock<Vec<Vec<TelemetryRecord>>>,
    failing_groups: RwLock<HashSet<String>>,
    failure_reason: RwLock<UploadFailureReason>,
    insert_count: AtomicU32,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
            failing_groups: RwLock::new(HashSet::new()),
            failure_reason: RwLock::new(UploadFailureReason::Transport(
                "mock sink unavailable".to_string(),
            )),
            insert_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }
}

impl std::fmt::Debug for MockSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSink")
            .field("insert_count", &self.insert_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockSink {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` inserts with a transient error, then recover.
    pub fn set_fail_count(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Fail every insert whose records belong to `sensor_type`.
    pub async fn fail_group(&self, sensor_type: &str) {
        self.failing_groups
            .write()
            .await
            .insert(sensor_type.to_string());
    }

    /// The reason reported by [`MockSink::set_should_fail`] and
    /// [`MockSink::fail_group`] failures.
    pub async fn set_failure_reason(&self, reason: UploadFailureReason) {
        *self.failure_reason.write().await = reason;
    }

    /// Delay every insert by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total number of insert calls, including failed ones.
    pub fn insert_count(&self) -> u32 {
        self.insert_count.load(Ordering::Relaxed)
    }

    /// Every accepted batch, in insert order.
    pub async fn batches(&self) -> Vec<Vec<TelemetryRecord>> {
        self.batches.read().await.clone()
    }

    /// Accepted batches for one group.
    pub async fn batches_for(&self, sensor_type: &str) -> Vec<Vec<TelemetryRecord>> {
        self.batches
            .read()
            .await
            .iter()
            .filter(|batch| batch.first().is_some_and(|r| r.sensor_type == sensor_type))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for MockSink {
    async fn insert(&self, records: &[TelemetryRecord]) -> Result<()> {
        self.insert_count.fetch_add(1, Ordering::Relaxed);
        simulate_latency(&self.latency_ms).await;

        if take_failure(&self.remaining_failures) {
            return Err(Error::upload_failed(UploadFailureReason::Transport(
                "transient mock failure".to_string(),
            )));
        }

        let group_fails = match records.first() {
            Some(record) => self.failing_groups.read().await.contains(&record.sensor_type),
            None => false,
        };
        if self.should_fail.load(Ordering::Relaxed) || group_fails {
            let reason = self.failure_reason.read().await.clone();
            return Err(Error::upload_failed(reason));
        }

        self.batches.write().await.push(records.to_vec());
        Ok(())
    }
}

// ==================== Sensor reader ====================

/// A [`SensorReader`] with settable values and per-sensor failures.
///
/// Sensors without an explicit value read [`MockReader::DEFAULT_RAW`].
/// Voltages use the same conversion as [`SimulatedReader`].
#[derive(Default)]
pub struct MockReader {
    values: RwLock<HashMap<String, i64>>,
    failing: RwLock<HashSet<String>>,
    scaling: SimulatedReader,
    read_count: AtomicU32,
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockReader")
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockReader {
    /// Raw value for sensors without an explicit value.
    pub const DEFAULT_RAW: i64 = 15_000;

    /// Create a reader where every sensor succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw value `sensor_id` reads.
    pub async fn set_value(&self, sensor_id: &str, raw_value: i64) {
        self.values
            .write()
            .await
            .insert(sensor_id.to_string(), raw_value);
    }

    /// Make every read of `sensor_id` fail.
    pub async fn fail_sensor(&self, sensor_id: &str) {
        self.failing.write().await.insert(sensor_id.to_string());
    }

    /// Let `sensor_id` succeed again.
    pub async fn restore_sensor(&self, sensor_id: &str) {
        self.failing.write().await.remove(sensor_id);
    }

    /// Delay every read by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total number of reads, including failed ones.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SensorReader for MockReader {
    async fn read(&self, _sensor_type: &str, sensor_id: &str) -> Result<Reading> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        simulate_latency(&self.latency_ms).await;

        if self.failing.read().await.contains(sensor_id) {
            return Err(Error::sensor_read(sensor_id, "mock sensor offline"));
        }

        let raw_value = self
            .values
            .read()
            .await
            .get(sensor_id)
            .copied()
            .unwrap_or(Self::DEFAULT_RAW);
        Ok(Reading::new(
            sensor_id,
            raw_value,
            self.scaling.voltage_for(raw_value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_source_unknown_group_has_no_rows() {
        let source = MockConfigSource::new();
        let rows = source.fetch_config("RP1", "pressure").await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(source.fetch_count_for("pressure").await, 1);
    }

    #[tokio::test]
    async fn test_config_source_transient_failures() {
        let source = MockConfigSource::new();
        source.set_config("turbidity", 5, true).await;
        source.set_transient_failures(1);

        assert!(source.fetch_config("RP1", "turbidity").await.is_err());
        assert!(source.fetch_config("RP1", "turbidity").await.is_ok());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_sink_records_batches() {
        let sink = MockSink::new();
        let record = TelemetryRecord {
            sensor_id: "Sensor1".to_string(),
            timestamp: "1970-01-01T00:00:05.000Z".to_string(),
            raw_value: 15_000,
            voltage: 2.48,
            site: "SiteA".to_string(),
            sensor_type: "turbidity".to_string(),
        };

        sink.insert(std::slice::from_ref(&record)).await.unwrap();
        sink.fail_group("turbidity").await;
        assert!(sink.insert(&[record]).await.is_err());

        assert_eq!(sink.insert_count(), 2);
        assert_eq!(sink.batches_for("turbidity").await.len(), 1);
        assert!(sink.batches_for("temperature").await.is_empty());
    }

    #[tokio::test]
    async fn test_reader_values_and_failures() {
        let reader = MockReader::new();
        reader.set_value("Sensor1", 14_000).await;
        reader.fail_sensor("Sensor2").await;

        let reading = reader.read("turbidity", "Sensor1").await.unwrap();
        assert_eq!(reading.raw_value, 14_000);
        assert_eq!(reading.voltage, 2.31);

        assert!(reader.read("turbidity", "Sensor2").await.is_err());
        reader.restore_sensor("Sensor2").await;
        let reading = reader.read("turbidity", "Sensor2").await.unwrap();
        assert_eq!(reading.raw_value, MockReader::DEFAULT_RAW);
        assert_eq!(reader.read_count(), 3);
    }
}
