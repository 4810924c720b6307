//! The ingestion loop.
//!
//! On every tick each configured group goes through the same pipeline:
//!
//! 1. look up its configuration in the [`ConfigCache`] (absent or disabled
//!    groups stop here)
//! 2. ask the scheduler whether the group is due
//! 3. record the dispatch time, then read every member sensor
//! 4. build one [`UploadBatch`] with a shared, aligned timestamp
//! 5. hand the batch to the [`BatchUploader`]
//!
//! The dispatch time is recorded before the upload, so a failed upload gives
//! up its slot and the group is sampled again one full interval later. A
//! failing group never affects another group.
//!
//! Two drivers are provided. [`IngestionLoop::run`] walks the groups in order
//! on a single task. [`IngestionLoop::run_per_group`] spawns one task per
//! group; each task owns its own dispatch time and shares only the config
//! cache and the collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use edgepoll_types::{DeviceIdentity, Reading, SensorGroup, TimestampAlignment, UploadBatch};

use crate::alignment::align;
use crate::cache::ConfigCache;
use crate::clock::Clock;
use crate::error::Error;
use crate::scheduler::LastRunTable;
use crate::traits::SensorReader;
use crate::uploader::BatchUploader;

/// Default poll granularity.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Consecutive failures logged at `warn` before the group goes quiet.
const LOUD_FAILURES: u32 = 3;

/// Knobs for the loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// How often every group is checked.
    pub tick: Duration,
    /// How batch timestamps are derived from the dispatch time.
    pub alignment: TimestampAlignment,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            alignment: TimestampAlignment::default(),
        }
    }
}

/// What happened to one group during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// No configuration, or configuration with `enabled = false`.
    Disabled,
    /// Enabled, but the interval has not elapsed.
    NotDue,
    /// A batch was delivered.
    Uploaded {
        /// Number of readings in the batch.
        readings: usize,
    },
    /// Dispatched, but the upload failed.
    UploadFailed,
    /// Dispatched, but every sensor read failed so nothing was sent.
    NoReadings,
}

/// Per-group counters kept by the loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    /// Group identity.
    pub sensor_type: String,
    /// Number of times the group was due and dispatched.
    pub dispatches: u64,
    /// Batches delivered.
    pub uploads_ok: u64,
    /// Batches that could not be delivered.
    pub uploads_failed: u64,
    /// Individual sensor reads that failed.
    pub read_failures: u64,
    /// Dispatches in a row that ended without a delivered batch.
    pub consecutive_failures: u32,
    /// Time of the most recent dispatch.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_dispatch_at: Option<OffsetDateTime>,
    /// Most recent failure message.
    pub last_error: Option<String>,
}

impl GroupStats {
    /// Empty counters for `sensor_type`.
    pub fn new(sensor_type: impl Into<String>) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            ..Default::default()
        }
    }

    fn record_success(&mut self) {
        self.uploads_ok += 1;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, message: String) {
        self.consecutive_failures += 1;
        if self.consecutive_failures <= LOUD_FAILURES {
            warn!(
                sensor_type = %self.sensor_type,
                attempt = self.consecutive_failures,
                "{}", message
            );
        } else if self.consecutive_failures == LOUD_FAILURES + 1 {
            error!(
                sensor_type = %self.sensor_type,
                "{} ({} dispatches in a row); further failures logged at debug",
                message, self.consecutive_failures
            );
        } else {
            debug!(sensor_type = %self.sensor_type, "{}", message);
        }
        self.last_error = Some(message);
    }
}

/// Everything a group needs to be processed, shared between drivers.
#[derive(Clone)]
struct Pipeline {
    identity: Arc<DeviceIdentity>,
    cache: Arc<ConfigCache>,
    reader: Arc<dyn SensorReader>,
    uploader: Arc<BatchUploader>,
    clock: Arc<dyn Clock>,
    alignment: TimestampAlignment,
}

impl Pipeline {
    async fn process(
        &self,
        group: &SensorGroup,
        last_run: &mut LastRunTable,
        stats: &mut GroupStats,
    ) -> GroupOutcome {
        let sensor_type = group.sensor_type.as_str();

        let Some(config) = self.cache.get(sensor_type).await.filter(|c| c.enabled) else {
            return GroupOutcome::Disabled;
        };

        let now = self.clock.now();
        if !last_run.is_due(sensor_type, now, config.interval()) {
            return GroupOutcome::NotDue;
        }
        last_run.record(sensor_type, now);
        stats.dispatches += 1;
        stats.last_dispatch_at = Some(now);

        let stamped_at = align(self.alignment, now, config.interval());
        let readings = self.read_all(group, stats).await;
        if readings.is_empty() {
            stats.record_failure(format!(
                "All {} sensor reads failed; nothing uploaded",
                group.len()
            ));
            return GroupOutcome::NoReadings;
        }

        let count = readings.len();
        let batch = match UploadBatch::new(sensor_type, &self.identity.site, stamped_at, readings)
        {
            Ok(batch) => batch,
            Err(e) => {
                stats.uploads_failed += 1;
                stats.record_failure(format!("Could not build batch: {}", Error::from(e)));
                return GroupOutcome::UploadFailed;
            }
        };

        match self.uploader.upload(&batch).await {
            Ok(()) => {
                info!(
                    sensor_type,
                    timestamp = %batch.timestamp,
                    readings = count,
                    "Uploaded batch"
                );
                stats.record_success();
                GroupOutcome::Uploaded { readings: count }
            }
            Err(e) => {
                stats.uploads_failed += 1;
                stats.record_failure(format!("Upload failed: {}", e));
                GroupOutcome::UploadFailed
            }
        }
    }

    /// Read every member in order, skipping sensors whose read fails.
    async fn read_all(&self, group: &SensorGroup, stats: &mut GroupStats) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(group.len());
        for sensor_id in &group.sensors {
            match self.reader.read(&group.sensor_type, sensor_id).await {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    stats.read_failures += 1;
                    warn!(sensor_type = %group.sensor_type, sensor_id, error = %e, "Sensor read failed");
                }
            }
        }
        readings
    }
}

/// Drives every configured group through the ingestion pipeline.
pub struct IngestionLoop {
    pipeline: Pipeline,
    groups: Vec<SensorGroup>,
    last_run: LastRunTable,
    stats: Vec<GroupStats>,
    tick: Duration,
}

impl std::fmt::Debug for IngestionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionLoop")
            .field("identity", &self.pipeline.identity)
            .field("groups", &self.groups)
            .field("tick", &self.tick)
            .field("alignment", &self.pipeline.alignment)
            .finish()
    }
}

impl IngestionLoop {
    /// Create a loop with default [`IngestOptions`].
    pub fn new(
        identity: DeviceIdentity,
        groups: Vec<SensorGroup>,
        cache: Arc<ConfigCache>,
        reader: Arc<dyn SensorReader>,
        uploader: BatchUploader,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = groups
            .iter()
            .map(|g| GroupStats::new(g.sensor_type.clone()))
            .collect();
        Self {
            pipeline: Pipeline {
                identity: Arc::new(identity),
                cache,
                reader,
                uploader: Arc::new(uploader),
                clock,
                alignment: TimestampAlignment::default(),
            },
            groups,
            last_run: LastRunTable::new(),
            stats,
            tick: DEFAULT_TICK,
        }
    }

    /// Apply loop options.
    #[must_use]
    pub fn options(mut self, options: IngestOptions) -> Self {
        self.tick = options.tick;
        self.pipeline.alignment = options.alignment;
        self
    }

    /// The configured groups.
    pub fn groups(&self) -> &[SensorGroup] {
        &self.groups
    }

    /// Per-group counters, in group order.
    pub fn stats(&self) -> &[GroupStats] {
        &self.stats
    }

    /// Dispatch times recorded so far.
    pub fn last_run(&self) -> &LastRunTable {
        &self.last_run
    }

    /// Process every group once, in configuration order.
    pub async fn tick(&mut self) -> Vec<(String, GroupOutcome)> {
        let mut outcomes = Vec::with_capacity(self.groups.len());
        for (group, stats) in self.groups.iter().zip(self.stats.iter_mut()) {
            let outcome = self
                .pipeline
                .process(group, &mut self.last_run, stats)
                .await;
            debug!(sensor_type = %group.sensor_type, ?outcome, "Group processed");
            outcomes.push((group.sensor_type.clone(), outcome));
        }
        outcomes
    }

    /// Tick until `shutdown` turns `true` or its sender is dropped.
    ///
    /// A tick in progress always completes. Returns the final counters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Vec<GroupStats> {
        info!(
            groups = self.groups.len(),
            tick_ms = self.tick.as_millis() as u64,
            alignment = %self.pipeline.alignment,
            "Starting ingestion loop"
        );

        let mut timer = interval(self.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Ingestion loop stopped");
        self.stats
    }

    /// Drive each group on its own task until `shutdown` fires.
    ///
    /// Every task owns the dispatch time of its group, so a slow config fetch
    /// or upload in one group never delays another. Returns the final
    /// counters in group order; a group whose task died reports empty
    /// counters with the failure in `last_error`.
    pub async fn run_per_group(self, shutdown: watch::Receiver<bool>) -> Vec<GroupStats> {
        info!(
            groups = self.groups.len(),
            tick_ms = self.tick.as_millis() as u64,
            alignment = %self.pipeline.alignment,
            "Starting per-group ingestion"
        );

        let handles: Vec<_> = self
            .groups
            .into_iter()
            .zip(self.stats)
            .map(|(group, stats)| {
                let pipeline = self.pipeline.clone();
                let shutdown = shutdown.clone();
                let tick = self.tick;
                let sensor_type = group.sensor_type.clone();
                let handle = tokio::spawn(drive_group(pipeline, group, stats, tick, shutdown));
                async move { (sensor_type, handle.await) }
            })
            .collect();

        let mut all = Vec::with_capacity(handles.len());
        for (sensor_type, joined) in futures::future::join_all(handles).await {
            match joined {
                Ok(stats) => all.push(stats),
                Err(e) => {
                    error!(sensor_type = %sensor_type, "Group task ended abnormally: {}", e);
                    let mut stats = GroupStats::new(sensor_type);
                    stats.last_error = Some(format!("group task ended abnormally: {}", e));
                    all.push(stats);
                }
            }
        }

        info!("Per-group ingestion stopped");
        all
    }
}

async fn drive_group(
    pipeline: Pipeline,
    group: SensorGroup,
    mut stats: GroupStats,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> GroupStats {
    debug!(sensor_type = %group.sensor_type, sensors = group.len(), "Group task started");

    let mut last_run = LastRunTable::new();
    let mut timer = interval(tick);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = timer.tick() => {
                let outcome = pipeline.process(&group, &mut last_run, &mut stats).await;
                debug!(sensor_type = %group.sensor_type, ?outcome, "Group processed");
            }
        }
    }

    stats
}
