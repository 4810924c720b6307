//! Sensor ingestion scheduler.
//!
//! This crate samples groups of sensors on independent, remotely configured
//! intervals and uploads one timestamped batch per group per interval.
//!
//! # Features
//!
//! - **Config cache**: per-group configuration with a TTL, negative caching of
//!   missing or ambiguous rows, and stale-serve on fetch errors
//! - **Scheduling**: a pure due check against the last dispatch time
//! - **Timestamp alignment**: grid-aligned (default) or wall-clock
//! - **Failure isolation**: a failing sensor or group never blocks another
//! - **Two drivers**: one sequential loop, or one task per group
//!
//! External systems sit behind the [`ConfigSource`], [`TelemetrySink`] and
//! [`SensorReader`] traits; [`mock`] provides in-memory versions of all three.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use edgepoll_core::mock::{MockConfigSource, MockReader, MockSink};
//! use edgepoll_core::{BatchUploader, ConfigCache, IngestionLoop, ManualClock};
//! use edgepoll_types::{DeviceIdentity, SensorGroup};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(MockConfigSource::new());
//!     source.set_config("turbidity", 5, true).await;
//!     let sink = Arc::new(MockSink::new());
//!     let clock = Arc::new(ManualClock::at_unix(1_000));
//!
//!     let cache = Arc::new(ConfigCache::new(source, clock.clone(), "RP1"));
//!     let mut ingest = IngestionLoop::new(
//!         DeviceIdentity::new("RP1", "SiteA"),
//!         vec![SensorGroup::new("turbidity", ["Sensor1", "Sensor2"])],
//!         cache,
//!         Arc::new(MockReader::new()),
//!         BatchUploader::new(sink.clone()),
//!         clock,
//!     );
//!
//!     ingest.tick().await;
//!     assert_eq!(sink.batches().await[0].len(), 2);
//! }
//! ```

pub mod alignment;
pub mod cache;
pub mod clock;
pub mod error;
pub mod ingest;
pub mod mock;
pub mod reader;
pub mod retry;
pub mod scheduler;
pub mod traits;
pub mod uploader;

pub use cache::{CacheEntry, ConfigCache, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result, UploadFailureReason};
pub use ingest::{DEFAULT_TICK, GroupOutcome, GroupStats, IngestOptions, IngestionLoop};
pub use reader::SimulatedReader;
pub use retry::{RetryConfig, with_retry};
pub use scheduler::{LastRunTable, is_due};
pub use traits::{ConfigSource, SensorReader, TelemetrySink};
pub use uploader::{BatchUploader, DEFAULT_UPLOAD_TIMEOUT};

// Re-export from edgepoll-types
pub use edgepoll_types::{
    ConfigRow, DeviceIdentity, GroupConfig, Reading, SensorGroup, TelemetryRecord,
    TimestampAlignment, UploadBatch,
};
