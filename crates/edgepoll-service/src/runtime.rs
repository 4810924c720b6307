//! Wiring from [`Config`] to a running ingestion loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use edgepoll_core::{
    BatchUploader, Clock, ConfigCache, ConfigSource, GroupStats, IngestionLoop, SensorReader,
    SimulatedReader, SystemClock, TelemetrySink,
};

use crate::backend::{BackendError, RestBackend};
use crate::config::{Config, IngestMode};

/// A configured ingestion loop plus the backend it talks to.
#[derive(Debug)]
pub struct Runtime {
    /// Backend shared by the config cache and the uploader.
    pub backend: Arc<RestBackend>,
    /// The loop, ready to tick.
    pub ingest: IngestionLoop,
    /// Which driver [`Runtime::run`] uses.
    pub mode: IngestMode,
}

impl Runtime {
    /// Build the REST backend, simulated reader and system clock from
    /// `config`.
    pub fn build(config: &Config) -> Result<Self, BackendError> {
        let backend = Arc::new(RestBackend::new(
            &config.backend,
            config.ingest.call_timeout(),
        )?);
        let ingest = build_loop(
            config,
            backend.clone(),
            backend.clone(),
            Arc::new(SimulatedReader::new()),
            Arc::new(SystemClock),
        );
        Ok(Self {
            backend,
            ingest,
            mode: config.ingest.mode,
        })
    }

    /// Run until `shutdown` fires, using the configured driver.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Vec<GroupStats> {
        match self.mode {
            IngestMode::Sequential => self.ingest.run(shutdown).await,
            IngestMode::PerGroup => self.ingest.run_per_group(shutdown).await,
        }
    }
}

/// Assemble an ingestion loop from `config` and explicit collaborators.
pub fn build_loop(
    config: &Config,
    source: Arc<dyn ConfigSource>,
    sink: Arc<dyn TelemetrySink>,
    reader: Arc<dyn SensorReader>,
    clock: Arc<dyn Clock>,
) -> IngestionLoop {
    let call_timeout = config.ingest.call_timeout();

    let cache = ConfigCache::new(source, clock.clone(), &config.device.device_id)
        .ttl(config.ingest.cache_ttl())
        .fetch_timeout(call_timeout);
    let uploader = BatchUploader::new(sink)
        .timeout(call_timeout)
        .retry(config.retry_config());

    info!(
        device_id = %config.device.device_id,
        site = %config.device.site,
        groups = config.groups.len(),
        "Ingestion configured"
    );

    IngestionLoop::new(
        config.identity(),
        config.sensor_groups(),
        Arc::new(cache),
        reader,
        uploader,
        clock,
    )
    .options(config.ingest_options())
}
