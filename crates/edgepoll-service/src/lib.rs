//! Edge sensor ingestion service.
//!
//! This crate wires the `edgepoll-core` scheduler to a real deployment:
//! - Reads device identity, backend settings and sensor groups from TOML
//! - Fetches per-group configuration from a PostgREST (Supabase) table
//! - Uploads telemetry batches to a second table
//! - Runs the ingestion loop until Ctrl-C or SIGTERM
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/edgepoll/edgepoll.toml`:
//!
//! ```toml
//! [device]
//! device_id = "RP1"
//! site = "SiteA"
//!
//! [backend]
//! url = "https://example.supabase.co"
//! api_key = "..."
//!
//! [[groups]]
//! sensor_type = "turbidity"
//! sensors = ["Sensor1", "Sensor2"]
//! ```
//!
//! # Remote tables
//!
//! The config table needs one row per `(device_id, sensor_type)` with
//! `interval_sec` and `enabled` columns. Zero or several matching rows switch
//! the group off. The data table receives `sensor_id`, `timestamp`,
//! `raw_value`, `voltage`, `site` and `sensor_type`.

pub mod backend;
pub mod config;
pub mod runtime;

pub use backend::{BackendError, RestBackend};
pub use config::{
    BackendConfig, Config, ConfigError, DeviceConfig, GroupEntry, IngestConfig, IngestMode,
    UploadConfig, ValidationError, default_config_path,
};
pub use runtime::{Runtime, build_loop};
