//! Service configuration.
//!
//! Loaded from `~/.config/edgepoll/edgepoll.toml` (or `--config`), with every
//! section optional:
//!
//! ```toml
//! [device]
//! device_id = "RP1"
//! site = "SiteA"
//!
//! [backend]
//! url = "https://example.supabase.co"
//! api_key = "..."
//! config_table = "device_config"
//! data_table = "turbidity_data"
//!
//! [ingest]
//! tick_ms = 1000
//! cache_ttl_secs = 10
//! call_timeout_ms = 1000
//! alignment = "grid-aligned"
//! mode = "sequential"
//!
//! [upload]
//! max_retries = 0
//!
//! [[groups]]
//! sensor_type = "turbidity"
//! sensors = ["Sensor1", "Sensor2"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use edgepoll_core::{IngestOptions, RetryConfig};
use edgepoll_types::{DeviceIdentity, SensorGroup, TimestampAlignment};

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Static device and site identity.
    pub device: DeviceConfig,
    /// Remote config source and telemetry sink.
    pub backend: BackendConfig,
    /// Loop timing and behavior.
    pub ingest: IngestConfig,
    /// Upload retry policy.
    pub upload: UploadConfig,
    /// Sensor groups to sample.
    pub groups: Vec<GroupEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            backend: BackendConfig::default(),
            ingest: IngestConfig::default(),
            upload: UploadConfig::default(),
            groups: vec![GroupEntry {
                sensor_type: "turbidity".to_string(),
                sensors: vec!["Sensor1".to_string(), "Sensor2".to_string()],
            }],
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use edgepoll_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.device.validate());
        errors.extend(self.backend.validate());
        errors.extend(self.ingest.validate());
        errors.extend(self.upload.validate());

        if self.groups.is_empty() {
            errors.push(ValidationError {
                field: "groups".to_string(),
                message: "at least one sensor group is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, group) in self.groups.iter().enumerate() {
            let prefix = format!("groups[{}]", i);
            errors.extend(group.validate(&prefix));

            if !seen.insert(group.sensor_type.as_str()) {
                errors.push(ValidationError {
                    field: format!("{}.sensor_type", prefix),
                    message: format!("duplicate sensor type '{}'", group.sensor_type),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Settings that are valid but likely to misbehave.
    ///
    /// A call timeout longer than the tick lets one stalled backend hold the
    /// sequential loop for several ticks.
    pub fn warnings(&self) -> Vec<ValidationError> {
        let mut warnings = Vec::new();
        if self.ingest.call_timeout_ms > self.ingest.tick_ms {
            warnings.push(ValidationError {
                field: "ingest.call_timeout_ms".to_string(),
                message: format!(
                    "call timeout {} ms exceeds the {} ms tick; a slow backend will delay other groups",
                    self.ingest.call_timeout_ms, self.ingest.tick_ms
                ),
            });
        }
        warnings
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// The static device identity.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.device.device_id, &self.device.site)
    }

    /// The configured sensor groups, in file order.
    pub fn sensor_groups(&self) -> Vec<SensorGroup> {
        self.groups
            .iter()
            .map(|g| SensorGroup::new(&g.sensor_type, &g.sensors))
            .collect()
    }

    /// Options for the ingestion loop.
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            tick: Duration::from_millis(self.ingest.tick_ms),
            alignment: self.ingest.alignment,
        }
    }

    /// Retry policy for uploads.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.upload.max_retries)
            .initial_delay(Duration::from_millis(self.upload.initial_delay_ms))
            .max_delay(Duration::from_millis(self.upload.max_delay_ms))
    }
}

/// Static device and site identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identity used for config lookups.
    pub device_id: String,
    /// Site identity stamped on every record.
    pub site: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "RP1".to_string(),
            site: "SiteA".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.device_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "device.device_id".to_string(),
                message: "device id cannot be empty".to_string(),
            });
        }
        if self.site.trim().is_empty() {
            errors.push(ValidationError {
                field: "device.site".to_string(),
                message: "site cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the REST backend.
    pub url: String,
    /// API key sent as `apikey` and bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Table holding per-group configuration rows.
    pub config_table: String,
    /// Table receiving telemetry records.
    pub data_table: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: None,
            config_table: "device_config".to_string(),
            data_table: "turbidity_data".to_string(),
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.url.is_empty() {
            errors.push(ValidationError {
                field: "backend.url".to_string(),
                message: "backend URL cannot be empty".to_string(),
            });
        } else if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            errors.push(ValidationError {
                field: "backend.url".to_string(),
                message: format!(
                    "invalid backend URL '{}': must start with http:// or https://",
                    self.url
                ),
            });
        }

        if let Some(key) = &self.api_key
            && key.is_empty()
        {
            errors.push(ValidationError {
                field: "backend.api_key".to_string(),
                message: "API key cannot be empty string (omit it instead)".to_string(),
            });
        }

        for (field, table) in [
            ("backend.config_table", &self.config_table),
            ("backend.data_table", &self.data_table),
        ] {
            if !is_table_name(table) {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!(
                        "invalid table name '{}': use letters, digits and underscores",
                        table
                    ),
                });
            }
        }

        errors
    }
}

fn is_table_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// How groups are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    /// One loop walks every group in order.
    #[default]
    Sequential,
    /// One task per group.
    PerGroup,
}

/// Minimum tick in milliseconds.
pub const MIN_TICK_MS: u64 = 100;
/// Maximum tick in milliseconds (1 minute).
pub const MAX_TICK_MS: u64 = 60_000;

/// Loop timing and behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Poll granularity in milliseconds.
    pub tick_ms: u64,
    /// How long a fetched group config is reused.
    pub cache_ttl_secs: u64,
    /// Budget for each remote call.
    pub call_timeout_ms: u64,
    /// Batch timestamp mode.
    pub alignment: TimestampAlignment,
    /// Sequential or per-group driver.
    pub mode: IngestMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            cache_ttl_secs: 10,
            call_timeout_ms: 1000,
            alignment: TimestampAlignment::GridAligned,
            mode: IngestMode::Sequential,
        }
    }
}

impl IngestConfig {
    /// Validate ingest configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.tick_ms < MIN_TICK_MS {
            errors.push(ValidationError {
                field: "ingest.tick_ms".to_string(),
                message: format!(
                    "tick {} ms is too short (minimum {} ms)",
                    self.tick_ms, MIN_TICK_MS
                ),
            });
        } else if self.tick_ms > MAX_TICK_MS {
            errors.push(ValidationError {
                field: "ingest.tick_ms".to_string(),
                message: format!(
                    "tick {} ms is too long (maximum {} ms / 1 minute)",
                    self.tick_ms, MAX_TICK_MS
                ),
            });
        }

        if self.cache_ttl_secs == 0 {
            errors.push(ValidationError {
                field: "ingest.cache_ttl_secs".to_string(),
                message: "cache TTL must be at least 1 second".to_string(),
            });
        }

        if self.call_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "ingest.call_timeout_ms".to_string(),
                message: "call timeout cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Remote call budget as a duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Maximum upload retries.
pub const MAX_UPLOAD_RETRIES: u32 = 10;

/// Upload retry policy. Retries are off by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl UploadConfig {
    /// Validate upload configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.max_retries > MAX_UPLOAD_RETRIES {
            errors.push(ValidationError {
                field: "upload.max_retries".to_string(),
                message: format!(
                    "{} retries is too many (maximum {})",
                    self.max_retries, MAX_UPLOAD_RETRIES
                ),
            });
        }
        if self.initial_delay_ms > self.max_delay_ms {
            errors.push(ValidationError {
                field: "upload.initial_delay_ms".to_string(),
                message: format!(
                    "initial delay {} ms exceeds max delay {} ms",
                    self.initial_delay_ms, self.max_delay_ms
                ),
            });
        }

        errors
    }
}

/// One sensor group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group identity.
    pub sensor_type: String,
    /// Member sensor ids, read in this order.
    pub sensors: Vec<String>,
}

impl GroupEntry {
    /// Validate a group entry.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.sensor_type.trim().is_empty() {
            errors.push(ValidationError {
                field: format!("{}.sensor_type", prefix),
                message: "sensor type cannot be empty".to_string(),
            });
        }

        if self.sensors.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.sensors", prefix),
                message: "group must have at least one sensor".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            if sensor.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("{}.sensors[{}]", prefix, i),
                    message: "sensor id cannot be empty".to_string(),
                });
            } else if !seen.insert(sensor.as_str()) {
                errors.push(ValidationError {
                    field: format!("{}.sensors[{}]", prefix, i),
                    message: format!("duplicate sensor id '{}'", sensor),
                });
            }
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `ingest.tick_ms` or `groups[0].sensors`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("edgepoll")
        .join("edgepoll.toml")
}
