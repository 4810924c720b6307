//! Time-bounded cache of per-group configuration.
//!
//! Each group has at most one [`CacheEntry`]. An entry younger than the TTL is
//! served without contacting the [`ConfigSource`]; it may be a negative entry
//! (`config: None`) recording that the group has no usable configuration.
//!
//! # Fetch policy
//!
//! | Fetch result | Cache | Returned |
//! |--------------|-------|----------|
//! | exactly one valid row | replaced with the row | the row |
//! | zero rows, several rows, or an invalid row | replaced with a negative entry | `None` |
//! | transport error or timeout | untouched | the stale entry's config, else `None` |
//!
//! Ambiguous configuration is never guessed at, while a transient network
//! failure does not switch off a group that was already known to be enabled.
//! Entries are replaced whole, so a reader never sees a half-updated entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use edgepoll_types::GroupConfig;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::traits::ConfigSource;

/// Default time an entry is served without refetching.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Default budget for one config fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// A cached fetch result for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// The fetched configuration, or `None` for a negative entry.
    pub config: Option<GroupConfig>,
    /// When the fetch completed.
    pub fetched_at: OffsetDateTime,
}

/// Per-group configuration cache backed by a remote [`ConfigSource`].
///
/// The cache is safe to share between tasks behind an [`Arc`].
pub struct ConfigCache {
    source: Arc<dyn ConfigSource>,
    clock: Arc<dyn Clock>,
    device_id: String,
    ttl: Duration,
    fetch_timeout: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("device_id", &self.device_id)
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl ConfigCache {
    /// Create a cache for `device_id` with the default TTL and fetch timeout.
    pub fn new(
        source: Arc<dyn ConfigSource>,
        clock: Arc<dyn Clock>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            clock,
            device_id: device_id.into(),
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Set how long an entry is served without refetching.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the budget for one remote fetch.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// The device identity used for lookups.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Get the configuration for `sensor_type`, fetching it if the cached
    /// entry is missing or older than the TTL.
    ///
    /// `None` means the group must not be sampled.
    pub async fn get(&self, sensor_type: &str) -> Option<GroupConfig> {
        let now = self.clock.now();

        let stale = {
            let entries = self.entries.read().await;
            match entries.get(sensor_type) {
                Some(entry) if now - entry.fetched_at < self.ttl => return entry.config,
                other => other.copied(),
            }
        };

        match self.fetch(sensor_type).await {
            Ok(config) => {
                let entry = CacheEntry {
                    config,
                    fetched_at: self.clock.now(),
                };
                self.entries
                    .write()
                    .await
                    .insert(sensor_type.to_string(), entry);
                config
            }
            Err(e) => {
                let fallback = stale.and_then(|entry| entry.config);
                warn!(
                    sensor_type,
                    error = %e,
                    serving_stale = fallback.is_some(),
                    "Could not fetch config"
                );
                fallback
            }
        }
    }

    /// Fetch from the source and apply the ambiguity policy.
    ///
    /// `Ok(None)` is a definitive "no usable config" answer that should be
    /// cached; `Err` is a transport failure that should not.
    async fn fetch(&self, sensor_type: &str) -> Result<Option<GroupConfig>> {
        let rows = tokio::time::timeout(
            self.fetch_timeout,
            self.source.fetch_config(&self.device_id, sensor_type),
        )
        .await
        .map_err(|_| Error::timeout("fetch_config", self.fetch_timeout))??;

        debug!(sensor_type, rows = ?rows, "Fetched config");

        if rows.len() != 1 {
            let e = Error::config_ambiguous(sensor_type, rows.len());
            warn!(sensor_type, "{}; skipping group", e);
            return Ok(None);
        }

        match GroupConfig::try_from(rows[0]) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(sensor_type, error = %e, "Unusable config row; skipping group");
                Ok(None)
            }
        }
    }

    /// The current entry for `sensor_type`, regardless of age.
    pub async fn entry(&self, sensor_type: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(sensor_type).copied()
    }

    /// Drop the entry for `sensor_type` so the next `get` refetches.
    pub async fn invalidate(&self, sensor_type: &str) {
        self.entries.write().await.remove(sensor_type);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached entries, including negative ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
