//! REST client for the remote config table and telemetry table.
//!
//! Speaks the PostgREST dialect used by Supabase:
//!
//! - config rows: `GET {url}/rest/v1/{config_table}?select=interval_sec,enabled&device_id=eq.{id}&sensor_type=eq.{type}`
//! - telemetry: `POST {url}/rest/v1/{data_table}` with a JSON array body and
//!   `Prefer: return=minimal`
//!
//! Both calls send the API key as `apikey` and as a bearer token. One client
//! is built at startup and shared by the config cache and the uploader.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use edgepoll_core::{ConfigSource, Error, TelemetrySink, UploadFailureReason};
use edgepoll_types::{ConfigRow, TelemetryRecord};

use crate::config::BackendConfig;

/// Columns selected from the config table.
const CONFIG_COLUMNS: &str = "interval_sec,enabled";

/// Stand-in for a row whose columns could not be read. Its interval is
/// rejected by `GroupConfig::try_from`, so the group is cached as disabled.
const UNUSABLE_ROW: ConfigRow = ConfigRow {
    interval_sec: 0,
    enabled: false,
};

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Error type for backend construction.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`ConfigSource`] and [`TelemetrySink`] over a PostgREST endpoint.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    config_table: String,
    data_table: String,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("config_table", &self.config_table)
            .field("data_table", &self.data_table)
            .finish()
    }
}

impl RestBackend {
    /// Create a backend whose HTTP client gives up after `timeout`.
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(config, client)
    }

    /// Create a backend with a custom reqwest Client.
    pub fn with_client(config: &BackendConfig, client: Client) -> Result<Self, BackendError> {
        let base_url = config.url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(BackendError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            config_table: config.config_table.clone(),
            data_table: config.data_table.clone(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    fn config_request(&self, device_id: &str, sensor_type: &str) -> RequestBuilder {
        let request = self
            .client
            .get(self.table_url(&self.config_table))
            .query(&[
                ("select", CONFIG_COLUMNS.to_string()),
                ("device_id", format!("eq.{}", device_id)),
                ("sensor_type", format!("eq.{}", sensor_type)),
            ]);
        self.authorize(request)
    }

    fn insert_request(&self, records: &[TelemetryRecord]) -> RequestBuilder {
        let request = self
            .client
            .post(self.table_url(&self.data_table))
            .header("Prefer", "return=minimal")
            .json(records);
        self.authorize(request)
    }
}

/// Decode the JSON array returned by a config query.
///
/// A body that is not a JSON array is a fetch error. An element that is not a
/// valid row (a null column, say) still counts as a row, but one that no
/// group can run on.
pub fn decode_rows(body: &str) -> Result<Vec<ConfigRow>, Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| Error::config_fetch(format!("bad config response: {}", e)))?;

    Ok(values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "Unreadable config row");
                UNUSABLE_ROW
            })
        })
        .collect())
}

async fn error_body(response: Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[async_trait]
impl ConfigSource for RestBackend {
    async fn fetch_config(
        &self,
        device_id: &str,
        sensor_type: &str,
    ) -> edgepoll_core::Result<Vec<ConfigRow>> {
        let response = self
            .config_request(device_id, sensor_type)
            .send()
            .await
            .map_err(|e| Error::config_fetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::config_fetch(format!(
                "config source returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::config_fetch(format!("could not read response: {}", e)))?;
        let rows = decode_rows(&body)?;
        debug!(device_id, sensor_type, rows = rows.len(), "Config query answered");
        Ok(rows)
    }
}

#[async_trait]
impl TelemetrySink for RestBackend {
    async fn insert(&self, records: &[TelemetryRecord]) -> edgepoll_core::Result<()> {
        let response = self.insert_request(records).send().await.map_err(|e| {
            Error::upload_failed(UploadFailureReason::Transport(e.to_string()))
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = error_body(response).await;
            Err(Error::upload_failed(UploadFailureReason::Rejected {
                status: status.as_u16(),
                body,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgepoll_types::GroupConfig;

    fn backend(api_key: Option<&str>) -> RestBackend {
        let config = BackendConfig {
            url: "https://example.supabase.co/".to_string(),
            api_key: api_key.map(String::from),
            ..Default::default()
        };
        RestBackend::new(&config, Duration::from_secs(5)).unwrap()
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord {
            sensor_id: "Sensor1".to_string(),
            timestamp: "2024-01-01T00:05:00.000Z".to_string(),
            raw_value: 15_000,
            voltage: 2.48,
            site: "SiteA".to_string(),
            sensor_type: "turbidity".to_string(),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(backend(None).base_url(), "https://example.supabase.co");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = BackendConfig {
            url: "example.supabase.co".to_string(),
            ..Default::default()
        };
        let result = RestBackend::new(&config, Duration::from_secs(5));
        assert!(matches!(result, Err(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn test_config_request_shape() {
        let request = backend(Some("key123"))
            .config_request("RP1", "turbidity")
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/rest/v1/device_config");

        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("select".to_string(), "interval_sec,enabled".to_string()),
                ("device_id".to_string(), "eq.RP1".to_string()),
                ("sensor_type".to_string(), "eq.turbidity".to_string()),
            ]
        );

        let headers = request.headers();
        assert_eq!(headers["apikey"], "key123");
        assert_eq!(headers["authorization"], "Bearer key123");
    }

    #[test]
    fn test_no_auth_headers_without_key() {
        let request = backend(None)
            .config_request("RP1", "turbidity")
            .build()
            .unwrap();
        assert!(request.headers().get("apikey").is_none());
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn test_insert_request_shape() {
        let request = backend(Some("key123"))
            .insert_request(&[record(), record()])
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://example.supabase.co/rest/v1/turbidity_data");
        assert_eq!(request.headers()["prefer"], "return=minimal");
        assert_eq!(request.headers()["content-type"], "application/json");

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["sensor_id"], "Sensor1");
        assert_eq!(rows[0]["timestamp"], "2024-01-01T00:05:00.000Z");
        assert_eq!(rows[0]["site"], "SiteA");
        assert_eq!(rows[0]["sensor_type"], "turbidity");
    }

    #[test]
    fn test_decode_rows() {
        let rows = decode_rows(r#"[{"interval_sec": 5, "enabled": true}]"#).unwrap();
        assert_eq!(
            rows,
            [ConfigRow {
                interval_sec: 5,
                enabled: true
            }]
        );

        assert!(decode_rows("[]").unwrap().is_empty());
        assert_eq!(decode_rows(r#"[{"interval_sec": 5, "enabled": true}, {"interval_sec": 9, "enabled": false}]"#).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_rows_ignores_extra_columns() {
        let rows =
            decode_rows(r#"[{"interval_sec": 60, "enabled": false, "device_id": "RP1"}]"#).unwrap();
        assert_eq!(rows[0].interval_sec, 60);
        assert!(!rows[0].enabled);
    }

    #[test]
    fn test_decode_rows_null_column_is_unusable() {
        for body in [
            r#"[{"interval_sec": 5, "enabled": null}]"#,
            r#"[{"interval_sec": null, "enabled": true}]"#,
            r#"[{"enabled": true}]"#,
        ] {
            let rows = decode_rows(body).unwrap();
            assert_eq!(rows.len(), 1, "{}", body);
            assert!(GroupConfig::try_from(rows[0]).is_err(), "{}", body);
        }
    }

    #[test]
    fn test_decode_rows_keeps_row_count_with_bad_rows() {
        let rows = decode_rows(r#"[{"interval_sec": 5, "enabled": true}, {"enabled": null}]"#)
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    /// Answers config queries by decoding a canned response body.
    struct CannedBody(std::sync::Mutex<String>);

    #[async_trait]
    impl ConfigSource for CannedBody {
        async fn fetch_config(
            &self,
            _device_id: &str,
            _sensor_type: &str,
        ) -> edgepoll_core::Result<Vec<ConfigRow>> {
            let body = self.0.lock().unwrap().clone();
            decode_rows(&body)
        }
    }

    #[tokio::test]
    async fn test_nulled_config_row_disables_cached_group() {
        use edgepoll_core::{ConfigCache, ManualClock};
        use std::sync::Arc;

        let source = Arc::new(CannedBody(std::sync::Mutex::new(
            r#"[{"interval_sec": 5, "enabled": true}]"#.to_string(),
        )));
        let clock = Arc::new(ManualClock::at_unix(0));
        let cache = ConfigCache::new(source.clone(), clock.clone(), "RP1");
        assert_eq!(cache.get("turbidity").await, Some(GroupConfig::new(5, true).unwrap()));

        *source.0.lock().unwrap() = r#"[{"interval_sec": 5, "enabled": null}]"#.to_string();
        clock.advance(Duration::from_secs(3_600));

        assert_eq!(cache.get("turbidity").await, None);
        let entry = cache.entry("turbidity").await.unwrap();
        assert_eq!(entry.config, None);
        assert_eq!(entry.fetched_at.unix_timestamp(), 3_600);
    }

    #[test]
    fn test_decode_rows_rejects_garbage() {
        let err = decode_rows(r#"{"message": "permission denied"}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigFetch(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", backend(Some("key123")));
        assert!(!debug.contains("key123"));
        assert!(debug.contains("<redacted>"));
    }
}
