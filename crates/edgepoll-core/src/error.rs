//! Error types for edgepoll-core.
//!
//! Every failure the ingestion loop can encounter is contained at the group
//! boundary: nothing in this module is fatal to the loop itself. The variants
//! map onto the handling policy as follows.
//!
//! | Error Type | Handling |
//! |------------|----------|
//! | [`Error::ConfigAmbiguous`] | Group treated as disabled, cached negatively for one TTL |
//! | [`Error::ConfigFetch`] | Stale cache entry keeps serving; otherwise disabled for this tick |
//! | [`Error::SensorRead`] | Sensor skipped; the rest of the group is still uploaded |
//! | [`Error::Upload`] | Logged; the schedule slot is consumed, no immediate resend |
//! | [`Error::Timeout`] | Same as the operation that timed out |
//! | [`Error::InvalidConfig`] | Startup only; fix configuration and restart |
//!
//! ## Retry classification
//!
//! [`crate::with_retry`] only repeats errors that are plausibly transient:
//!
//! - [`Error::Timeout`]
//! - [`Error::ConfigFetch`]
//! - [`Error::Upload`] with a [`UploadFailureReason::Transport`] reason, or a
//!   [`UploadFailureReason::Rejected`] reason carrying a 5xx or 429 status

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while scheduling, sampling, and uploading.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The config source could not be reached or returned an error.
    #[error("Config fetch failed: {0}")]
    ConfigFetch(String),

    /// The config source returned zero or several rows for one group.
    #[error("Ambiguous config for '{sensor_type}': expected 1 row, got {rows}")]
    ConfigAmbiguous {
        /// The group that was queried.
        sensor_type: String,
        /// Number of rows returned.
        rows: usize,
    },

    /// A single sensor could not be read.
    #[error("Failed to read sensor '{sensor_id}': {reason}")]
    SensorRead {
        /// The sensor that failed.
        sensor_id: String,
        /// Description of the failure.
        reason: String,
    },

    /// A batch could not be delivered to the telemetry sink.
    #[error("Upload failed: {0}")]
    Upload(UploadFailureReason),

    /// A bounded remote call exceeded its budget.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Data failed validation.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for upload failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UploadFailureReason {
    /// The request never produced a response.
    Transport(String),
    /// The sink answered with a non-success status.
    Rejected {
        /// HTTP-style status code.
        status: u16,
        /// Response body, if any.
        body: String,
    },
    /// Other/unknown error.
    Other(String),
}

impl UploadFailureReason {
    /// Whether resending the same batch could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Other(_) => false,
        }
    }
}

impl std::fmt::Display for UploadFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Rejected { status, body } if body.is_empty() => {
                write!(f, "sink returned status {}", status)
            }
            Self::Rejected { status, body } => write!(f, "sink returned status {}: {}", status, body),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a config fetch error.
    pub fn config_fetch(reason: impl Into<String>) -> Self {
        Self::ConfigFetch(reason.into())
    }

    /// Create an ambiguous config error.
    pub fn config_ambiguous(sensor_type: impl Into<String>, rows: usize) -> Self {
        Self::ConfigAmbiguous {
            sensor_type: sensor_type.into(),
            rows,
        }
    }

    /// Create a sensor read error.
    pub fn sensor_read(sensor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SensorRead {
            sensor_id: sensor_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an upload error with a structured reason.
    pub fn upload_failed(reason: UploadFailureReason) -> Self {
        Self::Upload(reason)
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<edgepoll_types::ParseError> for Error {
    fn from(err: edgepoll_types::ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using edgepoll-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config_ambiguous("turbidity", 2);
        assert_eq!(
            err.to_string(),
            "Ambiguous config for 'turbidity': expected 1 row, got 2"
        );

        let err = Error::sensor_read("Sensor1", "bus fault");
        assert!(err.to_string().contains("Sensor1"));
        assert!(err.to_string().contains("bus fault"));

        let err = Error::timeout("upload", Duration::from_secs(5));
        assert!(err.to_string().contains("upload"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_upload_reason_display() {
        let reason = UploadFailureReason::Rejected {
            status: 409,
            body: "duplicate key".to_string(),
        };
        assert_eq!(reason.to_string(), "sink returned status 409: duplicate key");

        let reason = UploadFailureReason::Rejected {
            status: 503,
            body: String::new(),
        };
        assert_eq!(reason.to_string(), "sink returned status 503");
    }

    #[test]
    fn test_upload_reason_transient() {
        assert!(UploadFailureReason::Transport("reset".to_string()).is_transient());
        assert!(
            UploadFailureReason::Rejected {
                status: 502,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            UploadFailureReason::Rejected {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !UploadFailureReason::Rejected {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!UploadFailureReason::Other("bad".to_string()).is_transient());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = edgepoll_types::ParseError::InvalidInterval(0).into();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains("0 seconds"));
    }
}
