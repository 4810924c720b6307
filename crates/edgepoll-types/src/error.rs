//! Error types for data validation in edgepoll-types.

use thiserror::Error;

/// Errors that can occur when building or validating telemetry data.
///
/// This error type is transport-agnostic and does not include
/// network or scheduling errors (those belong in edgepoll-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A sampling interval that is zero or negative.
    #[error("Invalid interval: {0} seconds (must be positive)")]
    InvalidInterval(i64),

    /// An unrecognized timestamp alignment mode.
    #[error("Unknown alignment mode '{0}' (expected 'grid-aligned' or 'wall-clock')")]
    UnknownAlignment(String),

    /// A timestamp that cannot be represented in the wire format.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias using edgepoll-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
