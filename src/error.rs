//! Error types for the counter engine

use thiserror::Error;

use crate::types::DAY_MINUTES;

/// Main error type for the counter engine
#[derive(Error, Debug)]
pub enum Error {
    /// Minute-of-day outside `[0, DAY_MINUTES)`
    ///
    /// Only produced when a caller hands a cube a minute it derived
    /// incorrectly; the engine's own timestamp derivation never does.
    #[error("Minute of day {minute} is out of range [0, {max}]", max = DAY_MINUTES - 1)]
    MinuteOutOfRange {
        /// The rejected minute
        minute: i64,
    },

    /// Input validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation errors
///
/// Raised for dimension labels and configuration values that break
/// the engine's limits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// String exceeds the maximum allowed length
    #[error("{field} is too long: {actual} bytes (max: {max} bytes)")]
    TooLong {
        /// Which label was rejected ("dimension name" or "dimension value")
        field: &'static str,
        /// Actual length in bytes
        actual: usize,
        /// Maximum allowed length in bytes
        max: usize,
    },

    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
