//! Error types for the magnifier cortex

use crate::types::Source;

/// Result type alias for the cortex
pub type Result<T> = std::result::Result<T, CortexError>;

/// Everything that can go wrong inside the cortex.
///
/// Producer-side failures (`SourceUnavailable`, `StaleData`) are recovered
/// locally by the loops and surface only as advisory status. Calibration and
/// configuration failures are returned to whoever asked for the change.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("{input} source unavailable: {reason}")]
    SourceUnavailable { input: Source, reason: String },

    #[error("{input} data is stale ({age_ms} ms old)")]
    StaleData { input: Source, age_ms: u64 },

    #[error("incomplete calibration: {supplied} of 13 distinct points supplied")]
    IncompleteCalibration { supplied: usize },

    #[error("degenerate calibration: {0}")]
    DegenerateCalibration(String),

    #[error("no recalibration in progress")]
    CalibrationInactive,

    #[error("invalid calibration profile: {0}")]
    CalibrationFormat(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("cortex already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}

impl CortexError {
    pub fn unavailable(input: Source, reason: impl Into<String>) -> Self {
        CortexError::SourceUnavailable {
            input,
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        CortexError::ConfigurationInvalid(reason.into())
    }
}
