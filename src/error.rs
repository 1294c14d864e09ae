//! Error types for guild scoring
//!
//! Caller and structural failures abort a request with one of these variants.
//! Data gaps (unmapped taxa, missing profiles) never surface here; they are
//! absorbed by the metrics and reported as diagnostics instead.

use thiserror::Error;

/// Failures raised by the scoring engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("guild is empty")]
    EmptyGuild,

    #[error("plant '{0}' appears more than once in the guild")]
    DuplicatePlant(String),

    #[error("plant '{0}' is not in the plant catalog")]
    UnknownPlant(String),

    #[error("no calibration loaded for climate tier '{tier}'")]
    MissingCalibration { tier: String },

    #[error("calibration for tier '{tier}' has no breakpoints for metric '{metric}'")]
    MissingMetricCalibration { tier: String, metric: String },

    #[error("invalid calibration data: {0}")]
    InvalidCalibration(String),

    #[error("malformed phylogenetic tree: {0}")]
    MalformedTree(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("calibration run cancelled")]
    Cancelled,
}

pub type ScoringResult<T> = std::result::Result<T, ScoringError>;
