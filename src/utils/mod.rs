//! Utility modules for guild scoring
//!
//! Contains shared functionality used across multiple metrics:
//! - Normalization: percentile transformation and calibration tables
//! - Organism counting: shared organism network analysis
//! - Ecosystem ratings: categorical rating arithmetic

pub mod ecosystem_ratings;
pub mod normalization;
pub mod organism_counter;

// Re-export commonly used types
pub use normalization::{
    csr_to_percentile, percentile_normalize, Breakpoints, CalibrationFile, CalibrationTable,
    CsrCalibration, CsrStrategy, tier_file_name, CSR_CALIBRATION_FILE, CSR_PERCENTILES,
    METRIC_PERCENTILES,
};
pub use organism_counter::{count_shared_organisms, plants_with_any};
