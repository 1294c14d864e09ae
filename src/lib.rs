//! Guild Scorer
//!
//! Scores a guild (a small set of co-planted species) by combining
//! phylogenetic diversity, shared-organism interaction networks and
//! growth-trait compatibility into calibrated, weighted percentiles.
//!
//! Layout:
//! - `data/`: Plant table, interaction profiles and trophic lookups (Polars)
//! - `phylo/`: Newick tree, tip mapping and Faith's PD index
//! - `utils/`: Percentile normalization and organism counting
//! - `metrics/`: Individual metric implementations (M1-M7), service balance and guild flags
//! - `scorer`: Normalization, weighting and batch scoring
//! - `calibration/`: Köppen-stratified reference guild sampling

pub mod calibration;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod phylo;
pub mod scorer;
pub mod utils;

// Re-export commonly used types
pub use calibration::{MetricCalibrator, CalibrationOutput};
pub use config::{CalibrationSettings, EngineConfig};
pub use data::{Plant, PlantCatalog, ReferenceData};
pub use error::{ScoringError, ScoringResult};
pub use metrics::{GuildMetrics, MetricId, MetricWeights, RawScores};
pub use phylo::PhylogeneticDistanceIndex;
pub use scorer::{GuildDiagnostics, GuildScoreResult, GuildScorer, MetricScore};
pub use utils::{csr_to_percentile, percentile_normalize, CalibrationTable, CsrCalibration};
