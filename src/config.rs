//! Engine configuration
//!
//! A single JSON document describes where the reference tables live, which
//! climate tiers exist, how metrics are weighted and how calibration runs
//! are sampled. Every field has a default, so `{}` is a valid config.
//!
//! Environment overrides (applied by [`EngineConfig::with_env_overrides`]):
//! - `DATA_DIR`: replaces `data_dir`
//! - `CLIMATE_TIER`: replaces `default_tier`

use crate::error::{ScoringError, ScoringResult};
use crate::metrics::{MetricId, MetricWeights};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Köppen tiers used when the config does not list its own
pub const DEFAULT_CLIMATE_TIERS: [&str; 6] = [
    "tier_1_tropical",
    "tier_2_mediterranean",
    "tier_3_humid_temperate",
    "tier_4_continental",
    "tier_5_boreal_polar",
    "tier_6_arid",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub files: DataFiles,
    /// Directory holding `normalization_params_<tier>.json` files.
    /// Relative paths resolve against `data_dir`.
    pub calibration_dir: PathBuf,
    pub climate_tiers: Vec<String>,
    pub default_tier: Option<String>,
    /// metric key (`m1`, `n4`, `p1`..`p7`) → weight
    pub weights: BTreeMap<String, f64>,
    pub calibration: CalibrationSettings,
}

/// Reference table locations, relative to `data_dir` unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataFiles {
    pub plants: PathBuf,
    pub organism_profiles: PathBuf,
    pub fungal_profiles: PathBuf,
    pub herbivore_predators: PathBuf,
    /// Optional: absent file means no entomopathogen specificity data
    pub insect_parasites: PathBuf,
    pub pathogen_antagonists: PathBuf,
    pub tree: PathBuf,
    pub tip_mapping: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub guild_size: usize,
    /// Inclusive size range for variable-size calibration; overrides `guild_size`
    pub size_range: Option<SizeRange>,
    pub guilds_per_tier: usize,
    pub seed: u64,
    pub mix: StratumMix,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SizeRange {
    pub min: usize,
    pub max: usize,
}

/// Fractions of each tier's reference guilds drawn from each sampling stratum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StratumMix {
    pub climate_compatible: f64,
    pub pure_random: f64,
    pub phylo_stratified: f64,
    pub monoculture: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("shipley_checks/stage4"),
            files: DataFiles::default(),
            calibration_dir: PathBuf::from("calibration"),
            climate_tiers: DEFAULT_CLIMATE_TIERS.iter().map(|t| t.to_string()).collect(),
            default_tier: None,
            weights: MetricWeights::default()
                .iter()
                .map(|(metric, weight)| (metric.key().to_string(), weight))
                .collect(),
            calibration: CalibrationSettings::default(),
        }
    }
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            plants: PathBuf::from("bill_with_csr_ecoservices_koppen_11711.parquet"),
            organism_profiles: PathBuf::from("organism_profiles_pure_r.csv"),
            fungal_profiles: PathBuf::from("fungal_guilds_pure_r.csv"),
            herbivore_predators: PathBuf::from("herbivore_predators_pure_r.csv"),
            insect_parasites: PathBuf::from("insect_fungal_parasites_pure_r.csv"),
            pathogen_antagonists: PathBuf::from("pathogen_antagonists_pure_r.csv"),
            tree: PathBuf::from("mixgb_tree_11711_species_20251107.nwk"),
            tip_mapping: PathBuf::from("mixgb_wfo_to_tree_mapping_11711.csv"),
        }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            guild_size: 5,
            size_range: None,
            guilds_per_tier: 10_000,
            seed: 42,
            mix: StratumMix::default(),
        }
    }
}

impl Default for StratumMix {
    fn default() -> Self {
        Self {
            climate_compatible: 0.80,
            pure_random: 0.10,
            phylo_stratified: 0.05,
            monoculture: 0.05,
        }
    }
}

impl StratumMix {
    fn validate(&self) -> ScoringResult<()> {
        let parts = [
            self.climate_compatible,
            self.pure_random,
            self.phylo_stratified,
            self.monoculture,
        ];
        if parts.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(ScoringError::InvalidConfig(
                "stratum fractions must be finite and non-negative".into(),
            ));
        }
        let total: f64 = parts.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ScoringError::InvalidConfig(format!(
                "stratum fractions sum to {total}, expected 1"
            )));
        }
        Ok(())
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> ScoringResult<()> {
        if self.guild_size == 0 {
            return Err(ScoringError::InvalidConfig("guild_size must be at least 1".into()));
        }
        if let Some(range) = self.size_range {
            if range.min == 0 || range.min > range.max {
                return Err(ScoringError::InvalidConfig(format!(
                    "size_range {}..={} is empty or starts at 0",
                    range.min, range.max
                )));
            }
        }
        self.mix.validate()
    }

    /// Largest guild the sampler may be asked for
    pub fn max_guild_size(&self) -> usize {
        self.size_range.map_or(self.guild_size, |r| r.max)
    }
}

impl EngineConfig {
    /// Read a JSON config file (no environment overrides applied)
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(tier) = std::env::var("CLIMATE_TIER") {
            if !tier.trim().is_empty() {
                self.default_tier = Some(tier);
            }
        }
        self
    }

    pub fn validate(&self) -> ScoringResult<()> {
        self.metric_weights()?;
        self.calibration.validate()?;
        if self.climate_tiers.is_empty() {
            return Err(ScoringError::InvalidConfig("no climate tiers configured".into()));
        }
        Ok(())
    }

    /// Parse and validate the weight table
    pub fn metric_weights(&self) -> ScoringResult<MetricWeights> {
        let mut weights = BTreeMap::new();
        for (key, weight) in &self.weights {
            let metric = MetricId::from_key(key).ok_or_else(|| {
                ScoringError::InvalidConfig(format!("unknown metric key '{key}' in weights"))
            })?;
            weights.insert(metric, *weight);
        }
        MetricWeights::new(weights)
    }

    /// Resolve a data file against `data_dir`
    pub fn data_path(&self, file: &Path) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.data_dir.join(&self.calibration_dir)
    }
}
