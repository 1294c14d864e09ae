//! Köppen-stratified metric calibration
//!
//! For each climate tier: sample reference guilds (see [`sampler`]), compute
//! every raw metric through the scorer's own code path, and reduce each
//! metric's distribution to percentile breakpoints. The global CSR
//! calibration is a direct transform of the plant catalog.

pub mod sampler;

pub use sampler::{GuildSampler, GuildSize, Stratum, StratumCounts, TierPool};

use crate::config::CalibrationSettings;
use crate::data::{PlantCatalog, ReferenceData};
use crate::error::{ScoringError, ScoringResult};
use crate::metrics::{MetricId, RawScores};
use crate::scorer::GuildScorer;
use crate::utils::{
    Breakpoints, CalibrationFile, CsrCalibration, CSR_CALIBRATION_FILE, CSR_PERCENTILES,
    METRIC_PERCENTILES,
};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Progress is logged every this many scored guilds
const PROGRESS_EVERY: usize = 1000;

/// Runs calibration over every configured tier
pub struct MetricCalibrator {
    scorer: GuildScorer,
    csr_calibration: Option<CsrCalibration>,
    settings: CalibrationSettings,
    tiers: Vec<String>,
    cancel: Arc<AtomicBool>,
}

/// Files written by [`MetricCalibrator::write_all`]
#[derive(Debug, Clone, Default)]
pub struct CalibrationOutput {
    pub tier_files: Vec<PathBuf>,
    pub skipped_tiers: Vec<String>,
    pub csr_file: Option<PathBuf>,
}

impl MetricCalibrator {
    /// Build the global CSR calibration first so N4 raw values match scoring
    pub fn new(
        data: Arc<ReferenceData>,
        settings: CalibrationSettings,
        tiers: Vec<String>,
    ) -> ScoringResult<Self> {
        settings.validate()?;
        let csr_calibration = match build_csr_calibration(&data.plants) {
            Ok(cal) => Some(cal),
            Err(err) => {
                warn!(error = %err, "no CSR calibration; conflict metric uses fixed thresholds");
                None
            }
        };
        Ok(Self {
            scorer: GuildScorer::for_calibration(data, csr_calibration.clone()),
            csr_calibration,
            settings,
            tiers,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag; set it from any thread to stop between guilds
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn csr_calibration(&self) -> Option<&CsrCalibration> {
        self.csr_calibration.as_ref()
    }

    fn guild_size(&self) -> GuildSize {
        match self.settings.size_range {
            Some(range) => GuildSize::Range(range),
            None => GuildSize::Fixed(self.settings.guild_size),
        }
    }

    /// Reference guilds for one tier, or `None` when its pool is too small
    pub fn sample_tier(&self, tier_idx: usize, tier: &str) -> Option<Vec<(Stratum, Vec<String>)>> {
        let size = self.guild_size();
        let pool = TierPool::new(self.scorer.data().plants.tier_members(tier));
        if pool.len() < size.min() {
            warn!(
                tier = tier,
                available = pool.len(),
                guild_size = size.min(),
                "skipping tier (insufficient plants)"
            );
            return None;
        }
        let counts = StratumCounts::from_mix(self.settings.guilds_per_tier, &self.settings.mix);
        let seed = self.settings.seed.wrapping_add(tier_idx as u64);
        Some(GuildSampler::new(pool, seed).sample(&counts, size))
    }

    /// Raw scores for each guild, in input order
    pub fn score_guilds(&self, guilds: &[Vec<String>]) -> ScoringResult<Vec<RawScores>> {
        let progress = AtomicUsize::new(0);
        let total = guilds.len();
        guilds
            .par_iter()
            .map(|guild| {
                if self.cancel.load(Ordering::Relaxed) {
                    return Err(ScoringError::Cancelled);
                }
                let raw = self.scorer.compute_raw_scores(guild)?;
                let count = progress.fetch_add(1, Ordering::Relaxed) + 1;
                if count % PROGRESS_EVERY == 0 || count == total {
                    info!(scored = count, total = total, "calibration progress");
                }
                Ok(raw)
            })
            .collect()
    }

    /// Calibrate one tier; `None` when the tier was skipped
    pub fn calibrate_tier(&self, tier_idx: usize, tier: &str) -> ScoringResult<Option<CalibrationFile>> {
        let start = Instant::now();
        let Some(sampled) = self.sample_tier(tier_idx, tier) else {
            return Ok(None);
        };
        let guilds: Vec<Vec<String>> = sampled.into_iter().map(|(_, guild)| guild).collect();
        info!(tier = tier, guilds = guilds.len(), "sampled reference guilds");

        let raw_scores = self.score_guilds(&guilds)?;
        let metrics = metric_breakpoints(&raw_scores)?;
        info!(
            tier = tier,
            elapsed_s = start.elapsed().as_secs_f64(),
            "tier calibrated"
        );

        Ok(Some(CalibrationFile {
            tier: tier.to_string(),
            guild_size: self.guild_size().max(),
            n_guilds: raw_scores.len(),
            seed: self.settings.seed,
            metrics,
        }))
    }

    /// Calibrate every tier in order
    pub fn run(&self) -> ScoringResult<Vec<CalibrationFile>> {
        let mut files = Vec::new();
        for (tier_idx, tier) in self.tiers.iter().enumerate() {
            if let Some(file) = self.calibrate_tier(tier_idx, tier)? {
                files.push(file);
            }
        }
        Ok(files)
    }

    /// Run and write `normalization_params_<tier>.json` plus the CSR file
    pub fn write_all(&self, out_dir: &Path) -> Result<CalibrationOutput> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

        let mut output = CalibrationOutput::default();
        for (tier_idx, tier) in self.tiers.iter().enumerate() {
            match self.calibrate_tier(tier_idx, tier)? {
                Some(file) => output.tier_files.push(file.write(out_dir)?),
                None => output.skipped_tiers.push(tier.clone()),
            }
        }

        if let Some(csr) = &self.csr_calibration {
            let path = out_dir.join(CSR_CALIBRATION_FILE);
            csr.write(&path)?;
            output.csr_file = Some(path);
        }
        Ok(output)
    }
}

/// Nearest-rank breakpoints for every metric
pub fn metric_breakpoints(raw_scores: &[RawScores]) -> ScoringResult<BTreeMap<String, Breakpoints>> {
    MetricId::ALL
        .iter()
        .map(|&metric| {
            let mut values: Vec<f64> = raw_scores.iter().map(|s| s.get(metric)).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let breakpoints = Breakpoints::from_sorted_nearest_rank(&values, &METRIC_PERCENTILES)?;
            Ok((metric.key().to_string(), breakpoints))
        })
        .collect()
}

/// Global CSR percentiles from every plant with a CSR profile
pub fn build_csr_calibration(plants: &PlantCatalog) -> ScoringResult<CsrCalibration> {
    let profiles: Vec<_> = plants.iter().filter_map(|p| p.csr).collect();
    let strategy = |pick: fn(&crate::data::CsrProfile) -> f64| {
        let mut values: Vec<f64> = profiles.iter().map(pick).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        Breakpoints::from_sorted_interpolated(&values, &CSR_PERCENTILES)
    };
    Ok(CsrCalibration {
        c: strategy(|p| p.c)?,
        s: strategy(|p| p.s)?,
        r: strategy(|p| p.r)?,
    })
}
