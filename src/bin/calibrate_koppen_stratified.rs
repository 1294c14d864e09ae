//! Köppen-Stratified Calibration Pipeline
//!
//! For every climate tier, samples reference guilds from the tier's plant
//! pool (climate-compatible, random, phylogenetically stratified and
//! monoculture strata), scores them with the production scorer and writes
//! percentile breakpoints:
//!
//!   <out>/normalization_params_<tier>.json   (one per tier)
//!   <out>/csr_percentile_calibration_global.json
//!
//! Usage:
//!   cargo run --release --bin calibrate_koppen_stratified -- \
//!       --config guild_config.json --guilds-per-tier 20000

use anyhow::Result;
use clap::Parser;
use guild_scorer::config::SizeRange;
use guild_scorer::{EngineConfig, MetricCalibrator, ReferenceData};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "calibrate_koppen_stratified",
    about = "Build per-tier percentile calibration from sampled reference guilds"
)]
struct Args {
    /// Engine config (JSON); defaults apply when omitted
    #[arg(long, env = "GUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Output directory; defaults to the config's calibration directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Only calibrate these tiers (repeatable)
    #[arg(long = "tier")]
    tiers: Vec<String>,

    #[arg(long)]
    guilds_per_tier: Option<usize>,

    #[arg(long)]
    guild_size: Option<usize>,

    /// Variable guild size, e.g. `2..=7`
    #[arg(long, value_parser = parse_size_range)]
    size_range: Option<SizeRange>,

    #[arg(long)]
    seed: Option<u64>,
}

fn parse_size_range(value: &str) -> Result<SizeRange, String> {
    let (min, max) = value
        .split_once("..=")
        .ok_or_else(|| format!("expected MIN..=MAX, got '{value}'"))?;
    let min = min.trim().parse().map_err(|e| format!("bad minimum: {e}"))?;
    let max = max.trim().parse().map_err(|e| format!("bad maximum: {e}"))?;
    Ok(SizeRange { min, max })
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guild_scorer=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?.with_env_overrides(),
        None => EngineConfig::from_env(),
    };

    let settings = &mut config.calibration;
    if let Some(n) = args.guilds_per_tier {
        settings.guilds_per_tier = n;
    }
    if let Some(size) = args.guild_size {
        settings.guild_size = size;
    }
    if args.size_range.is_some() {
        settings.size_range = args.size_range;
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    config.validate()?;

    let tiers = if args.tiers.is_empty() {
        config.climate_tiers.clone()
    } else {
        args.tiers.clone()
    };
    let out_dir = args.out_dir.clone().unwrap_or_else(|| config.calibration_path());

    let total_start = Instant::now();
    let data = Arc::new(ReferenceData::load(&config)?);
    tracing::info!(
        tiers = tiers.len(),
        guilds_per_tier = config.calibration.guilds_per_tier,
        max_guild_size = config.calibration.max_guild_size(),
        seed = config.calibration.seed,
        "starting calibration"
    );

    let calibrator = MetricCalibrator::new(data, config.calibration.clone(), tiers)?;
    let output = calibrator.write_all(&out_dir)?;

    for path in &output.tier_files {
        tracing::info!(path = %path.display(), "wrote tier calibration");
    }
    for tier in &output.skipped_tiers {
        tracing::warn!(tier = %tier, "tier skipped");
    }
    if let Some(path) = &output.csr_file {
        tracing::info!(path = %path.display(), "wrote CSR calibration");
    }
    tracing::info!(
        elapsed_s = total_start.elapsed().as_secs_f64(),
        tiers_written = output.tier_files.len(),
        "calibration complete"
    );
    Ok(())
}
