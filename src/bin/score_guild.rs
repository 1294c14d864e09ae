//! Score one guild from the command line
//!
//! Usage:
//!   cargo run --release --bin score_guild -- \
//!       --config guild_config.json --tier tier_3_humid_temperate \
//!       wfo-0000832453 wfo-0000649136 wfo-0000642673
//!
//! Prints the full score (per-metric percentiles and diagnostics) as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use guild_scorer::{EngineConfig, GuildScorer};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "score_guild", about = "Score a plant guild against a climate tier")]
struct Args {
    /// Engine config (JSON); defaults apply when omitted
    #[arg(long, env = "GUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Climate tier; falls back to the config's default tier
    #[arg(long)]
    tier: Option<String>,

    /// Compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,

    /// Plant ids making up the guild
    #[arg(required = true)]
    plant_ids: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guild_scorer=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?.with_env_overrides(),
        None => EngineConfig::from_env(),
    };
    let tier = args
        .tier
        .clone()
        .or_else(|| config.default_tier.clone())
        .ok_or_else(|| anyhow!("no climate tier given (use --tier or CLIMATE_TIER)"))?;

    let load_start = Instant::now();
    let scorer = GuildScorer::from_config(&config)?;
    tracing::info!(elapsed_ms = load_start.elapsed().as_millis() as u64, "scorer ready");

    let score_start = Instant::now();
    let result = scorer.score_guild(&args.plant_ids, &tier)?;
    tracing::info!(
        elapsed_us = score_start.elapsed().as_micros() as u64,
        overall = result.overall_score,
        "guild scored"
    );

    let json = if args.compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", json);
    Ok(())
}
