//! Benchmark Faith's PD on a file of test guilds
//!
//! Input CSV: `guild_id,guild_size,species` with species separated by `;;`.
//! Output CSV: `guild_id,guild_size,faiths_pd`, for parity checks against
//! an external reference implementation.

use anyhow::{Context, Result};
use clap::Parser;
use guild_scorer::{EngineConfig, PhylogeneticDistanceIndex};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WARMUP_ITERATIONS: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "benchmark_faiths_pd", about = "Time Faith's PD over a guild file")]
struct Args {
    /// Engine config (JSON) naming the tree and tip mapping
    #[arg(long, env = "GUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Guilds CSV
    #[arg(long)]
    guilds: PathBuf,

    /// Results CSV
    #[arg(long)]
    output: PathBuf,
}

struct TestGuild {
    id: usize,
    size: usize,
    species: Vec<String>,
}

fn read_guilds(path: &PathBuf) -> Result<Vec<TestGuild>> {
    let file = File::open(path).with_context(|| format!("Failed to open guilds file: {:?}", path))?;
    let mut guilds = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if i == 0 || line.trim().is_empty() {
            continue; // header
        }
        let parts: Vec<&str> = line.splitn(3, ',').collect();
        if parts.len() < 3 {
            tracing::warn!(line = i, "skipping malformed guild line");
            continue;
        }
        let species = parts[2]
            .split(";;")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        guilds.push(TestGuild {
            id: parts[0].trim().parse()?,
            size: parts[1].trim().parse()?,
            species,
        });
    }
    Ok(guilds)
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
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?.with_env_overrides(),
        None => EngineConfig::from_env(),
    };

    let load_start = Instant::now();
    let index = PhylogeneticDistanceIndex::load(
        &config.data_path(&config.files.tree),
        &config.data_path(&config.files.tip_mapping),
    )?;
    let load_ms = load_start.elapsed().as_secs_f64() * 1000.0;

    let guilds = read_guilds(&args.guilds)?;
    tracing::info!(
        nodes = index.num_nodes(),
        leaves = index.num_leaves(),
        load_ms = load_ms,
        guilds = guilds.len(),
        "tree loaded"
    );
    if guilds.is_empty() {
        tracing::warn!("no guilds to benchmark");
        return Ok(());
    }

    for _ in 0..WARMUP_ITERATIONS {
        let _ = index.faiths_pd(&guilds[0].species);
    }

    let start = Instant::now();
    let results: Vec<f64> = guilds.iter().map(|g| index.faiths_pd(&g.species)).collect();
    let total_s = start.elapsed().as_secs_f64();

    let mut output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create output file: {:?}", args.output))?,
    );
    writeln!(output, "guild_id,guild_size,faiths_pd")?;
    for (guild, pd) in guilds.iter().zip(&results) {
        writeln!(output, "{},{},{:.10}", guild.id, guild.size, pd)?;
    }
    output.flush()?;

    let mean_us = total_s / results.len() as f64 * 1e6;
    println!("{}", "=".repeat(70));
    println!("FAITH'S PD BENCHMARK");
    println!("{}", "=".repeat(70));
    println!("Guilds processed: {}", results.len());
    println!("Total time: {:.3} seconds", total_s);
    println!("Mean time per guild: {:.3} μs", mean_us);
    println!("Throughput: {:.0} guilds/second", results.len() as f64 / total_s);
    println!("Results saved to: {}", args.output.display());
    Ok(())
}
