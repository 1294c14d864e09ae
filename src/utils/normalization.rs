//! Normalization Utilities
//!
//! Converts raw metric scores to percentiles using Köppen climate tier-stratified
//! calibration breakpoints, and CSR percentages to percentiles using the global
//! (non-tiered) CSR calibration.
//!
//! Calibration files store breakpoints as `{"p1": v, "p5": v, ...}`. Keys that
//! are not of the form `p<number>` (`method`, `n_samples`, ...) are ignored.

use crate::error::{ScoringError, ScoringResult};
use anyhow::{Context, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Percentiles stored for guild metrics
pub const METRIC_PERCENTILES: [f64; 13] = [
    1.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0, 99.0,
];

/// Percentiles stored for the global CSR calibration
pub const CSR_PERCENTILES: [f64; 15] = [
    1.0, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 75.0, 80.0, 85.0, 90.0, 95.0, 99.0,
];

/// Per-tier calibration file name
pub fn tier_file_name(tier: &str) -> String {
    format!("normalization_params_{tier}.json")
}

pub const CSR_CALIBRATION_FILE: &str = "csr_percentile_calibration_global.json";

/// Percentile → value breakpoints of one reference distribution
///
/// Sorted by percentile, at least two entries, values non-decreasing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, serde_json::Value>")]
pub struct Breakpoints {
    points: Vec<(f64, f64)>,
}

impl Breakpoints {
    pub fn new(mut points: Vec<(f64, f64)>) -> ScoringResult<Self> {
        if points.len() < 2 {
            return Err(ScoringError::InvalidCalibration(format!(
                "need at least 2 breakpoints, got {}",
                points.len()
            )));
        }
        if points
            .iter()
            .any(|(p, v)| !p.is_finite() || !v.is_finite() || *p < 0.0 || *p > 100.0)
        {
            return Err(ScoringError::InvalidCalibration(
                "breakpoints must be finite with percentiles in [0, 100]".into(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in points.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(ScoringError::InvalidCalibration(format!(
                    "percentile p{} listed twice",
                    pair[0].0
                )));
            }
            if pair[1].1 < pair[0].1 {
                return Err(ScoringError::InvalidCalibration(format!(
                    "breakpoint values decrease between p{} and p{}",
                    pair[0].0, pair[1].0
                )));
            }
        }
        Ok(Self { points })
    }

    /// Nearest-rank breakpoints: `sorted[round(p/100 * (n-1))]`
    pub fn from_sorted_nearest_rank(sorted: &[f64], percentiles: &[f64]) -> ScoringResult<Self> {
        Self::from_sorted_with(sorted, percentiles, |sorted, p| {
            let last = (sorted.len() - 1) as f64;
            sorted[(p / 100.0 * last).round() as usize]
        })
    }

    /// Breakpoints linearly interpolated between order statistics
    pub fn from_sorted_interpolated(sorted: &[f64], percentiles: &[f64]) -> ScoringResult<Self> {
        Self::from_sorted_with(sorted, percentiles, |sorted, p| {
            let rank = p / 100.0 * (sorted.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
        })
    }

    fn from_sorted_with(
        sorted: &[f64],
        percentiles: &[f64],
        pick: impl Fn(&[f64], f64) -> f64,
    ) -> ScoringResult<Self> {
        if sorted.is_empty() {
            return Err(ScoringError::InvalidCalibration(
                "cannot compute breakpoints of an empty sample".into(),
            ));
        }
        Self::new(percentiles.iter().map(|&p| (p, pick(sorted, p))).collect())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn min(&self) -> f64 {
        self.points[0].1
    }

    pub fn max(&self) -> f64 {
        self.points[self.points.len() - 1].1
    }

    /// Percentile of `raw` by linear interpolation between breakpoints
    ///
    /// At or below the minimum (or NaN) gives 0, at or above the maximum 100.
    pub fn percentile_of(&self, raw: f64) -> f64 {
        if raw.is_nan() || raw <= self.min() {
            return 0.0;
        }
        if raw >= self.max() {
            return 100.0;
        }
        for pair in self.points.windows(2) {
            let (p_lo, v_lo) = pair[0];
            let (p_hi, v_hi) = pair[1];
            if v_lo <= raw && raw <= v_hi {
                let fraction = if v_hi - v_lo > 0.0 {
                    (raw - v_lo) / (v_hi - v_lo)
                } else {
                    0.0
                };
                return p_lo + fraction * (p_hi - p_lo);
            }
        }
        // Unreachable for validated breakpoints: min < raw < max lies in some bracket.
        100.0
    }
}

fn percentile_key(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("p{}", p as i64)
    } else {
        format!("p{p}")
    }
}

impl Serialize for Breakpoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.points.len()))?;
        for (p, v) in &self.points {
            map.serialize_entry(&percentile_key(*p), v)?;
        }
        map.end()
    }
}

impl TryFrom<BTreeMap<String, serde_json::Value>> for Breakpoints {
    type Error = ScoringError;

    fn try_from(raw: BTreeMap<String, serde_json::Value>) -> ScoringResult<Self> {
        let mut points = Vec::new();
        for (key, value) in raw {
            let Some(p) = key.strip_prefix('p').and_then(|rest| rest.parse::<f64>().ok()) else {
                continue;
            };
            let v = value.as_f64().ok_or_else(|| {
                ScoringError::InvalidCalibration(format!("breakpoint {key} is not a number"))
            })?;
            points.push((p, v));
        }
        Self::new(points)
    }
}

/// Contents of one `normalization_params_<tier>.json` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub tier: String,
    pub guild_size: usize,
    pub n_guilds: usize,
    pub seed: u64,
    pub metrics: BTreeMap<String, Breakpoints>,
}

impl CalibrationFile {
    /// Write into `dir`, returning the file path
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create calibration dir: {:?}", dir))?;
        let path = dir.join(tier_file_name(&self.tier));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write calibration file: {:?}", path))?;
        info!(tier = %self.tier, path = %path.display(), "calibration written");
        Ok(path)
    }
}

/// Calibration breakpoints for every tier and metric
///
/// Immutable once loaded; shared by reference across scoring threads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    tiers: BTreeMap<String, BTreeMap<String, Breakpoints>>,
}

impl CalibrationTable {
    pub fn new(tiers: BTreeMap<String, BTreeMap<String, Breakpoints>>) -> Self {
        Self { tiers }
    }

    pub fn from_files(files: impl IntoIterator<Item = CalibrationFile>) -> Self {
        Self {
            tiers: files.into_iter().map(|f| (f.tier, f.metrics)).collect(),
        }
    }

    /// Load `normalization_params_<tier>.json` for each listed tier
    ///
    /// Tiers without a file are left out; scoring against them fails later
    /// with `MissingCalibration`.
    pub fn load_dir(dir: &Path, tiers: &[String]) -> Result<Self> {
        let mut table = BTreeMap::new();
        for tier in tiers {
            let path = dir.join(tier_file_name(tier));
            if !path.exists() {
                debug!(tier = %tier, path = %path.display(), "no calibration file for tier");
                continue;
            }
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read calibration file: {:?}", path))?;
            let file: CalibrationFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse calibration JSON: {:?}", path))?;
            if &file.tier != tier {
                anyhow::bail!(
                    "Calibration file {:?} is labelled '{}', expected '{}'",
                    path,
                    file.tier,
                    tier
                );
            }
            table.insert(file.tier, file.metrics);
        }
        info!(tiers = table.len(), dir = %dir.display(), "calibration loaded");
        Ok(Self { tiers: table })
    }

    /// Load a single JSON keyed by tier: `{tier: {metric: breakpoints}}`
    pub fn load_combined(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration file: {:?}", path))?;
        let tiers: BTreeMap<String, BTreeMap<String, Breakpoints>> =
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse calibration JSON: {:?}", path))?;
        Ok(Self { tiers })
    }

    pub fn has_tier(&self, tier: &str) -> bool {
        self.tiers.contains_key(tier)
    }

    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }

    pub fn tier(&self, tier: &str) -> ScoringResult<&BTreeMap<String, Breakpoints>> {
        self.tiers.get(tier).ok_or_else(|| ScoringError::MissingCalibration {
            tier: tier.to_string(),
        })
    }

    pub fn breakpoints(&self, tier: &str, metric: &str) -> ScoringResult<&Breakpoints> {
        self.tier(tier)?
            .get(metric)
            .ok_or_else(|| ScoringError::MissingMetricCalibration {
                tier: tier.to_string(),
                metric: metric.to_string(),
            })
    }
}

/// Percentile normalize using linear interpolation
///
/// 1. Find bracketing breakpoints where `values[i] <= raw <= values[i+1]`
/// 2. `percentile = p_i + fraction × (p_{i+1} - p_i)`
/// 3. If `invert`, `percentile = 100 - percentile`
pub fn percentile_normalize(
    raw_value: f64,
    metric: &str,
    calibration: &CalibrationTable,
    climate_tier: &str,
    invert: bool,
) -> ScoringResult<f64> {
    let percentile = calibration
        .breakpoints(climate_tier, metric)?
        .percentile_of(raw_value);
    Ok(if invert { 100.0 - percentile } else { percentile })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsrStrategy {
    C,
    S,
    R,
}

/// CSR calibration (global, not tier-specific)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrCalibration {
    pub c: Breakpoints,
    pub s: Breakpoints,
    pub r: Breakpoints,
}

impl CsrCalibration {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSR calibration file: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse CSR calibration JSON: {:?}", path))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write CSR calibration file: {:?}", path))
    }

    pub fn strategy(&self, strategy: CsrStrategy) -> &Breakpoints {
        match strategy {
            CsrStrategy::C => &self.c,
            CsrStrategy::S => &self.s,
            CsrStrategy::R => &self.r,
        }
    }
}

/// Convert a raw CSR percentage to a percentile using the global calibration
///
/// CSR uses global percentiles because conflicts are within-guild comparisons,
/// not cross-guild. Without a calibration, fixed thresholds apply: C and S at
/// or above 60 and R at or above 50 map to 100, everything else to 50.
pub fn csr_to_percentile(
    raw_value: f64,
    strategy: CsrStrategy,
    csr_calibration: Option<&CsrCalibration>,
) -> f64 {
    let Some(csr_cal) = csr_calibration else {
        let threshold = match strategy {
            CsrStrategy::C | CsrStrategy::S => 60.0,
            CsrStrategy::R => 50.0,
        };
        return if raw_value >= threshold { 100.0 } else { 50.0 };
    };
    csr_cal.strategy(strategy).percentile_of(raw_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn m1_breakpoints() -> Breakpoints {
        serde_json::from_str(
            r#"{
                "p1": 0.5, "p5": 0.55, "p10": 0.6, "p20": 0.65, "p30": 0.7,
                "p40": 0.75, "p50": 0.8, "p60": 0.85, "p70": 0.9, "p80": 0.95,
                "p90": 1.0, "p95": 1.05, "p99": 1.1, "method": "percentile"
            }"#,
        )
        .unwrap()
    }

    fn table() -> CalibrationTable {
        let mut metrics = BTreeMap::new();
        metrics.insert("m1".to_string(), m1_breakpoints());
        let mut tiers = BTreeMap::new();
        tiers.insert("tier_3_humid_temperate".to_string(), metrics);
        CalibrationTable::new(tiers)
    }

    #[test]
    fn test_percentile_normalize_edge_cases() {
        let cal = table();
        let tier = "tier_3_humid_temperate";

        // Below minimum
        let result = percentile_normalize(0.4, "m1", &cal, tier, false).unwrap();
        assert_relative_eq!(result, 0.0, epsilon = 0.0001);

        // Above maximum
        let result = percentile_normalize(1.2, "m1", &cal, tier, false).unwrap();
        assert_relative_eq!(result, 100.0, epsilon = 0.0001);

        // At midpoint (p50 = 0.8)
        let result = percentile_normalize(0.8, "m1", &cal, tier, false).unwrap();
        assert_relative_eq!(result, 50.0, epsilon = 0.0001);

        // Between p20 and p30
        let result = percentile_normalize(0.675, "m1", &cal, tier, false).unwrap();
        assert_relative_eq!(result, 25.0, epsilon = 0.0001);

        // Inverted
        let result = percentile_normalize(0.4, "m1", &cal, tier, true).unwrap();
        assert_relative_eq!(result, 100.0, epsilon = 0.0001);
    }

    #[test]
    fn test_missing_tier_and_metric() {
        let cal = table();
        assert_eq!(
            percentile_normalize(0.5, "m1", &cal, "tier_6_arid", false),
            Err(ScoringError::MissingCalibration { tier: "tier_6_arid".into() })
        );
        assert!(matches!(
            percentile_normalize(0.5, "p2", &cal, "tier_3_humid_temperate", false),
            Err(ScoringError::MissingMetricCalibration { .. })
        ));
    }

    #[test]
    fn test_nan_is_below_minimum() {
        let bp = m1_breakpoints();
        assert_eq!(bp.percentile_of(f64::NAN), 0.0);
    }

    #[test]
    fn test_flat_bracket_gives_lower_percentile() {
        let bp = Breakpoints::new(vec![(1.0, 0.0), (50.0, 2.0), (60.0, 2.0), (99.0, 4.0)]).unwrap();
        assert_relative_eq!(bp.percentile_of(2.0), 50.0);
        assert_relative_eq!(bp.percentile_of(3.0), 79.5);
    }

    #[test]
    fn test_invalid_breakpoints_rejected() {
        assert!(Breakpoints::new(vec![(50.0, 1.0)]).is_err());
        assert!(Breakpoints::new(vec![(1.0, 2.0), (99.0, 1.0)]).is_err());
        assert!(serde_json::from_str::<Breakpoints>(r#"{"p1": 1.0, "method": "x"}"#).is_err());
        assert!(serde_json::from_str::<Breakpoints>(r#"{"p1": 1.0, "p99": "high"}"#).is_err());
    }

    #[test]
    fn test_breakpoints_serialize_as_percentile_keys() {
        let bp = Breakpoints::new(vec![(1.0, 0.25), (99.0, 0.75)]).unwrap();
        assert_eq!(serde_json::to_string(&bp).unwrap(), r#"{"p1":0.25,"p99":0.75}"#);
    }

    #[test]
    fn test_nearest_rank_and_interpolated() {
        let sorted: Vec<f64> = (0..=100).map(f64::from).collect();
        let nearest = Breakpoints::from_sorted_nearest_rank(&sorted, &METRIC_PERCENTILES).unwrap();
        assert_eq!(nearest.points()[0], (1.0, 1.0));
        assert_eq!(nearest.points()[12], (99.0, 99.0));

        let sorted = [0.0, 10.0];
        let interp = Breakpoints::from_sorted_interpolated(&sorted, &CSR_PERCENTILES).unwrap();
        assert_relative_eq!(interp.points()[9].1, 7.5);
        let nearest = Breakpoints::from_sorted_nearest_rank(&sorted, &[20.0, 60.0]).unwrap();
        assert_eq!(nearest.points(), &[(20.0, 0.0), (60.0, 10.0)]);
    }

    #[test]
    fn test_csr_to_percentile_fallback() {
        assert_eq!(csr_to_percentile(70.0, CsrStrategy::C, None), 100.0);
        assert_eq!(csr_to_percentile(50.0, CsrStrategy::C, None), 50.0);
        assert_eq!(csr_to_percentile(60.0, CsrStrategy::S, None), 100.0);
        assert_eq!(csr_to_percentile(60.0, CsrStrategy::R, None), 100.0);
        assert_eq!(csr_to_percentile(40.0, CsrStrategy::R, None), 50.0);
    }

    #[test]
    fn test_csr_to_percentile_calibrated() {
        let cal: CsrCalibration = serde_json::from_str(
            r#"{
                "c": {"p1": 0.0, "p50": 40.0, "p99": 90.0, "method": "percentile", "n_samples": 3},
                "s": {"p1": 0.0, "p99": 100.0},
                "r": {"p1": 0.0, "p99": 100.0}
            }"#,
        )
        .unwrap();
        assert_relative_eq!(csr_to_percentile(40.0, CsrStrategy::C, Some(&cal)), 50.0);
        assert_relative_eq!(csr_to_percentile(65.0, CsrStrategy::C, Some(&cal)), 74.5);
        assert_eq!(csr_to_percentile(95.0, CsrStrategy::C, Some(&cal)), 100.0);
        assert_eq!(csr_to_percentile(0.0, CsrStrategy::S, Some(&cal)), 0.0);
    }

    #[test]
    fn test_load_dir_and_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = BTreeMap::new();
        metrics.insert("m1".to_string(), m1_breakpoints());
        let file = CalibrationFile {
            tier: "tier_6_arid".into(),
            guild_size: 5,
            n_guilds: 100,
            seed: 42,
            metrics,
        };
        file.write(dir.path()).unwrap();

        let tiers = vec!["tier_6_arid".to_string(), "tier_1_tropical".to_string()];
        let table = CalibrationTable::load_dir(dir.path(), &tiers).unwrap();
        assert!(table.has_tier("tier_6_arid"));
        assert!(!table.has_tier("tier_1_tropical"));
        assert_eq!(table.breakpoints("tier_6_arid", "m1").unwrap(), &m1_breakpoints());
    }
}
