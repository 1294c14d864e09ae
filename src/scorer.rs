//! Guild Scorer - Main coordinator for scoring plant guilds
//!
//! Integrates every metric, normalizes raw values against the climate
//! tier's calibration and combines them into the weighted overall score.
//! Includes both single-guild and parallel (Rayon) batch scoring.

use crate::config::EngineConfig;
use crate::data::{Plant, ReferenceData};
use crate::error::{ScoringError, ScoringResult};
use crate::metrics::{
    calculate_flags, GuildContext, GuildFlags, GuildMetrics, MetricId, MetricWeights, RawScores,
};
use crate::utils::{percentile_normalize, CalibrationTable, CsrCalibration, CSR_CALIBRATION_FILE};
use anyhow::{Context, Result};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Percentile and score given to pairwise metrics on a single-plant guild
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Main guild scorer
///
/// Holds frozen reference data and calibration; every scoring call is a pure
/// function over them, so one scorer can be shared across threads.
#[derive(Debug, Clone)]
pub struct GuildScorer {
    data: Arc<ReferenceData>,
    calibration: CalibrationTable,
    csr_calibration: Option<CsrCalibration>,
    weights: MetricWeights,
}

/// One metric's contribution to a guild score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScore {
    pub label: &'static str,
    pub raw: f64,
    /// Percentile within the tier's reference guilds (0-100)
    pub percentile: f64,
    /// Direction-adjusted score, HIGH = GOOD (0-100)
    pub score: f64,
    /// `None` for metrics reported but not weighted
    pub weight: Option<f64>,
    /// False for pairwise metrics on a single-plant guild, which are
    /// held at [`NEUTRAL_SCORE`] instead of being normalized
    pub applicable: bool,
}

/// Data gaps and ecological detail behind a score
#[derive(Debug, Clone, Serialize)]
pub struct GuildDiagnostics {
    pub faiths_pd: f64,
    pub mapped_taxa: usize,
    pub unmapped_taxa: Vec<String>,
    pub missing_organism_profiles: Vec<String>,
    pub missing_fungal_profiles: Vec<String>,
    /// Climate tiers every plant belongs to
    pub shared_climate_tiers: Vec<String>,
    /// Whether every pair of known climate envelopes overlaps;
    /// `None` when fewer than two plants have an envelope
    pub envelopes_overlap: Option<bool>,
    /// Nitrogen-fixation and soil-pH flags; not scored
    pub flags: GuildFlags,
    pub metrics: GuildMetrics,
}

/// Guild score result
#[derive(Debug, Clone, Serialize)]
pub struct GuildScoreResult {
    pub climate_tier: String,
    /// Canonical (sorted) plant ids
    pub plant_ids: Vec<String>,
    pub overall_score: f64,
    pub per_metric: BTreeMap<String, MetricScore>,
    pub diagnostics: GuildDiagnostics,
}

impl GuildScorer {
    /// Build a scorer from loaded parts
    pub fn new(
        data: Arc<ReferenceData>,
        calibration: CalibrationTable,
        csr_calibration: Option<CsrCalibration>,
        weights: MetricWeights,
    ) -> Self {
        info!(
            plants = data.plants.len(),
            tiers = calibration.tiers().count(),
            csr_calibration = csr_calibration.is_some(),
            metrics = weights.metrics().count(),
            "guild scorer initialized"
        );
        Self {
            data,
            calibration,
            csr_calibration,
            weights,
        }
    }

    /// Load reference data, tier calibrations and the CSR calibration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let weights = config.metric_weights()?;
        let data = Arc::new(ReferenceData::load(config)?);

        let calibration_dir = config.calibration_path();
        let calibration = CalibrationTable::load_dir(&calibration_dir, &config.climate_tiers)
            .context("Failed to load tier calibration")?;

        // CSR calibration is global, not tier-specific
        let csr_path = calibration_dir.join(CSR_CALIBRATION_FILE);
        let csr_calibration = if csr_path.exists() {
            Some(CsrCalibration::load(&csr_path)?)
        } else {
            warn!(path = %csr_path.display(), "CSR calibration not found - using fixed thresholds");
            None
        };

        Ok(Self::new(data, calibration, csr_calibration, weights))
    }

    /// Scorer for raw-score extraction only (no tier calibration)
    pub fn for_calibration(
        data: Arc<ReferenceData>,
        csr_calibration: Option<CsrCalibration>,
    ) -> Self {
        Self {
            data,
            calibration: CalibrationTable::default(),
            csr_calibration,
            weights: MetricWeights::default(),
        }
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    /// Reject empty guilds, duplicates and unknown ids; return canonical order
    pub fn validate_guild(&self, plant_ids: &[String]) -> ScoringResult<Vec<String>> {
        if plant_ids.is_empty() {
            return Err(ScoringError::EmptyGuild);
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for id in plant_ids {
            if !seen.insert(id.as_str()) {
                return Err(ScoringError::DuplicatePlant(id.clone()));
            }
            if !self.data.plants.contains(id) {
                return Err(ScoringError::UnknownPlant(id.clone()));
            }
        }
        let mut canonical = plant_ids.to_vec();
        canonical.sort_unstable();
        Ok(canonical)
    }

    /// Every metric with full diagnostics, for an already canonical guild
    fn calculate_metrics(&self, canonical: &[String]) -> GuildMetrics {
        let plants: Vec<&Plant> = canonical
            .iter()
            .filter_map(|id| self.data.plants.get(id))
            .collect();
        let ctx = GuildContext {
            plant_ids: canonical,
            plants,
            data: &self.data,
            csr_calibration: self.csr_calibration.as_ref(),
        };
        GuildMetrics::calculate(&ctx)
    }

    /// Compute raw scores for a guild (for calibration)
    ///
    /// Returns raw metric values without normalization. Calibration and
    /// production scoring share this code path.
    pub fn compute_raw_scores(&self, plant_ids: &[String]) -> ScoringResult<RawScores> {
        let canonical = self.validate_guild(plant_ids)?;
        Ok(self.calculate_metrics(&canonical).raw_scores())
    }

    /// Score a guild of plants against one climate tier's calibration
    pub fn score_guild(&self, plant_ids: &[String], climate_tier: &str) -> ScoringResult<GuildScoreResult> {
        let canonical = self.validate_guild(plant_ids)?;
        // Fail before computing anything when the tier is unknown
        self.calibration.tier(climate_tier)?;

        let metrics = self.calculate_metrics(&canonical);
        let raw = metrics.raw_scores();
        let single_plant = canonical.len() < 2;

        let mut per_metric = BTreeMap::new();
        let mut overall = 0.0;
        for metric in MetricId::ALL {
            let weight = self.weights.get(metric);
            let has_breakpoints = self.calibration.breakpoints(climate_tier, metric.key()).is_ok();
            if weight.is_none() && !has_breakpoints {
                // Reported-only metric without calibration
                continue;
            }

            let raw_value = raw.get(metric);
            let applicable = !(single_plant && metric.pairwise());
            let (percentile, score) = if applicable {
                let percentile =
                    percentile_normalize(raw_value, metric.key(), &self.calibration, climate_tier, false)?;
                let score = if metric.inverted() { 100.0 - percentile } else { percentile };
                (percentile, score)
            } else {
                // One plant has no pairs: no evidence either way
                self.calibration.breakpoints(climate_tier, metric.key())?;
                (NEUTRAL_SCORE, NEUTRAL_SCORE)
            };
            if let Some(w) = weight {
                overall += w * score;
            }

            per_metric.insert(
                metric.key().to_string(),
                MetricScore {
                    label: metric.label(),
                    raw: raw_value,
                    percentile,
                    score,
                    weight,
                    applicable,
                },
            );
        }

        let diagnostics = self.diagnostics(&canonical, metrics);
        debug!(
            plants = canonical.len(),
            tier = climate_tier,
            overall = overall,
            "guild scored"
        );

        Ok(GuildScoreResult {
            climate_tier: climate_tier.to_string(),
            plant_ids: canonical,
            overall_score: overall.clamp(0.0, 100.0),
            per_metric,
            diagnostics,
        })
    }

    /// Score many guilds in parallel; results keep the input order
    pub fn score_guilds_parallel(
        &self,
        guilds: &[Vec<String>],
        climate_tier: &str,
    ) -> Vec<ScoringResult<GuildScoreResult>> {
        guilds
            .par_iter()
            .map(|guild| self.score_guild(guild, climate_tier))
            .collect()
    }

    fn diagnostics(&self, canonical: &[String], metrics: GuildMetrics) -> GuildDiagnostics {
        let profiles = &self.data.profiles;
        let plants: Vec<&Plant> = canonical
            .iter()
            .filter_map(|id| self.data.plants.get(id))
            .collect();

        let missing_organism_profiles: Vec<String> = canonical
            .iter()
            .filter(|id| !profiles.has_organism_profile(id))
            .cloned()
            .collect();
        let missing_fungal_profiles: Vec<String> = canonical
            .iter()
            .filter(|id| !profiles.has_fungal_profile(id))
            .cloned()
            .collect();
        if !missing_organism_profiles.is_empty() || !missing_fungal_profiles.is_empty() {
            debug!(
                organisms = missing_organism_profiles.len(),
                fungi = missing_fungal_profiles.len(),
                "plants without interaction profiles treated as empty"
            );
        }

        GuildDiagnostics {
            faiths_pd: metrics.m1.faiths_pd,
            mapped_taxa: metrics.m1.mapped,
            unmapped_taxa: metrics.m1.unmapped.clone(),
            missing_organism_profiles,
            missing_fungal_profiles,
            shared_climate_tiers: shared_climate_tiers(&plants),
            envelopes_overlap: envelopes_overlap(&plants),
            flags: calculate_flags(&plants),
            metrics,
        }
    }
}

/// Tiers common to every plant, in the first plant's order
fn shared_climate_tiers(plants: &[&Plant]) -> Vec<String> {
    let Some((first, rest)) = plants.split_first() else {
        return Vec::new();
    };
    first
        .climate_tiers
        .iter()
        .filter(|tier| rest.iter().all(|p| p.in_tier(tier)))
        .cloned()
        .collect()
}

fn envelopes_overlap(plants: &[&Plant]) -> Option<bool> {
    let envelopes: Vec<_> = plants.iter().filter_map(|p| p.envelope.as_ref()).collect();
    if envelopes.len() < 2 {
        return None;
    }
    let all = envelopes
        .iter()
        .enumerate()
        .all(|(i, a)| envelopes[i + 1..].iter().all(|b| a.overlaps(b)));
    Some(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        ClimateEnvelope, CsrProfile, InteractionProfileStore, PlantCatalog, TrophicNetworkIndex,
    };
    use crate::phylo::{PhyloTree, PhylogeneticDistanceIndex, TipMapping};
    use crate::utils::Breakpoints;
    use approx::assert_relative_eq;

    fn plant(id: &str, tiers: &[&str]) -> Plant {
        let mut p = Plant::new(id, "Rosaceae", "Malus");
        p.csr = Some(CsrProfile { c: 40.0, s: 30.0, r: 30.0 });
        p.climate_tiers = tiers.iter().map(|t| t.to_string()).collect();
        p
    }

    fn linear_breakpoints(lo: f64, hi: f64) -> Breakpoints {
        Breakpoints::new(vec![(0.0, lo), (100.0, hi)]).unwrap()
    }

    fn scorer() -> GuildScorer {
        let plants = PlantCatalog::from_plants(vec![
            plant("a", &["tier_3_humid_temperate"]),
            plant("b", &["tier_3_humid_temperate", "tier_6_arid"]),
            plant("c", &["tier_6_arid"]),
        ])
        .unwrap();
        let tree = PhyloTree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        let tips = TipMapping::from_pairs([("a", "A"), ("b", "B"), ("c", "C")]);
        let data = ReferenceData::new(
            plants,
            InteractionProfileStore::default(),
            TrophicNetworkIndex::default(),
            PhylogeneticDistanceIndex::new(tree, tips),
        );

        let mut metrics = BTreeMap::new();
        metrics.insert("m1".to_string(), linear_breakpoints(0.99, 1.0));
        metrics.insert("n4".to_string(), linear_breakpoints(0.0, 1.0));
        metrics.insert("p1".to_string(), linear_breakpoints(0.0, 1.0));
        metrics.insert("p2".to_string(), linear_breakpoints(0.0, 1.0));
        metrics.insert("p3".to_string(), linear_breakpoints(0.0, 1.0));
        metrics.insert("p5".to_string(), linear_breakpoints(0.0, 1.0));
        metrics.insert("p6".to_string(), linear_breakpoints(0.0, 100.0));
        let mut tiers = BTreeMap::new();
        tiers.insert("tier_3_humid_temperate".to_string(), metrics);

        GuildScorer::new(
            Arc::new(data),
            CalibrationTable::new(tiers),
            None,
            MetricWeights::default(),
        )
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validation_errors() {
        let scorer = scorer();
        let tier = "tier_3_humid_temperate";
        assert_eq!(scorer.score_guild(&[], tier).unwrap_err(), ScoringError::EmptyGuild);
        assert_eq!(
            scorer.score_guild(&ids(&["a", "a"]), tier).unwrap_err(),
            ScoringError::DuplicatePlant("a".into())
        );
        assert_eq!(
            scorer.score_guild(&ids(&["a", "zz"]), tier).unwrap_err(),
            ScoringError::UnknownPlant("zz".into())
        );
        assert_eq!(
            scorer.score_guild(&ids(&["a", "b"]), "tier_9").unwrap_err(),
            ScoringError::MissingCalibration { tier: "tier_9".into() }
        );
    }

    #[test]
    fn test_score_is_order_independent_and_bounded() {
        let scorer = scorer();
        let tier = "tier_3_humid_temperate";
        let forward = scorer.score_guild(&ids(&["a", "b", "c"]), tier).unwrap();
        let reverse = scorer.score_guild(&ids(&["c", "a", "b"]), tier).unwrap();
        assert_eq!(forward.overall_score.to_bits(), reverse.overall_score.to_bits());
        assert_eq!(forward.plant_ids, ids(&["a", "b", "c"]));
        assert!((0.0..=100.0).contains(&forward.overall_score));
        // P4 and P7 have no breakpoints and no weight: not reported
        assert!(!forward.per_metric.contains_key("p4"));
        assert_eq!(forward.per_metric.len(), 7);
    }

    #[test]
    fn test_inverted_metric_and_weighted_sum() {
        let scorer = scorer();
        let result = scorer.score_guild(&ids(&["a", "b"]), "tier_3_humid_temperate").unwrap();
        // PD 2 → risk exp(-0.002) ≈ 0.998 → percentile ≈ 80 → score ≈ 20
        let m1 = &result.per_metric["m1"];
        assert_relative_eq!(m1.score, 100.0 - m1.percentile);
        let expected: f64 = result
            .per_metric
            .values()
            .filter_map(|m| m.weight.map(|w| w * m.score))
            .sum();
        assert_relative_eq!(result.overall_score, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_single_plant_pairwise_metrics_are_neutral() {
        let scorer = scorer();
        let result = scorer.score_guild(&ids(&["a"]), "tier_3_humid_temperate").unwrap();
        let pm = &result.per_metric;
        for key in ["m1", "n4", "p1", "p2", "p5"] {
            assert!(!pm[key].applicable, "{key} should not apply");
            assert_eq!(pm[key].percentile, NEUTRAL_SCORE);
            assert_eq!(pm[key].score, NEUTRAL_SCORE);
        }
        // Raw values are still reported
        assert_eq!(pm["m1"].raw, 1.0);
        assert!(pm["p6"].applicable);
        assert!(pm["p3"].applicable);
        assert_eq!(result.diagnostics.faiths_pd, 0.0);

        // No profiles: p3 and p6 raw 0 → percentile 0
        let expected = 5.0 * NEUTRAL_SCORE / 7.0;
        assert_relative_eq!(result.overall_score, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_metric_breakpoints() {
        let mut scorer = scorer();
        let mut weights = BTreeMap::new();
        weights.insert(MetricId::PhyloDiversity, 1.0);
        scorer.weights = MetricWeights::new(weights).unwrap();
        assert_eq!(
            scorer.score_guild(&ids(&["a", "b"]), "tier_3_humid_temperate").unwrap_err(),
            ScoringError::MissingMetricCalibration {
                tier: "tier_3_humid_temperate".into(),
                metric: "p4".into(),
            }
        );
        // Neutral single-plant scoring still needs the breakpoints
        assert!(matches!(
            scorer.score_guild(&ids(&["a"]), "tier_3_humid_temperate"),
            Err(ScoringError::MissingMetricCalibration { .. })
        ));
    }

    #[test]
    fn test_climate_diagnostics() {
        let scorer = scorer();
        let result = scorer.score_guild(&ids(&["a", "b"]), "tier_3_humid_temperate").unwrap();
        assert_eq!(result.diagnostics.shared_climate_tiers, vec!["tier_3_humid_temperate"]);
        assert_eq!(result.diagnostics.envelopes_overlap, None);
        assert_eq!(result.diagnostics.missing_organism_profiles, ids(&["a", "b"]));

        let mut a = Plant::new("a", "F", "G");
        a.envelope = Some(ClimateEnvelope { temp_min: 0.0, temp_max: 10.0, precip_min: 100.0, precip_max: 500.0 });
        let mut b = Plant::new("b", "F", "G");
        b.envelope = Some(ClimateEnvelope { temp_min: 20.0, temp_max: 30.0, precip_min: 100.0, precip_max: 500.0 });
        assert_eq!(envelopes_overlap(&[&a, &b]), Some(false));
        assert!(shared_climate_tiers(&[]).is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let scorer = scorer();
        let tier = "tier_3_humid_temperate";
        let guilds = vec![ids(&["a", "b"]), ids(&["b", "c"]), ids(&["a"]), ids(&["a", "a"])];
        let parallel = scorer.score_guilds_parallel(&guilds, tier);
        for (guild, result) in guilds.iter().zip(&parallel) {
            match (scorer.score_guild(guild, tier), result) {
                (Ok(seq), Ok(par)) => assert_eq!(seq.overall_score.to_bits(), par.overall_score.to_bits()),
                (Err(seq), Err(par)) => assert_eq!(&seq, par),
                _ => panic!("parallel and sequential disagree for {guild:?}"),
            }
        }
    }

    #[test]
    fn test_raw_scores_without_calibration() {
        let scorer = GuildScorer::for_calibration(scorer().data.clone(), None);
        let raw = scorer.compute_raw_scores(&ids(&["a", "c"])).unwrap();
        assert_relative_eq!(raw.faiths_pd, 4.0);
        assert!(scorer.score_guild(&ids(&["a", "c"]), "tier_3_humid_temperate").is_err());
    }
}
