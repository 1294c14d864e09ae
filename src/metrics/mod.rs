//! Metric modules for guild scoring
//!
//! Each metric lives in its own module and computes a raw (unnormalized)
//! value from a resolved guild. Normalization and weighting happen in the
//! scorer, so calibration and scoring share exactly one code path.

pub mod ecosystem_services;
pub mod guild_flags;
pub mod m1_pest_pathogen_indep;
pub mod m2_growth_compatibility;
pub mod m3_insect_control;
pub mod m4_disease_control;
pub mod m5_beneficial_fungi;
pub mod m6_structural_diversity;
pub mod m7_pollinator_support;
pub mod trophic;

pub use ecosystem_services::{
    calculate_ecosystem_services, csr_service_balance, CsrServiceBalance, EcosystemServicesResult,
    ServiceRating,
};
pub use guild_flags::{
    calculate_flags, check_nitrogen_fixation, check_soil_ph, GuildFlags, NitrogenFlag,
    NitrogenStatus, SoilPhFlag,
};
pub use m1_pest_pathogen_indep::{calculate_m1, pest_risk, M1Result};
pub use m2_growth_compatibility::{calculate_m2, M2Result, PlantCsrData};
pub use m3_insect_control::{calculate_m3, M3Result};
pub use m4_disease_control::{calculate_m4, M4Result};
pub use m5_beneficial_fungi::{calculate_m5, M5Result};
pub use m6_structural_diversity::{calculate_m6, GrowthFormGroup, M6Result};
pub use m7_pollinator_support::{calculate_m7, M7Result};
pub use trophic::{MatchKind, TrophicMatch};

use crate::data::{Plant, ReferenceData};
use crate::error::{ScoringError, ScoringResult};
use crate::utils::CsrCalibration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance on the sum of metric weights
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Calibrated guild metrics; the serialized name doubles as the calibration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricId {
    #[serde(rename = "m1")]
    PestRisk,
    #[serde(rename = "n4")]
    GrowthCompatibility,
    #[serde(rename = "p1")]
    Biocontrol,
    #[serde(rename = "p2")]
    DiseaseControl,
    #[serde(rename = "p3")]
    BeneficialFungi,
    #[serde(rename = "p4")]
    PhyloDiversity,
    #[serde(rename = "p5")]
    Stratification,
    #[serde(rename = "p6")]
    PollinatorSupport,
    #[serde(rename = "p7")]
    ServiceBalance,
}

impl MetricId {
    pub const ALL: [MetricId; 9] = [
        MetricId::PestRisk,
        MetricId::GrowthCompatibility,
        MetricId::Biocontrol,
        MetricId::DiseaseControl,
        MetricId::BeneficialFungi,
        MetricId::PhyloDiversity,
        MetricId::Stratification,
        MetricId::PollinatorSupport,
        MetricId::ServiceBalance,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MetricId::PestRisk => "m1",
            MetricId::GrowthCompatibility => "n4",
            MetricId::Biocontrol => "p1",
            MetricId::DiseaseControl => "p2",
            MetricId::BeneficialFungi => "p3",
            MetricId::PhyloDiversity => "p4",
            MetricId::Stratification => "p5",
            MetricId::PollinatorSupport => "p6",
            MetricId::ServiceBalance => "p7",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        MetricId::ALL.iter().copied().find(|m| m.key() == key)
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricId::PestRisk => "Pest & Pathogen Independence",
            MetricId::GrowthCompatibility => "Growth Compatibility",
            MetricId::Biocontrol => "Insect Pest Control",
            MetricId::DiseaseControl => "Disease Suppression",
            MetricId::BeneficialFungi => "Beneficial Fungi",
            MetricId::PhyloDiversity => "Phylogenetic Diversity",
            MetricId::Stratification => "Structural Diversity",
            MetricId::PollinatorSupport => "Pollinator Support",
            MetricId::ServiceBalance => "Ecosystem Service Balance",
        }
    }

    /// Lower raw values are better; the displayed score is `100 - percentile`
    pub fn inverted(self) -> bool {
        matches!(self, MetricId::PestRisk | MetricId::GrowthCompatibility)
    }

    /// Needs at least two plants to mean anything
    pub fn pairwise(self) -> bool {
        matches!(
            self,
            MetricId::PestRisk
                | MetricId::GrowthCompatibility
                | MetricId::Biocontrol
                | MetricId::DiseaseControl
                | MetricId::PhyloDiversity
                | MetricId::Stratification
        )
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Validated metric weights: finite, non-negative, summing to 1
///
/// The key set is the set of metrics that contribute to the overall score.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricWeights {
    weights: BTreeMap<MetricId, f64>,
}

impl MetricWeights {
    pub fn new(weights: BTreeMap<MetricId, f64>) -> ScoringResult<Self> {
        if let Some((metric, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "weight for {metric} must be finite and non-negative, got {w}"
            )));
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringError::InvalidConfig(format!(
                "metric weights sum to {total}, expected 1"
            )));
        }
        Ok(Self { weights })
    }

    pub fn get(&self, metric: MetricId) -> Option<f64> {
        self.weights.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricId, f64)> + '_ {
        self.weights.iter().map(|(m, w)| (*m, *w))
    }

    pub fn metrics(&self) -> impl Iterator<Item = MetricId> + '_ {
        self.weights.keys().copied()
    }
}

impl Default for MetricWeights {
    /// Equal weights over the seven scored metrics; P4 and P7 are reported only
    fn default() -> Self {
        let scored = MetricId::ALL
            .iter()
            .copied()
            .filter(|m| !matches!(m, MetricId::PhyloDiversity | MetricId::ServiceBalance));
        let weights: BTreeMap<MetricId, f64> = scored.map(|m| (m, 1.0 / 7.0)).collect();
        Self { weights }
    }
}

/// Raw scores for all metrics (unnormalized), as used for calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawScores {
    pub faiths_pd: f64,
    pub pest_risk: f64,
    pub conflict_density: f64,
    pub biocontrol: f64,
    pub disease_control: f64,
    pub beneficial_fungi: f64,
    pub stratification: f64,
    pub pollinator_support: f64,
    pub service_balance: f64,
}

impl RawScores {
    pub fn get(&self, metric: MetricId) -> f64 {
        match metric {
            MetricId::PestRisk => self.pest_risk,
            MetricId::GrowthCompatibility => self.conflict_density,
            MetricId::Biocontrol => self.biocontrol,
            MetricId::DiseaseControl => self.disease_control,
            MetricId::BeneficialFungi => self.beneficial_fungi,
            MetricId::PhyloDiversity => self.faiths_pd,
            MetricId::Stratification => self.stratification,
            MetricId::PollinatorSupport => self.pollinator_support,
            MetricId::ServiceBalance => self.service_balance,
        }
    }
}

/// A validated guild resolved against the reference data
///
/// `plant_ids` and `plants` are in the same (canonical) order.
#[derive(Debug, Clone)]
pub struct GuildContext<'a> {
    pub plant_ids: &'a [String],
    pub plants: Vec<&'a Plant>,
    pub data: &'a ReferenceData,
    pub csr_calibration: Option<&'a CsrCalibration>,
}

/// Every metric result for one guild, with full diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct GuildMetrics {
    pub m1: M1Result,
    pub m2: M2Result,
    pub m3: M3Result,
    pub m4: M4Result,
    pub m5: M5Result,
    pub m6: M6Result,
    pub m7: M7Result,
    pub ecosystem_services: EcosystemServicesResult,
}

impl GuildMetrics {
    pub fn calculate(ctx: &GuildContext<'_>) -> Self {
        let data = ctx.data;
        Self {
            m1: calculate_m1(ctx.plant_ids, &data.phylo),
            m2: calculate_m2(&ctx.plants, ctx.csr_calibration),
            m3: calculate_m3(ctx.plant_ids, &data.profiles, &data.trophic),
            m4: calculate_m4(ctx.plant_ids, &data.profiles, &data.trophic),
            m5: calculate_m5(ctx.plant_ids, &data.profiles),
            m6: calculate_m6(&ctx.plants),
            m7: calculate_m7(ctx.plant_ids, &data.profiles),
            ecosystem_services: calculate_ecosystem_services(&ctx.plants),
        }
    }

    pub fn raw_scores(&self) -> RawScores {
        RawScores {
            faiths_pd: self.m1.faiths_pd,
            pest_risk: self.m1.raw,
            conflict_density: self.m2.raw,
            biocontrol: self.m3.raw,
            disease_control: self.m4.raw,
            beneficial_fungi: self.m5.raw,
            stratification: self.m6.raw,
            pollinator_support: self.m7.raw,
            service_balance: self.ecosystem_services.balance.evenness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_keys_round_trip() {
        for metric in MetricId::ALL {
            assert_eq!(MetricId::from_key(metric.key()), Some(metric));
            assert_eq!(
                serde_json::to_string(&metric).unwrap(),
                format!("\"{}\"", metric.key())
            );
        }
        assert_eq!(MetricId::from_key("m9"), None);
    }

    #[test]
    fn test_default_weights() {
        let weights = MetricWeights::default();
        assert_eq!(weights.metrics().count(), 7);
        assert_eq!(weights.get(MetricId::PhyloDiversity), None);
        assert_eq!(weights.get(MetricId::ServiceBalance), None);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        assert!(MetricWeights::new(weights.weights.clone()).is_ok());
    }

    #[test]
    fn test_invalid_weights() {
        let mut weights = BTreeMap::new();
        weights.insert(MetricId::PestRisk, 1.5);
        weights.insert(MetricId::Biocontrol, -0.5);
        assert!(MetricWeights::new(weights).is_err());

        let mut weights = BTreeMap::new();
        weights.insert(MetricId::PestRisk, f64::NAN);
        assert!(MetricWeights::new(weights).is_err());

        assert!(MetricWeights::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_direction_flags() {
        assert!(MetricId::PestRisk.inverted());
        assert!(MetricId::GrowthCompatibility.inverted());
        assert!(!MetricId::PollinatorSupport.inverted());
        assert!(!MetricId::PollinatorSupport.pairwise());
        assert!(!MetricId::BeneficialFungi.pairwise());
        assert!(!MetricId::ServiceBalance.pairwise());
        assert!(!MetricId::ServiceBalance.inverted());
    }
}
