//! M1: Pest & Pathogen Independence (and P4 phylogenetic diversity)
//!
//! Scores phylogenetic diversity using Faith's PD as a proxy for pest/pathogen
//! risk reduction. Higher diversity (more evolutionary distance) = lower risk.
//!
//! Ecological Rationale:
//! - Host specificity: Most pests are genus/family-specific
//! - Dilution effect: Non-host plants reduce pest transmission
//! - Associational resistance: Non-hosts interfere with pest foraging

use crate::phylo::PhylogeneticDistanceIndex;
use serde::Serialize;
use tracing::debug;

/// Decay constant of the PD → pest risk transform
pub const PD_DECAY: f64 = 0.001;

/// M1 calculation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M1Result {
    /// Pest risk, `exp(-k × faiths_pd)` (1.0 = maximum risk)
    pub raw: f64,
    /// Faith's PD of the mapped plants; also the raw P4 value
    pub faiths_pd: f64,
    pub mapped: usize,
    /// Plants without a tree tip, excluded from PD
    pub unmapped: Vec<String>,
}

/// `exp(-k × faiths_pd)`
///
/// - faiths_pd = 0 (same species) → 1.00 (maximum risk)
/// - faiths_pd = 500 → 0.61
/// - faiths_pd = 1000 → 0.37
pub fn pest_risk(faiths_pd: f64) -> f64 {
    libm::exp(-PD_DECAY * faiths_pd)
}

/// Calculate M1: Pest & Pathogen Independence
///
/// A single-plant guild has no diversity: PD 0, risk 1.0.
pub fn calculate_m1(plant_ids: &[String], phylo: &PhylogeneticDistanceIndex) -> M1Result {
    let detail = phylo.faiths_pd_detailed(plant_ids);
    if !detail.unmapped.is_empty() {
        debug!(
            unmapped = detail.unmapped.len(),
            "plants without a tree tip excluded from Faith's PD"
        );
    }

    M1Result {
        raw: pest_risk(detail.faiths_pd),
        faiths_pd: detail.faiths_pd,
        mapped: detail.mapped,
        unmapped: detail.unmapped,
    }
}
