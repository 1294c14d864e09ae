//! METRIC 7: POLLINATOR SUPPORT (SHARED POLLINATORS)
//!
//! Scores pollinator coverage: the share of guild plants with at least one
//! documented pollinator. The quadratic overlap score of shared pollinator
//! communities is kept for reporting.
//!
//! **Data Quality Note**:
//!   - Uses ONLY "pollinators" (GloBI interactionTypeName == 'pollinates')
//!   - Does NOT use "flower_visitors" (contaminated with herbivores, fungi, etc.)

use crate::data::{InteractionProfileStore, Relation};
use crate::utils::{count_shared_organisms, plants_with_any};
use serde::Serialize;
use std::collections::BTreeMap;

const POLLINATOR_RELATIONS: &[Relation] = &[Relation::Pollinators];

/// Result of M7 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M7Result {
    /// Coverage percentage: % of plants with ≥1 documented pollinator (0-100)
    pub raw: f64,
    /// Quadratic-weighted pollinator overlap score (reporting only)
    pub quadratic_score: f64,
    /// Number of pollinators visiting at least two plants
    pub n_shared_pollinators: usize,
    /// Number of plants with ≥1 documented pollinator
    pub plants_with_pollinators: usize,
    /// Total plants in guild
    pub total_plants: usize,
    /// Map of pollinator_name → plant_count for detailed analysis
    pub pollinator_counts: BTreeMap<String, usize>,
}

/// Calculate M7: Pollinator Support
pub fn calculate_m7(plant_ids: &[String], profiles: &InteractionProfileStore) -> M7Result {
    let n_plants = plant_ids.len();
    let pollinator_counts: BTreeMap<String, usize> =
        count_shared_organisms(profiles, plant_ids, POLLINATOR_RELATIONS)
            .into_iter()
            .collect();
    let plants_with_pollinators = plants_with_any(profiles, plant_ids, POLLINATOR_RELATIONS);

    let mut quadratic_score = 0.0;
    let mut n_shared_pollinators = 0;
    for count in pollinator_counts.values().filter(|&&c| c >= 2) {
        let overlap_ratio = *count as f64 / n_plants as f64;
        quadratic_score += overlap_ratio.powi(2); // QUADRATIC benefit
        n_shared_pollinators += 1;
    }

    let raw = if n_plants > 0 {
        (plants_with_pollinators as f64 / n_plants as f64) * 100.0
    } else {
        0.0
    };

    M7Result {
        raw,
        quadratic_score,
        n_shared_pollinators,
        plants_with_pollinators,
        total_plants: n_plants,
        pollinator_counts,
    }
}
