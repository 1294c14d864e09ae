//! METRIC 5: BENEFICIAL FUNGI NETWORKS (MYCORRHIZAE & ENDOPHYTES)
//!
//! Scores Common Mycorrhizal Networks and individual fungal associations
//! using shared organism counting and coverage analysis.
//!
//! Fungal guilds counted: AMF, EMF, endophytic, saprotrophic.

use crate::data::{InteractionProfileStore, Relation};
use crate::utils::{count_shared_organisms, plants_with_any};
use serde::Serialize;
use std::collections::BTreeMap;

const BENEFICIAL_RELATIONS: &[Relation] = &[
    Relation::Amf,
    Relation::Emf,
    Relation::EndophyticFungi,
    Relation::SaprotrophicFungi,
];

/// Result of M5 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M5Result {
    /// Combined network + coverage score
    pub raw: f64,
    /// Network connectivity score
    pub network_score: f64,
    /// Fraction of plants with beneficial fungi
    pub coverage_ratio: f64,
    /// Number of fungi hosted by at least two plants
    pub n_shared_fungi: usize,
    /// Number of plants with beneficial fungi
    pub plants_with_fungi: usize,
    /// Map of fungus_name → plant_count for detailed analysis
    pub fungi_counts: BTreeMap<String, usize>,
}

/// Calculate M5: Beneficial Fungi Networks
pub fn calculate_m5(plant_ids: &[String], profiles: &InteractionProfileStore) -> M5Result {
    let n_plants = plant_ids.len();
    let fungi_counts: BTreeMap<String, usize> =
        count_shared_organisms(profiles, plant_ids, BENEFICIAL_RELATIONS)
            .into_iter()
            .collect();
    let plants_with_fungi = plants_with_any(profiles, plant_ids, BENEFICIAL_RELATIONS);

    if n_plants == 0 {
        return M5Result {
            raw: 0.0,
            network_score: 0.0,
            coverage_ratio: 0.0,
            n_shared_fungi: 0,
            plants_with_fungi: 0,
            fungi_counts,
        };
    }

    // COMPONENT 1: Network score (weight 0.6)
    // Integer sum first so the score does not depend on map order
    let shared: Vec<usize> = fungi_counts.values().copied().filter(|&c| c >= 2).collect();
    let network_score = shared.iter().sum::<usize>() as f64 / n_plants as f64;

    // COMPONENT 2: Coverage ratio (weight 0.4)
    let coverage_ratio = plants_with_fungi as f64 / n_plants as f64;

    M5Result {
        raw: network_score * 0.6 + coverage_ratio * 0.4,
        network_score,
        coverage_ratio,
        n_shared_fungi: shared.len(),
        plants_with_fungi,
        fungi_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FungalGuildProfile, OrganismSet};
    use approx::assert_relative_eq;
    use rustc_hash::FxHashMap;

    fn set(items: &[&str]) -> OrganismSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn store() -> InteractionProfileStore {
        let mut fungi = FxHashMap::default();
        fungi.insert(
            "a".to_string(),
            FungalGuildProfile { amf: set(&["Glomus"]), ..Default::default() },
        );
        fungi.insert(
            "b".to_string(),
            FungalGuildProfile {
                amf: set(&["Glomus"]),
                endophytic: set(&["Epichloe"]),
                ..Default::default()
            },
        );
        fungi.insert(
            "c".to_string(),
            FungalGuildProfile {
                // Pathogens are not beneficial
                pathogenic: set(&["Botrytis"]),
                ..Default::default()
            },
        );
        InteractionProfileStore::new(FxHashMap::default(), fungi)
    }

    #[test]
    fn test_network_and_coverage() {
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let result = calculate_m5(&ids, &store());

        // Glomus shared by 2 of 3 plants; 2 of 3 plants have any beneficial fungus
        assert_relative_eq!(result.network_score, 2.0 / 3.0);
        assert_relative_eq!(result.coverage_ratio, 2.0 / 3.0);
        assert_relative_eq!(result.raw, 0.6 * 2.0 / 3.0 + 0.4 * 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(result.n_shared_fungi, 1);
        assert_eq!(result.fungi_counts.get("Epichloe"), Some(&1));
    }

    #[test]
    fn test_no_fungi() {
        let ids = vec!["c".to_string(), "zz".to_string()];
        let result = calculate_m5(&ids, &store());
        assert_eq!(result.raw, 0.0);
        assert!(result.fungi_counts.is_empty());
    }
}
