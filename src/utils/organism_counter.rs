//! Shared Organism Counter Utility
//!
//! Counts how many plants in a guild share each organism (pollinator, fungus, etc.).
//! Used by P3 (Beneficial Fungi) and P6 (Pollinator Support) for network analysis.

use crate::data::{InteractionProfileStore, Relation};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Count organisms shared across plants in a guild
///
/// For each plant the requested relation sets are unioned, so an organism
/// listed under two relations of the same plant counts once for that plant.
/// Every count lies in `[1, guild size]`.
///
/// Returns a map of organism name → plant count
pub fn count_shared_organisms(
    profiles: &InteractionProfileStore,
    plant_ids: &[String],
    relations: &[Relation],
) -> FxHashMap<String, usize> {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();

    for plant_id in plant_ids {
        // Most plants have few organisms per relation
        let mut plant_organisms: SmallVec<[&str; 16]> = relations
            .iter()
            .flat_map(|&rel| profiles.relation_sets(plant_id, rel))
            .flat_map(|set| set.iter().map(String::as_str))
            .filter(|org| !org.trim().is_empty())
            .collect();

        plant_organisms.sort_unstable();
        plant_organisms.dedup();

        for org in plant_organisms {
            *counts.entry(org.to_string()).or_insert(0) += 1;
        }
    }

    counts
}

/// Number of plants with at least one organism in any of the relations
pub fn plants_with_any(
    profiles: &InteractionProfileStore,
    plant_ids: &[String],
    relations: &[Relation],
) -> usize {
    plant_ids
        .iter()
        .filter(|id| {
            relations
                .iter()
                .flat_map(|&rel| profiles.relation_sets(id, rel))
                .any(|set| !set.is_empty())
        })
        .count()
}
