//! METRIC 3: BENEFICIAL INSECT NETWORKS (BIOCONTROL)
//!
//! Scores natural pest control provided by predators and entomopathogenic
//! fungi. Uses pairwise analysis to identify protective relationships
//! between vulnerable and protective plants.
//!
//! Mechanisms per ordered pair (A vulnerable, B protective):
//!   1. Specific predators: herbivore of A → known predator hosted by B (1.0)
//!   2. Specific entomopathogens: herbivore of A → known fungus on B (1.0)
//!   3. General entomopathogens: every entomopathogenic fungus on B (0.2)

use super::trophic::{finalize_matches, matched_agents, MatchKind, TrophicMatch};
use crate::data::{InteractionProfileStore, Relation, TrophicNetworkIndex};
use crate::utils::count_shared_organisms;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Relations that make a plant a predator host
const PREDATOR_RELATIONS: &[Relation] = &[Relation::FlowerVisitors, Relation::Predators];

const GENERAL_FUNGUS_WEIGHT: f64 = 0.2;
const PAIR_SCALE: f64 = 20.0;

/// Result of M3 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M3Result {
    /// Biocontrol score scaled by guild size
    pub raw: f64,
    /// Total biocontrol before normalization
    pub biocontrol_raw: f64,
    /// Number of (pair, herbivore) combinations with a specific match
    pub n_mechanisms: usize,
    /// Individual predator matches (herbivore → known predator)
    pub specific_predator_matches: usize,
    /// Individual fungus matches (herbivore → known fungus)
    pub specific_fungi_matches: usize,
    /// Entomopathogenic fungi counted by the general mechanism
    pub general_entomo_fungi: usize,
    /// predator → number of guild plants hosting it (known predators only)
    pub predator_counts: BTreeMap<String, usize>,
    /// fungus → number of guild plants hosting it (known parasites only)
    pub entomo_fungi_counts: BTreeMap<String, usize>,
    pub matches: Vec<TrophicMatch>,
}

/// Calculate M3: Beneficial Insect Networks (Biocontrol)
pub fn calculate_m3(
    plant_ids: &[String],
    profiles: &InteractionProfileStore,
    trophic: &TrophicNetworkIndex,
) -> M3Result {
    let n_plants = plant_ids.len();

    // Protective side of every plant, resolved once
    let predators: Vec<BTreeSet<&str>> = plant_ids
        .iter()
        .map(|id| profiles.organisms_for(id, PREDATOR_RELATIONS))
        .collect();
    let entomo_fungi: Vec<BTreeSet<&str>> = plant_ids
        .iter()
        .map(|id| profiles.organisms_for(id, &[Relation::EntomopathogenicFungi]))
        .collect();

    let mut n_mechanisms = 0;
    let mut specific_predator_matches = 0;
    let mut specific_fungi_matches = 0;
    let mut general_entomo_fungi = 0;
    let mut matches = Vec::new();

    // Pairwise analysis: vulnerable plant A vs protective plant B
    for (a, plant_a) in plant_ids.iter().enumerate() {
        let herbivores_a = &profiles.organisms(plant_a).herbivores;
        if herbivores_a.is_empty() {
            continue;
        }

        for (b, plant_b) in plant_ids.iter().enumerate() {
            if a == b {
                continue;
            }

            // MECHANISM 1: Specific animal predators
            for herbivore in herbivores_a {
                let before = matches.len();
                for predator in matched_agents(trophic.predators_of(herbivore), &predators[b]) {
                    matches.push(TrophicMatch {
                        pest: herbivore.clone(),
                        antagonist: predator.to_string(),
                        host_plant: plant_b.clone(),
                        kind: MatchKind::Predator,
                    });
                }
                let found = matches.len() - before;
                if found > 0 {
                    specific_predator_matches += found;
                    n_mechanisms += 1;
                }
            }

            if entomo_fungi[b].is_empty() {
                continue;
            }

            // MECHANISM 2: Specific entomopathogenic fungi
            for herbivore in herbivores_a {
                let before = matches.len();
                for fungus in matched_agents(trophic.parasites_of(herbivore), &entomo_fungi[b]) {
                    matches.push(TrophicMatch {
                        pest: herbivore.clone(),
                        antagonist: fungus.to_string(),
                        host_plant: plant_b.clone(),
                        kind: MatchKind::EntomopathogenicFungus,
                    });
                }
                let found = matches.len() - before;
                if found > 0 {
                    specific_fungi_matches += found;
                    n_mechanisms += 1;
                }
            }

            // MECHANISM 3: General entomopathogenic fungi
            general_entomo_fungi += entomo_fungi[b].len();
        }
    }

    let biocontrol_raw = (specific_predator_matches + specific_fungi_matches) as f64
        + general_entomo_fungi as f64 * GENERAL_FUNGUS_WEIGHT;

    // Normalize by guild size
    let max_pairs = n_plants * n_plants.saturating_sub(1);
    let raw = if max_pairs > 0 {
        biocontrol_raw / max_pairs as f64 * PAIR_SCALE
    } else {
        0.0
    };

    // Agent network: how many plants host each known agent
    let predator_counts = count_shared_organisms(profiles, plant_ids, PREDATOR_RELATIONS)
        .into_iter()
        .filter(|(agent, _)| trophic.is_known_predator(agent))
        .collect();
    let entomo_fungi_counts =
        count_shared_organisms(profiles, plant_ids, &[Relation::EntomopathogenicFungi])
            .into_iter()
            .filter(|(fungus, _)| trophic.is_known_parasite(fungus))
            .collect();

    M3Result {
        raw,
        biocontrol_raw,
        n_mechanisms,
        specific_predator_matches,
        specific_fungi_matches,
        general_entomo_fungi,
        predator_counts,
        entomo_fungi_counts,
        matches: finalize_matches(matches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FungalGuildProfile, InteractionProfile, LookupTable, OrganismSet};
    use approx::assert_relative_eq;
    use rustc_hash::FxHashMap;

    fn set(items: &[&str]) -> OrganismSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (InteractionProfileStore, TrophicNetworkIndex) {
        let mut organisms = FxHashMap::default();
        organisms.insert(
            "a".to_string(),
            InteractionProfile { herbivores: set(&["aphid"]), ..Default::default() },
        );
        let mut protective = InteractionProfile {
            flower_visitors: set(&["hoverfly"]),
            ..Default::default()
        };
        protective.predators_by_relation.insert("hasHost".into(), set(&["ladybird"]));
        organisms.insert("b".to_string(), protective);

        let mut fungi = FxHashMap::default();
        fungi.insert(
            "b".to_string(),
            FungalGuildProfile {
                entomopathogenic: set(&["Beauveria", "Metarhizium"]),
                ..Default::default()
            },
        );

        let mut predators = LookupTable::default();
        predators.insert("aphid".into(), set(&["ladybird", "hoverfly", "lacewing"]));
        let mut parasites = LookupTable::default();
        parasites.insert("aphid".into(), set(&["Beauveria"]));

        (
            InteractionProfileStore::new(organisms, fungi),
            TrophicNetworkIndex::new(predators, parasites, LookupTable::default()),
        )
    }

    #[test]
    fn test_specific_and_general_mechanisms() {
        let (profiles, trophic) = fixture();
        let result = calculate_m3(&ids(&["a", "b"]), &profiles, &trophic);

        // 2 predators + 1 fungus + 0.2 × 2 general fungi
        assert_eq!(result.specific_predator_matches, 2);
        assert_eq!(result.specific_fungi_matches, 1);
        assert_eq!(result.general_entomo_fungi, 2);
        assert_eq!(result.n_mechanisms, 2);
        assert_relative_eq!(result.biocontrol_raw, 3.4, epsilon = 1e-12);
        assert_relative_eq!(result.raw, 3.4 / 2.0 * 20.0, epsilon = 1e-12);
        assert_eq!(result.matches.len(), 3);
        assert!(result.matches.iter().all(|m| m.host_plant == "b" && m.pest == "aphid"));
    }

    #[test]
    fn test_agent_counts_only_known_agents() {
        let (profiles, trophic) = fixture();
        let result = calculate_m3(&ids(&["a", "b"]), &profiles, &trophic);
        assert_eq!(result.predator_counts.get("ladybird"), Some(&1));
        assert_eq!(result.predator_counts.get("hoverfly"), Some(&1));
        assert_eq!(result.entomo_fungi_counts.get("Beauveria"), Some(&1));
        assert!(!result.entomo_fungi_counts.contains_key("Metarhizium"));
    }

    #[test]
    fn test_self_pairs_and_small_guilds() {
        let (profiles, trophic) = fixture();
        // b hosts predators but has no herbivores; b alone gives nothing
        assert_eq!(calculate_m3(&ids(&["b"]), &profiles, &trophic).raw, 0.0);
        // Unknown plant without profile counts in the denominator only
        let result = calculate_m3(&ids(&["a", "b", "zz"]), &profiles, &trophic);
        assert_relative_eq!(result.raw, 3.4 / 6.0 * 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_order_independent() {
        let (profiles, trophic) = fixture();
        let forward = calculate_m3(&ids(&["a", "b", "zz"]), &profiles, &trophic);
        let reverse = calculate_m3(&ids(&["zz", "b", "a"]), &profiles, &trophic);
        assert_eq!(forward.raw.to_bits(), reverse.raw.to_bits());
        assert_eq!(forward.matches, reverse.matches);
    }
}
