//! METRIC 4: DISEASE SUPPRESSION (FUNGAL & ANIMAL BIOCONTROL)
//!
//! Scores disease control provided by mycoparasitic fungi AND fungivorous animals.
//! Uses pairwise analysis to identify protective relationships
//! between vulnerable (disease-prone) and protective (biocontrol-hosting) plants.
//!
//! A plant's pathogens are the union of its observed pathogens, pathogenic
//! fungi and host-specific pathogenic fungi.

use super::trophic::{finalize_matches, matched_agents, MatchKind, TrophicMatch};
use crate::data::{InteractionProfileStore, Relation, TrophicNetworkIndex};
use crate::utils::count_shared_organisms;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const PATHOGEN_RELATIONS: &[Relation] = &[
    Relation::Pathogens,
    Relation::PathogenicFungi,
    Relation::HostSpecificPathogenicFungi,
];

const GENERAL_FUNGIVORE_WEIGHT: f64 = 0.2;
const PAIR_SCALE: f64 = 10.0;

/// Result of M4 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M4Result {
    /// Pathogen control score scaled by guild size
    pub raw: f64,
    /// Total pathogen control before normalization
    pub pathogen_control_raw: f64,
    /// Number of mechanisms detected
    pub n_mechanisms: usize,
    /// Individual matches pathogen → known mycoparasite
    pub specific_antagonist_matches: usize,
    /// Individual matches pathogen → known fungivore
    pub specific_fungivore_matches: usize,
    /// pathogen → plant count, all pathogen sources
    pub pathogen_counts: BTreeMap<String, usize>,
    /// host-specific pathogenic fungus → plant count
    pub host_specific_pathogens: BTreeMap<String, usize>,
    pub mycoparasite_counts: BTreeMap<String, usize>,
    pub fungivore_counts: BTreeMap<String, usize>,
    pub matches: Vec<TrophicMatch>,
}

/// Calculate M4: Disease Suppression (Fungal & Animal Biocontrol)
pub fn calculate_m4(
    plant_ids: &[String],
    profiles: &InteractionProfileStore,
    trophic: &TrophicNetworkIndex,
) -> M4Result {
    let n_plants = plant_ids.len();

    let mycoparasites: Vec<BTreeSet<&str>> = plant_ids
        .iter()
        .map(|id| profiles.organisms_for(id, &[Relation::Mycoparasites]))
        .collect();
    let fungivores: Vec<BTreeSet<&str>> = plant_ids
        .iter()
        .map(|id| profiles.organisms_for(id, &[Relation::Fungivores]))
        .collect();

    let mut n_mechanisms = 0;
    let mut specific_antagonist_matches = 0;
    let mut specific_fungivore_matches = 0;
    let mut general_mycoparasites = 0;
    let mut general_fungivores = 0;
    let mut matches = Vec::new();

    // Pairwise analysis: vulnerable plant A vs protective plant B
    for (a, plant_a) in plant_ids.iter().enumerate() {
        let pathogens_a = profiles.organisms_for(plant_a, PATHOGEN_RELATIONS);
        if pathogens_a.is_empty() {
            continue;
        }

        for (b, plant_b) in plant_ids.iter().enumerate() {
            if a == b {
                continue;
            }

            for &pathogen in &pathogens_a {
                let known = trophic.antagonists_of(pathogen);

                // MECHANISM 1: Specific mycoparasite antagonists
                let before = matches.len();
                for antagonist in matched_agents(known, &mycoparasites[b]) {
                    matches.push(TrophicMatch {
                        pest: pathogen.to_string(),
                        antagonist: antagonist.to_string(),
                        host_plant: plant_b.clone(),
                        kind: MatchKind::Mycoparasite,
                    });
                }
                let found = matches.len() - before;
                if found > 0 {
                    specific_antagonist_matches += found;
                    n_mechanisms += 1;
                }

                // MECHANISM 2: Specific fungivores
                let before = matches.len();
                for fungivore in matched_agents(known, &fungivores[b]) {
                    matches.push(TrophicMatch {
                        pest: pathogen.to_string(),
                        antagonist: fungivore.to_string(),
                        host_plant: plant_b.clone(),
                        kind: MatchKind::Fungivore,
                    });
                }
                let found = matches.len() - before;
                if found > 0 {
                    specific_fungivore_matches += found;
                    n_mechanisms += 1;
                }
            }

            // MECHANISM 3: General mycoparasites (primary mechanism)
            if !mycoparasites[b].is_empty() {
                general_mycoparasites += mycoparasites[b].len();
                n_mechanisms += 1;
            }

            // MECHANISM 4: General fungivores eating pathogens
            general_fungivores += fungivores[b].len();
        }
    }

    let pathogen_control_raw = (specific_antagonist_matches
        + specific_fungivore_matches
        + general_mycoparasites) as f64
        + general_fungivores as f64 * GENERAL_FUNGIVORE_WEIGHT;

    // Normalize by guild size
    let max_pairs = n_plants * n_plants.saturating_sub(1);
    let raw = if max_pairs > 0 {
        pathogen_control_raw / max_pairs as f64 * PAIR_SCALE
    } else {
        0.0
    };

    let counts = |relations: &[Relation]| -> BTreeMap<String, usize> {
        count_shared_organisms(profiles, plant_ids, relations).into_iter().collect()
    };

    M4Result {
        raw,
        pathogen_control_raw,
        n_mechanisms,
        specific_antagonist_matches,
        specific_fungivore_matches,
        pathogen_counts: counts(PATHOGEN_RELATIONS),
        host_specific_pathogens: counts(&[Relation::HostSpecificPathogenicFungi]),
        mycoparasite_counts: counts(&[Relation::Mycoparasites]),
        fungivore_counts: counts(&[Relation::Fungivores]),
        matches: finalize_matches(matches),
    }
}
