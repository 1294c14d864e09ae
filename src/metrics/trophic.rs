//! Trophic matching shared by the biocontrol and disease-control metrics
//!
//! A match says: `pest` threatens some guild member, and `host_plant` (another
//! guild member) hosts `antagonist`, which the lookup tables list as a
//! predator, parasite or antagonist of that pest.

use crate::data::OrganismSet;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Herbivore eaten by a predator hosted in the guild
    Predator,
    /// Herbivore infected by an entomopathogenic fungus hosted in the guild
    EntomopathogenicFungus,
    /// Pathogen attacked by a mycoparasite hosted in the guild
    Mycoparasite,
    /// Pathogen eaten by a fungivore hosted in the guild
    Fungivore,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrophicMatch {
    pub pest: String,
    pub antagonist: String,
    pub host_plant: String,
    pub kind: MatchKind,
}

/// Known agents of one pest that are present on a protective plant
pub fn matched_agents<'a>(
    known: Option<&'a OrganismSet>,
    present: &'a BTreeSet<&'a str>,
) -> impl Iterator<Item = &'a str> + 'a {
    known
        .into_iter()
        .flat_map(|set| set.iter().map(String::as_str))
        .filter(move |agent| present.contains(agent))
}

/// Sort and dedupe match records
pub fn finalize_matches(mut matches: Vec<TrophicMatch>) -> Vec<TrophicMatch> {
    matches.sort_unstable();
    matches.dedup();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_agents_intersects() {
        let known: OrganismSet = ["ladybird", "lacewing", "wasp"].iter().map(|s| s.to_string()).collect();
        let present: BTreeSet<&str> = ["lacewing", "wasp", "bee"].into_iter().collect();
        let matched: Vec<&str> = matched_agents(Some(&known), &present).collect();
        assert_eq!(matched, vec!["lacewing", "wasp"]);
        assert_eq!(matched_agents(None, &present).count(), 0);
    }

    #[test]
    fn test_finalize_dedupes() {
        let m = TrophicMatch {
            pest: "aphid".into(),
            antagonist: "ladybird".into(),
            host_plant: "b".into(),
            kind: MatchKind::Predator,
        };
        let out = finalize_matches(vec![m.clone(), m.clone()]);
        assert_eq!(out, vec![m]);
    }
}
