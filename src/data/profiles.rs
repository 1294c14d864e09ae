//! Per-plant organism and fungal guild profiles
//!
//! Profiles are sets of organism names keyed by relation. A plant without a
//! profile row behaves exactly like a plant whose sets are all empty.

use super::tabular::{count_values, list_values, read_table, require_columns, string_values};
use anyhow::Result;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type OrganismSet = BTreeSet<String>;

/// Column prefix for predator relation columns (`predators_hasHost`, ...)
const PREDATOR_PREFIX: &str = "predators_";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionProfile {
    pub pollinators: OrganismSet,
    pub flower_visitors: OrganismSet,
    pub herbivores: OrganismSet,
    pub pathogens: OrganismSet,
    pub fungivores: OrganismSet,
    /// relation name (e.g. `hasHost`) → predators observed under it
    pub predators_by_relation: BTreeMap<String, OrganismSet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FungalGuildProfile {
    pub pathogenic: OrganismSet,
    pub pathogenic_host_specific: OrganismSet,
    pub amf: OrganismSet,
    pub emf: OrganismSet,
    pub mycoparasitic: OrganismSet,
    pub entomopathogenic: OrganismSet,
    pub endophytic: OrganismSet,
    pub saprotrophic: OrganismSet,
    /// Number of genera sourced from FungalTraits
    pub fungaltraits_genera: u32,
    /// Number of genera sourced from FUNGuild
    pub funguild_genera: u32,
}

impl InteractionProfile {
    fn merge(&mut self, other: InteractionProfile) {
        self.pollinators.extend(other.pollinators);
        self.flower_visitors.extend(other.flower_visitors);
        self.herbivores.extend(other.herbivores);
        self.pathogens.extend(other.pathogens);
        self.fungivores.extend(other.fungivores);
        for (relation, set) in other.predators_by_relation {
            self.predators_by_relation.entry(relation).or_default().extend(set);
        }
    }
}

impl FungalGuildProfile {
    fn merge(&mut self, other: FungalGuildProfile) {
        self.pathogenic.extend(other.pathogenic);
        self.pathogenic_host_specific.extend(other.pathogenic_host_specific);
        self.amf.extend(other.amf);
        self.emf.extend(other.emf);
        self.mycoparasitic.extend(other.mycoparasitic);
        self.entomopathogenic.extend(other.entomopathogenic);
        self.endophytic.extend(other.endophytic);
        self.saprotrophic.extend(other.saprotrophic);
        self.fungaltraits_genera = self.fungaltraits_genera.max(other.fungaltraits_genera);
        self.funguild_genera = self.funguild_genera.max(other.funguild_genera);
    }
}

/// Relation types that can be queried across both profile tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    Pollinators,
    FlowerVisitors,
    Herbivores,
    Pathogens,
    Fungivores,
    /// Union of every predator relation
    Predators,
    PathogenicFungi,
    HostSpecificPathogenicFungi,
    Amf,
    Emf,
    Mycoparasites,
    EntomopathogenicFungi,
    EndophyticFungi,
    SaprotrophicFungi,
}

impl Relation {
    pub const ALL: [Relation; 14] = [
        Relation::Pollinators,
        Relation::FlowerVisitors,
        Relation::Herbivores,
        Relation::Pathogens,
        Relation::Fungivores,
        Relation::Predators,
        Relation::PathogenicFungi,
        Relation::HostSpecificPathogenicFungi,
        Relation::Amf,
        Relation::Emf,
        Relation::Mycoparasites,
        Relation::EntomopathogenicFungi,
        Relation::EndophyticFungi,
        Relation::SaprotrophicFungi,
    ];

    /// Column name in the source tables
    pub fn name(self) -> &'static str {
        match self {
            Relation::Pollinators => "pollinators",
            Relation::FlowerVisitors => "flower_visitors",
            Relation::Herbivores => "herbivores",
            Relation::Pathogens => "pathogens",
            Relation::Fungivores => "fungivores_eats",
            Relation::Predators => "predators",
            Relation::PathogenicFungi => "pathogenic_fungi",
            Relation::HostSpecificPathogenicFungi => "pathogenic_fungi_host_specific",
            Relation::Amf => "amf_fungi",
            Relation::Emf => "emf_fungi",
            Relation::Mycoparasites => "mycoparasite_fungi",
            Relation::EntomopathogenicFungi => "entomopathogenic_fungi",
            Relation::EndophyticFungi => "endophytic_fungi",
            Relation::SaprotrophicFungi => "saprotrophic_fungi",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Relation::ALL
            .iter()
            .copied()
            .find(|r| r.name() == s)
            .ok_or_else(|| format!("unknown relation '{s}'"))
    }
}

/// Read-only store of both profile tables
#[derive(Debug, Clone, Default)]
pub struct InteractionProfileStore {
    organisms: FxHashMap<String, InteractionProfile>,
    fungi: FxHashMap<String, FungalGuildProfile>,
    empty_organisms: InteractionProfile,
    empty_fungi: FungalGuildProfile,
}

impl InteractionProfileStore {
    pub fn new(
        organisms: FxHashMap<String, InteractionProfile>,
        fungi: FxHashMap<String, FungalGuildProfile>,
    ) -> Self {
        Self {
            organisms,
            fungi,
            ..Default::default()
        }
    }

    pub fn load(organisms_path: &Path, fungi_path: &Path) -> Result<Self> {
        let organisms = load_organism_profiles(organisms_path)?;
        let fungi = load_fungal_profiles(fungi_path)?;
        info!(
            organism_profiles = organisms.len(),
            fungal_profiles = fungi.len(),
            "interaction profiles loaded"
        );
        Ok(Self::new(organisms, fungi))
    }

    /// Organism profile, or an empty one when the plant has no row
    pub fn organisms(&self, plant_id: &str) -> &InteractionProfile {
        self.organisms.get(plant_id).unwrap_or(&self.empty_organisms)
    }

    /// Fungal profile, or an empty one when the plant has no row
    pub fn fungi(&self, plant_id: &str) -> &FungalGuildProfile {
        self.fungi.get(plant_id).unwrap_or(&self.empty_fungi)
    }

    pub fn has_organism_profile(&self, plant_id: &str) -> bool {
        self.organisms.contains_key(plant_id)
    }

    pub fn has_fungal_profile(&self, plant_id: &str) -> bool {
        self.fungi.contains_key(plant_id)
    }

    /// Sets backing one relation for a plant
    ///
    /// `Predators` expands to one set per predator relation.
    pub fn relation_sets(&self, plant_id: &str, relation: Relation) -> SmallVec<[&OrganismSet; 4]> {
        let org = self.organisms(plant_id);
        let fungi = self.fungi(plant_id);
        let mut sets = SmallVec::new();
        match relation {
            Relation::Pollinators => sets.push(&org.pollinators),
            Relation::FlowerVisitors => sets.push(&org.flower_visitors),
            Relation::Herbivores => sets.push(&org.herbivores),
            Relation::Pathogens => sets.push(&org.pathogens),
            Relation::Fungivores => sets.push(&org.fungivores),
            Relation::Predators => sets.extend(org.predators_by_relation.values()),
            Relation::PathogenicFungi => sets.push(&fungi.pathogenic),
            Relation::HostSpecificPathogenicFungi => sets.push(&fungi.pathogenic_host_specific),
            Relation::Amf => sets.push(&fungi.amf),
            Relation::Emf => sets.push(&fungi.emf),
            Relation::Mycoparasites => sets.push(&fungi.mycoparasitic),
            Relation::EntomopathogenicFungi => sets.push(&fungi.entomopathogenic),
            Relation::EndophyticFungi => sets.push(&fungi.endophytic),
            Relation::SaprotrophicFungi => sets.push(&fungi.saprotrophic),
        }
        sets
    }

    /// Union of several relations for one plant
    pub fn organisms_for<'a>(&'a self, plant_id: &str, relations: &[Relation]) -> BTreeSet<&'a str> {
        relations
            .iter()
            .flat_map(|&rel| self.relation_sets(plant_id, rel))
            .flat_map(|set| set.iter().map(String::as_str))
            .collect()
    }
}

fn to_set(values: Vec<String>) -> OrganismSet {
    values.into_iter().collect()
}

fn load_organism_profiles(path: &Path) -> Result<FxHashMap<String, InteractionProfile>> {
    let df = read_table(path)?;
    require_columns(&df, &["plant_wfo_id"], "organism profiles")?;

    let ids = string_values(&df, "plant_wfo_id");
    let mut pollinators = list_values(&df, Relation::Pollinators.name());
    let mut visitors = list_values(&df, Relation::FlowerVisitors.name());
    let mut herbivores = list_values(&df, Relation::Herbivores.name());
    let mut pathogens = list_values(&df, Relation::Pathogens.name());
    let mut fungivores = list_values(&df, Relation::Fungivores.name());

    let predator_columns: Vec<(String, Vec<Vec<String>>)> = df
        .get_column_names()
        .into_iter()
        .filter_map(|name| {
            let name = name.to_string();
            name.strip_prefix(PREDATOR_PREFIX)
                .filter(|rel| !rel.is_empty())
                .map(|rel| (rel.to_string(), list_values(&df, &name)))
        })
        .collect();

    let mut profiles: FxHashMap<String, InteractionProfile> = FxHashMap::default();
    for (row, id) in ids.into_iter().enumerate() {
        let Some(id) = id else { continue };
        let profile = InteractionProfile {
            pollinators: to_set(std::mem::take(&mut pollinators[row])),
            flower_visitors: to_set(std::mem::take(&mut visitors[row])),
            herbivores: to_set(std::mem::take(&mut herbivores[row])),
            pathogens: to_set(std::mem::take(&mut pathogens[row])),
            fungivores: to_set(std::mem::take(&mut fungivores[row])),
            predators_by_relation: predator_columns
                .iter()
                .map(|(rel, rows)| (rel.clone(), rows[row].iter().cloned().collect()))
                .filter(|(_, set): &(String, OrganismSet)| !set.is_empty())
                .collect(),
        };
        profiles.entry(id).or_default().merge(profile);
    }

    Ok(profiles)
}

fn load_fungal_profiles(path: &Path) -> Result<FxHashMap<String, FungalGuildProfile>> {
    let df = read_table(path)?;
    require_columns(&df, &["plant_wfo_id"], "fungal profiles")?;

    let ids = string_values(&df, "plant_wfo_id");
    let mut columns: Vec<Vec<Vec<String>>> = [
        Relation::PathogenicFungi,
        Relation::HostSpecificPathogenicFungi,
        Relation::Amf,
        Relation::Emf,
        Relation::Mycoparasites,
        Relation::EntomopathogenicFungi,
        Relation::EndophyticFungi,
        Relation::SaprotrophicFungi,
    ]
    .iter()
    .map(|rel| list_values(&df, rel.name()))
    .collect();
    let fungaltraits = count_values(&df, "fungaltraits_genera");
    let funguild = count_values(&df, "funguild_genera");

    let mut profiles: FxHashMap<String, FungalGuildProfile> = FxHashMap::default();
    for (row, id) in ids.into_iter().enumerate() {
        let Some(id) = id else { continue };
        let mut take = |col: usize| to_set(std::mem::take(&mut columns[col][row]));
        let profile = FungalGuildProfile {
            pathogenic: take(0),
            pathogenic_host_specific: take(1),
            amf: take(2),
            emf: take(3),
            mycoparasitic: take(4),
            entomopathogenic: take(5),
            endophytic: take(6),
            saprotrophic: take(7),
            fungaltraits_genera: fungaltraits[row],
            funguild_genera: funguild[row],
        };
        profiles.entry(id).or_default().merge(profile);
    }

    Ok(profiles)
}
