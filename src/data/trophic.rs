//! Global trophic lookup tables
//!
//! - herbivore → predators
//! - herbivore → entomopathogenic fungi
//! - pathogen → antagonists (mycoparasites and fungivores)

use super::profiles::OrganismSet;
use super::tabular::{read_table, require_columns, split_pipe, string_values};
use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use tracing::{info, warn};

pub type LookupTable = FxHashMap<String, OrganismSet>;

#[derive(Debug, Clone, Default)]
pub struct TrophicNetworkIndex {
    herbivore_predators: LookupTable,
    insect_parasites: LookupTable,
    pathogen_antagonists: LookupTable,
    /// Every organism that appears as a value in each table
    known_predators: FxHashSet<String>,
    known_parasites: FxHashSet<String>,
    known_antagonists: FxHashSet<String>,
}

impl TrophicNetworkIndex {
    pub fn new(
        herbivore_predators: LookupTable,
        insect_parasites: LookupTable,
        pathogen_antagonists: LookupTable,
    ) -> Self {
        Self {
            known_predators: agents(&herbivore_predators),
            known_parasites: agents(&insect_parasites),
            known_antagonists: agents(&pathogen_antagonists),
            herbivore_predators,
            insect_parasites,
            pathogen_antagonists,
        }
    }

    /// Load the three tables; a missing insect-parasite file is tolerated
    pub fn load(
        herbivore_predators_path: &Path,
        insect_parasites_path: &Path,
        pathogen_antagonists_path: &Path,
    ) -> Result<Self> {
        let herbivore_predators =
            load_lookup_table(herbivore_predators_path, "herbivore", "predators")?;

        let insect_parasites = if insect_parasites_path.exists() {
            load_lookup_table(insect_parasites_path, "herbivore", "entomopathogenic_fungi")?
        } else {
            warn!(
                path = %insect_parasites_path.display(),
                "insect parasite table not found; entomopathogen matching disabled"
            );
            LookupTable::default()
        };

        let pathogen_antagonists =
            load_lookup_table(pathogen_antagonists_path, "pathogen", "antagonists")?;

        info!(
            herbivore_predators = herbivore_predators.len(),
            insect_parasites = insect_parasites.len(),
            pathogen_antagonists = pathogen_antagonists.len(),
            "trophic network loaded"
        );

        Ok(Self::new(herbivore_predators, insect_parasites, pathogen_antagonists))
    }

    pub fn predators_of(&self, herbivore: &str) -> Option<&OrganismSet> {
        self.herbivore_predators.get(herbivore)
    }

    pub fn parasites_of(&self, herbivore: &str) -> Option<&OrganismSet> {
        self.insect_parasites.get(herbivore)
    }

    pub fn antagonists_of(&self, pathogen: &str) -> Option<&OrganismSet> {
        self.pathogen_antagonists.get(pathogen)
    }

    /// Listed as a predator of at least one herbivore
    pub fn is_known_predator(&self, organism: &str) -> bool {
        self.known_predators.contains(organism)
    }

    pub fn is_known_parasite(&self, fungus: &str) -> bool {
        self.known_parasites.contains(fungus)
    }

    pub fn is_known_antagonist(&self, organism: &str) -> bool {
        self.known_antagonists.contains(organism)
    }

    pub fn herbivore_predators(&self) -> &LookupTable {
        &self.herbivore_predators
    }

    pub fn insect_parasites(&self) -> &LookupTable {
        &self.insect_parasites
    }

    pub fn pathogen_antagonists(&self) -> &LookupTable {
        &self.pathogen_antagonists
    }
}

fn agents(table: &LookupTable) -> FxHashSet<String> {
    table.values().flatten().cloned().collect()
}

/// Load lookup table: key → pipe-separated values
///
/// Example: `herbivore_id → "predator1|predator2|predator3"`. Repeated keys
/// are merged; rows with no values are dropped.
fn load_lookup_table(path: &Path, key_col: &str, value_col: &str) -> Result<LookupTable> {
    let df = read_table(path)
        .with_context(|| format!("Failed to load lookup table: {:?}", path))?;
    require_columns(&df, &[key_col, value_col], "lookup table")
        .with_context(|| format!("Lookup table {:?}", path))?;

    let keys = string_values(&df, key_col);
    let values = string_values(&df, value_col);

    let mut map = LookupTable::default();
    for (key, value) in keys.into_iter().zip(values) {
        if let (Some(key), Some(value)) = (key, value) {
            let entries = split_pipe(&value);
            if !entries.is_empty() {
                map.entry(key).or_default().extend(entries);
            }
        }
    }

    Ok(map)
}
