//! Data Loading and Management
//!
//! Loads the plant table, interaction profiles, trophic lookup tables and the
//! phylogeny once with Polars, converting everything into typed, immutable
//! records. Scoring never touches a DataFrame.

pub mod plants;
pub mod profiles;
pub mod tabular;
pub mod trophic;

pub use plants::{ClimateEnvelope, CsrProfile, Plant, PlantCatalog, ECOSYSTEM_RATING_COLUMNS};
pub use profiles::{
    FungalGuildProfile, InteractionProfile, InteractionProfileStore, OrganismSet, Relation,
};
pub use trophic::{LookupTable, TrophicNetworkIndex};

use crate::config::EngineConfig;
use crate::phylo::PhylogeneticDistanceIndex;
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::info;

/// All reference data needed to score guilds
///
/// Built once at startup and shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub plants: PlantCatalog,
    pub profiles: InteractionProfileStore,
    pub trophic: TrophicNetworkIndex,
    pub phylo: PhylogeneticDistanceIndex,
}

impl ReferenceData {
    pub fn new(
        plants: PlantCatalog,
        profiles: InteractionProfileStore,
        trophic: TrophicNetworkIndex,
        phylo: PhylogeneticDistanceIndex,
    ) -> Self {
        Self {
            plants,
            profiles,
            trophic,
            phylo,
        }
    }

    /// Load every table named by the config
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let start = Instant::now();
        let files = &config.files;
        info!(data_dir = %config.data_dir.display(), "loading reference data");

        let plants = PlantCatalog::load(&config.data_path(&files.plants), &config.climate_tiers)
            .context("Failed to load plant table")?;
        let profiles = InteractionProfileStore::load(
            &config.data_path(&files.organism_profiles),
            &config.data_path(&files.fungal_profiles),
        )
        .context("Failed to load interaction profiles")?;
        let trophic = TrophicNetworkIndex::load(
            &config.data_path(&files.herbivore_predators),
            &config.data_path(&files.insect_parasites),
            &config.data_path(&files.pathogen_antagonists),
        )
        .context("Failed to load trophic network")?;
        let phylo = PhylogeneticDistanceIndex::load(
            &config.data_path(&files.tree),
            &config.data_path(&files.tip_mapping),
        )?;

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "reference data loaded");
        Ok(Self::new(plants, profiles, trophic, phylo))
    }
}
