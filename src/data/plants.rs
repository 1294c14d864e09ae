//! Plant catalog: one typed record per taxon

use super::tabular::{
    f64_values, f64_values_first_of, flag_values, read_table, require_columns, string_values,
};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Ecosystem service rating columns carried on each plant
pub const ECOSYSTEM_RATING_COLUMNS: &[&str] = &[
    "npp_rating",
    "decomposition_rating",
    "nutrient_cycling_rating",
    "nutrient_retention_rating",
    "nutrient_loss_rating",
    "carbon_storage_rating",
    "leaf_carbon_recalcitrant_rating",
    "erosion_protection_rating",
    "nitrogen_fixation_rating",
];

const REQUIRED_PLANT_COLS: &[&str] = &["wfo_taxon_id"];

/// Allowed deviation of C + S + R from 100
const CSR_SUM_TOLERANCE: f64 = 1.0;

/// Grime CSR strategy percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CsrProfile {
    pub c: f64,
    pub s: f64,
    pub r: f64,
}

/// Temperature (°C) and precipitation (mm) tolerance range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClimateEnvelope {
    pub temp_min: f64,
    pub temp_max: f64,
    pub precip_min: f64,
    pub precip_max: f64,
}

impl ClimateEnvelope {
    /// Both ranges intersect with positive width
    pub fn overlaps(&self, other: &ClimateEnvelope) -> bool {
        let temp = self.temp_min.max(other.temp_min) < self.temp_max.min(other.temp_max);
        let precip =
            self.precip_min.max(other.precip_min) < self.precip_max.min(other.precip_max);
        temp && precip
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plant {
    pub id: String,
    pub scientific_name: String,
    pub family: String,
    pub genus: String,
    pub csr: Option<CsrProfile>,
    pub height_m: Option<f64>,
    pub growth_form: String,
    /// EIVE light indicator (1 = deep shade, 9 = full sun)
    pub light_pref: Option<f64>,
    pub envelope: Option<ClimateEnvelope>,
    /// Mean preferred soil pH
    pub ph_mean: Option<f64>,
    pub climate_tiers: Vec<String>,
    pub ecosystem_ratings: BTreeMap<String, String>,
}

impl Plant {
    /// Minimal record, mostly for tests and synthetic corpora
    pub fn new(id: &str, family: &str, genus: &str) -> Self {
        Self {
            id: id.to_string(),
            scientific_name: id.to_string(),
            family: family.to_string(),
            genus: genus.to_string(),
            csr: None,
            height_m: None,
            growth_form: String::new(),
            light_pref: None,
            envelope: None,
            ph_mean: None,
            climate_tiers: Vec::new(),
            ecosystem_ratings: BTreeMap::new(),
        }
    }

    pub fn in_tier(&self, tier: &str) -> bool {
        self.climate_tiers.iter().any(|t| t == tier)
    }
}

/// Read-only plant table indexed by taxon id
#[derive(Debug, Clone, Default)]
pub struct PlantCatalog {
    plants: Vec<Plant>,
    index: FxHashMap<String, usize>,
}

impl PlantCatalog {
    /// Build from records, rejecting duplicate ids and CSR triples that do not sum to 100
    pub fn from_plants(plants: Vec<Plant>) -> Result<Self> {
        let mut index = FxHashMap::default();
        for (idx, plant) in plants.iter().enumerate() {
            if index.insert(plant.id.clone(), idx).is_some() {
                anyhow::bail!("Duplicate plant id in catalog: {}", plant.id);
            }
            if let Some(csr) = plant.csr {
                let total = csr.c + csr.s + csr.r;
                if (total - 100.0).abs() > CSR_SUM_TOLERANCE {
                    anyhow::bail!(
                        "Plant {} has CSR values summing to {:.3} (expected 100)",
                        plant.id,
                        total
                    );
                }
            }
        }
        Ok(Self { plants, index })
    }

    /// Load the plant table (CSV or Parquet)
    ///
    /// `climate_tiers` names the boolean membership columns to read.
    pub fn load(path: &Path, climate_tiers: &[String]) -> Result<Self> {
        let df = read_table(path)?;
        require_columns(&df, REQUIRED_PLANT_COLS, "plants")?;

        let ids = string_values(&df, "wfo_taxon_id");
        let names = string_values(&df, "wfo_scientific_name");
        let families = string_values(&df, "family");
        let genera = string_values(&df, "genus");
        let c_vals = f64_values(&df, "C");
        let s_vals = f64_values(&df, "S");
        let r_vals = f64_values(&df, "R");
        let heights = f64_values(&df, "height_m");
        let forms = string_values(&df, "try_growth_form");
        let light = f64_values_first_of(
            &df,
            &["light_pref", "EIVEres-L_complete", "EIVEres-L"],
        );
        let temp_min = f64_values(&df, "temp_min");
        let temp_max = f64_values(&df, "temp_max");
        let precip_min = f64_values(&df, "precip_min");
        let precip_max = f64_values(&df, "precip_max");
        let ph = f64_values_first_of(&df, &["pH_mean", "ph_mean"]);
        let tier_flags: Vec<(String, Vec<bool>)> = climate_tiers
            .iter()
            .map(|tier| (tier.clone(), flag_values(&df, tier)))
            .collect();
        let ratings: Vec<(&str, Vec<Option<String>>)> = ECOSYSTEM_RATING_COLUMNS
            .iter()
            .map(|col| (*col, string_values(&df, col)))
            .collect();

        let mut plants = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for row in 0..df.height() {
            let Some(id) = ids[row].clone() else {
                skipped += 1;
                continue;
            };

            let csr = match (c_vals[row], s_vals[row], r_vals[row]) {
                (Some(c), Some(s), Some(r)) => Some(CsrProfile { c, s, r }),
                _ => None,
            };
            let envelope = match (temp_min[row], temp_max[row], precip_min[row], precip_max[row]) {
                (Some(temp_min), Some(temp_max), Some(precip_min), Some(precip_max)) => {
                    Some(ClimateEnvelope { temp_min, temp_max, precip_min, precip_max })
                }
                _ => None,
            };

            plants.push(Plant {
                scientific_name: names[row].clone().unwrap_or_else(|| id.clone()),
                family: families[row].clone().unwrap_or_default(),
                genus: genera[row].clone().unwrap_or_default(),
                csr,
                height_m: heights[row],
                growth_form: forms[row].clone().unwrap_or_default(),
                light_pref: light[row],
                envelope,
                ph_mean: ph[row],
                climate_tiers: tier_flags
                    .iter()
                    .filter(|(_, flags)| flags[row])
                    .map(|(tier, _)| tier.clone())
                    .collect(),
                ecosystem_ratings: ratings
                    .iter()
                    .filter_map(|(col, values)| {
                        values[row].clone().map(|v| (col.to_string(), v))
                    })
                    .collect(),
                id,
            });
        }

        if skipped > 0 {
            debug!(skipped, "plant rows without an id were skipped");
        }

        let catalog = Self::from_plants(plants)
            .with_context(|| format!("Invalid plant table: {:?}", path))?;
        info!(plants = catalog.len(), "plant catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Plant> {
        self.index.get(id).map(|&idx| &self.plants[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plant> {
        self.plants.iter()
    }

    /// Plants flagged for a climate tier, sorted by id
    pub fn tier_members(&self, tier: &str) -> Vec<&Plant> {
        let mut members: Vec<&Plant> = self.plants.iter().filter(|p| p.in_tier(tier)).collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_csr(id: &str, c: f64, s: f64, r: f64) -> Plant {
        let mut plant = Plant::new(id, "Rosaceae", "Malus");
        plant.csr = Some(CsrProfile { c, s, r });
        plant
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let plants = vec![Plant::new("a", "F", "G"), Plant::new("a", "F", "G")];
        assert!(PlantCatalog::from_plants(plants).is_err());
    }

    #[test]
    fn test_csr_sum_checked() {
        assert!(PlantCatalog::from_plants(vec![with_csr("a", 40.0, 30.0, 30.5)]).is_ok());
        assert!(PlantCatalog::from_plants(vec![with_csr("a", 50.0, 30.0, 30.0)]).is_err());
    }

    #[test]
    fn test_envelope_overlap_is_strict() {
        let a = ClimateEnvelope { temp_min: 0.0, temp_max: 10.0, precip_min: 100.0, precip_max: 500.0 };
        let b = ClimateEnvelope { temp_min: 5.0, temp_max: 20.0, precip_min: 400.0, precip_max: 900.0 };
        let touching = ClimateEnvelope { temp_min: 10.0, temp_max: 20.0, precip_min: 100.0, precip_max: 500.0 };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&touching));
    }

    #[test]
    fn test_tier_members_sorted() {
        let mut b = Plant::new("b", "F", "G");
        b.climate_tiers = vec!["tier_1_tropical".into()];
        let mut a = Plant::new("a", "F", "G");
        a.climate_tiers = vec!["tier_1_tropical".into(), "tier_6_arid".into()];
        let catalog = PlantCatalog::from_plants(vec![b, a]).unwrap();
        let ids: Vec<&str> = catalog.tier_members("tier_1_tropical").iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(catalog.tier_members("tier_6_arid").len(), 1);
    }
}
