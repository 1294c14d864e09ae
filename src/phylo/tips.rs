//! Taxon id → tree tip label mapping

use crate::data::tabular::{read_table, require_columns, string_values};
use anyhow::Result;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Maps plant taxon ids to tip labels; coverage is partial by design of the
/// upstream tree build, so lookups return `Option`.
#[derive(Debug, Clone, Default)]
pub struct TipMapping {
    map: FxHashMap<String, String>,
}

impl TipMapping {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load from a table with `wfo_taxon_id` and `tree_tip` columns
    ///
    /// Empty and `NA` tips are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        require_columns(&df, &["wfo_taxon_id", "tree_tip"], "tip mapping")?;
        let ids = string_values(&df, "wfo_taxon_id");
        let tips = string_values(&df, "tree_tip");

        let map = ids
            .into_iter()
            .zip(tips)
            .filter_map(|(id, tip)| Some((id?, tip?)))
            .collect();
        Ok(Self { map })
    }

    pub fn tip(&self, taxon_id: &str) -> Option<&str> {
        self.map.get(taxon_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
