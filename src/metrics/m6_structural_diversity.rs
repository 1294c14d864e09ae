//! METRIC 6: STRUCTURAL DIVERSITY (VERTICAL STRATIFICATION)
//!
//! Scores vertical stratification quality and growth form diversity.
//! Validates that height differences are compatible with light preferences.

use crate::data::Plant;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Height difference separating canopy layers (m)
const LAYER_GAP_M: f64 = 2.0;

/// Plant with height and light preference information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantHeight {
    pub plant_id: String,
    pub name: String,
    pub height_m: f64,
    pub light_pref: Option<f64>, // EIVE-L value (1-9)
}

/// Growth form group with plants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthFormGroup {
    pub form_name: String,
    pub plants: Vec<PlantHeight>,
    pub height_range: (f64, f64),
}

/// Result of M6 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M6Result {
    /// Combined stratification + form diversity (0-1 scale)
    pub raw: f64,
    /// Height range in meters
    pub height_range: f64,
    /// Number of unique growth forms
    pub n_forms: usize,
    /// Stratification quality (0-1)
    pub stratification_quality: f64,
    /// Form diversity score (0-1)
    pub form_diversity: f64,
    /// Growth form groups with plant details
    pub growth_form_groups: Vec<GrowthFormGroup>,
}

/// Calculate M6: Structural Diversity
pub fn calculate_m6(plants: &[&Plant]) -> M6Result {
    // Sort by height; ties by id keep the pair order canonical
    let mut with_height: Vec<(&Plant, f64)> = plants
        .iter()
        .filter_map(|p| p.height_m.map(|h| (*p, h)))
        .collect();
    with_height.sort_by(|(pa, ha), (pb, hb)| ha.total_cmp(hb).then_with(|| pa.id.cmp(&pb.id)));

    let mut valid_stratification = 0.0;
    let mut invalid_stratification = 0.0;

    // Analyze all tall-short pairs
    for (i, (short, short_height)) in with_height.iter().enumerate() {
        for (_, tall_height) in &with_height[i + 1..] {
            let height_diff = tall_height - short_height;

            // Only significant height differences (different canopy layers)
            if height_diff <= LAYER_GAP_M {
                continue;
            }

            match short.light_pref {
                // Missing data: neutral/flexible
                None => valid_stratification += height_diff * 0.5,
                // Shade-tolerant (EIVE-L 1-3): thrives under canopy
                Some(light) if light < 3.2 => valid_stratification += height_diff,
                // Sun-loving (EIVE-L 8-9): will be shaded out
                Some(light) if light > 7.47 => invalid_stratification += height_diff,
                // Flexible (EIVE-L 4-7): partial compatibility
                Some(_) => valid_stratification += height_diff * 0.6,
            }
        }
    }

    let total_height_diffs = valid_stratification + invalid_stratification;
    let stratification_quality = if total_height_diffs > 0.0 {
        valid_stratification / total_height_diffs
    } else {
        0.0 // No vertical diversity
    };

    // Form diversity over distinct growth forms; 6 forms max
    let unique_forms: BTreeSet<&str> = plants
        .iter()
        .map(|p| p.growth_form.as_str())
        .filter(|form| !form.is_empty())
        .collect();
    let n_forms = unique_forms.len();
    let form_diversity = if n_forms > 0 {
        ((n_forms - 1) as f64 / 5.0).min(1.0)
    } else {
        0.0
    };

    // Combined (70% light-validated height, 30% form)
    let raw = 0.7 * stratification_quality + 0.3 * form_diversity;

    let height_range = match (with_height.first(), with_height.last()) {
        (Some((_, lo)), Some((_, hi))) if with_height.len() >= 2 => hi - lo,
        _ => 0.0,
    };

    M6Result {
        raw,
        height_range,
        n_forms,
        stratification_quality,
        form_diversity,
        growth_form_groups: group_by_form(&with_height),
    }
}

/// Group plants with a height by growth form, lowest group first
fn group_by_form(with_height: &[(&Plant, f64)]) -> Vec<GrowthFormGroup> {
    let mut form_groups: BTreeMap<&str, Vec<PlantHeight>> = BTreeMap::new();
    for (plant, height) in with_height {
        if plant.growth_form.is_empty() {
            continue;
        }
        form_groups
            .entry(plant.growth_form.as_str())
            .or_default()
            .push(PlantHeight {
                plant_id: plant.id.clone(),
                name: plant.scientific_name.clone(),
                height_m: *height,
                light_pref: plant.light_pref,
            });
    }

    let mut groups: Vec<GrowthFormGroup> = form_groups
        .into_iter()
        .map(|(form_name, plants)| {
            // Plants arrive sorted by height
            let min_height = plants.first().map_or(0.0, |p| p.height_m);
            let max_height = plants.last().map_or(0.0, |p| p.height_m);
            GrowthFormGroup {
                form_name: form_name.to_string(),
                plants,
                height_range: (min_height, max_height),
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.height_range
            .0
            .total_cmp(&b.height_range.0)
            .then_with(|| a.form_name.cmp(&b.form_name))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plant(id: &str, height: Option<f64>, light: Option<f64>, form: &str) -> Plant {
        let mut p = Plant::new(id, "F", "G");
        p.height_m = height;
        p.light_pref = light;
        p.growth_form = form.to_string();
        p
    }

    #[test]
    fn test_stratification_quality() {
        // Shade-tolerant understory under a tree
        let tree = plant("t", Some(10.0), Some(7.0), "tree");
        let herb = plant("h", Some(1.0), Some(2.5), "herb");
        let result = calculate_m6(&[&tree, &herb]);
        assert_relative_eq!(result.stratification_quality, 1.0);
        assert_relative_eq!(result.form_diversity, 0.2);
        assert_relative_eq!(result.raw, 0.7 + 0.3 * 0.2, epsilon = 1e-12);
        assert_relative_eq!(result.height_range, 9.0);
    }

    #[test]
    fn test_light_rules() {
        let tree = plant("t", Some(10.0), None, "tree");
        let sunny = plant("s", Some(2.0), Some(8.0), "herb");
        let flexible = plant("f", Some(4.0), None, "shrub");
        // pairs: s→f d=2 (ignored), s→t d=8 invalid, f→t d=6 missing light → 3 valid
        let result = calculate_m6(&[&tree, &sunny, &flexible]);
        assert_relative_eq!(result.stratification_quality, 3.0 / 11.0, epsilon = 1e-12);
        assert_eq!(result.n_forms, 3);
        assert_eq!(result.growth_form_groups[0].form_name, "herb");
    }

    #[test]
    fn test_flexible_light_and_missing_height() {
        let tree = plant("t", Some(12.0), None, "tree");
        let mid = plant("m", Some(2.0), Some(5.0), "herb");
        let unknown = plant("u", None, Some(1.0), "herb");
        let result = calculate_m6(&[&unknown, &tree, &mid]);
        // Only m→t counts: 0.6 × 10 valid
        assert_relative_eq!(result.stratification_quality, 1.0);
        assert_eq!(result.n_forms, 2);
    }

    #[test]
    fn test_order_independent() {
        let a = plant("a", Some(3.0), Some(4.0), "shrub");
        let b = plant("b", Some(3.0), Some(8.5), "herb");
        let c = plant("c", Some(9.0), None, "tree");
        let forward = calculate_m6(&[&a, &b, &c]);
        let reverse = calculate_m6(&[&c, &b, &a]);
        assert_eq!(forward.raw.to_bits(), reverse.raw.to_bits());
        assert_eq!(forward.growth_form_groups, reverse.growth_form_groups);
    }

    #[test]
    fn test_form_diversity_capped() {
        let forms = ["tree", "shrub", "herb", "graminoid", "vine", "fern", "succulent", "moss"];
        let plants: Vec<Plant> = forms
            .iter()
            .enumerate()
            .map(|(i, form)| plant(&format!("p{i}"), None, None, form))
            .collect();
        let refs: Vec<&Plant> = plants.iter().collect();
        let result = calculate_m6(&refs);
        assert_eq!(result.n_forms, 8);
        assert_relative_eq!(result.form_diversity, 1.0);
        // No heights: only the form term contributes
        assert_relative_eq!(result.raw, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_no_heights() {
        let a = plant("a", None, None, "");
        let result = calculate_m6(&[&a]);
        assert_eq!(result.raw, 0.0);
        assert_eq!(result.height_range, 0.0);
        assert!(result.growth_form_groups.is_empty());
    }
}
