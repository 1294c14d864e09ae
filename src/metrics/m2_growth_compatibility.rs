//! METRIC 2: GROWTH COMPATIBILITY (CSR CONFLICTS)
//!
//! Scores ecological compatibility based on Grime's CSR strategy conflicts.
//! Detects 4 types of conflicts (C-C, C-S, C-R, R-R) with context-specific
//! modulation based on growth form, height, and light preference.
//!
//! Raw value is conflict density (conflicts per ordered plant pair); lower is
//! better, so the scorer displays `100 - percentile`.

use crate::data::Plant;
use crate::utils::{csr_to_percentile, CsrCalibration, CsrStrategy};
use serde::Serialize;
use tracing::debug;

const PERCENTILE_THRESHOLD: f64 = 75.0; // Top quartile

/// Defaults for plants missing a trait
const DEFAULT_HEIGHT_M: f64 = 1.0;
const DEFAULT_LIGHT_PREF: f64 = 5.0;

/// Per-plant CSR data for detailed breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantCsrData {
    pub plant_id: String,
    pub c_raw: f64,
    pub s_raw: f64,
    pub r_raw: f64,
    pub c_percentile: f64,
    pub s_percentile: f64,
    pub r_percentile: f64,
    pub dominant_strategy: String,
}

/// Result of M2 calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct M2Result {
    /// Conflict density (conflicts per possible pair)
    pub raw: f64,
    pub high_c_count: usize,
    pub high_s_count: usize,
    pub high_r_count: usize,
    /// Total raw conflicts before density normalization
    pub total_conflicts: f64,
    pub plant_csr_data: Vec<PlantCsrData>,
    /// Plants skipped for lack of CSR values
    pub missing_csr: Vec<String>,
}

/// Plant data for conflict detection
#[derive(Debug, Clone)]
struct PlantRow<'a> {
    index: usize,
    plant: &'a Plant,
    c_percentile: f64,
    s_percentile: f64,
    r_percentile: f64,
    height_m: f64,
    growth_form: String,
    light_pref: f64,
}

/// Calculate M2: Growth Compatibility (CSR Conflicts)
///
/// `plants` is the whole guild; plants without CSR values take no part in
/// conflicts but still count towards the pair denominator.
pub fn calculate_m2(plants: &[&Plant], csr_calibration: Option<&CsrCalibration>) -> M2Result {
    let n_plants = plants.len();
    let mut missing_csr = Vec::new();
    let mut rows = Vec::with_capacity(n_plants);

    for (index, plant) in plants.iter().enumerate() {
        let Some(csr) = plant.csr else {
            missing_csr.push(plant.id.clone());
            continue;
        };
        rows.push(PlantRow {
            index,
            plant,
            c_percentile: csr_to_percentile(csr.c, CsrStrategy::C, csr_calibration),
            s_percentile: csr_to_percentile(csr.s, CsrStrategy::S, csr_calibration),
            r_percentile: csr_to_percentile(csr.r, CsrStrategy::R, csr_calibration),
            height_m: plant.height_m.unwrap_or(DEFAULT_HEIGHT_M),
            growth_form: plant.growth_form.to_lowercase(),
            light_pref: plant.light_pref.unwrap_or(DEFAULT_LIGHT_PREF),
        });
    }
    if !missing_csr.is_empty() {
        debug!(missing = missing_csr.len(), "plants without CSR skipped in conflict detection");
    }

    // Classify plants
    let high_c: Vec<&PlantRow> = rows.iter().filter(|p| p.c_percentile > PERCENTILE_THRESHOLD).collect();
    let high_s: Vec<&PlantRow> = rows.iter().filter(|p| p.s_percentile > PERCENTILE_THRESHOLD).collect();
    let high_r: Vec<&PlantRow> = rows.iter().filter(|p| p.r_percentile > PERCENTILE_THRESHOLD).collect();

    let mut total_conflicts = 0.0;

    // CONFLICT TYPE 1: C-C (Competitive vs Competitive)
    for (i, a) in high_c.iter().enumerate() {
        for b in &high_c[i + 1..] {
            total_conflicts += calculate_c_c_conflict(a, b);
        }
    }

    // CONFLICT TYPE 2: C-S (Competitive vs Stress-Tolerant)
    for plant_c in &high_c {
        for plant_s in &high_s {
            if plant_c.index != plant_s.index {
                total_conflicts += calculate_c_s_conflict(plant_c, plant_s);
            }
        }
    }

    // CONFLICT TYPE 3: C-R (Competitive vs Ruderal)
    for plant_c in &high_c {
        for plant_r in &high_r {
            if plant_c.index != plant_r.index {
                total_conflicts += calculate_c_r_conflict(plant_c, plant_r);
            }
        }
    }

    // CONFLICT TYPE 4: R-R (Ruderal vs Ruderal), fixed low severity
    let rr_pairs = high_r.len() * high_r.len().saturating_sub(1) / 2;
    total_conflicts += 0.3 * rr_pairs as f64;

    let max_pairs = if n_plants > 1 { n_plants * (n_plants - 1) } else { 1 };
    let conflict_density = total_conflicts / max_pairs as f64;

    let plant_csr_data = rows
        .iter()
        .filter_map(|p| {
            let csr = p.plant.csr?;
            Some(PlantCsrData {
                plant_id: p.plant.id.clone(),
                c_raw: csr.c,
                s_raw: csr.s,
                r_raw: csr.r,
                c_percentile: p.c_percentile,
                s_percentile: p.s_percentile,
                r_percentile: p.r_percentile,
                dominant_strategy: determine_dominant_strategy(
                    p.c_percentile,
                    p.s_percentile,
                    p.r_percentile,
                ),
            })
        })
        .collect();

    M2Result {
        raw: conflict_density,
        high_c_count: high_c.len(),
        high_s_count: high_s.len(),
        high_r_count: high_r.len(),
        total_conflicts,
        plant_csr_data,
        missing_csr,
    }
}

/// Determine dominant CSR strategy based on percentiles
///
/// Returns the strategy with the highest percentile, or "Mixed" if balanced
fn determine_dominant_strategy(c_pct: f64, s_pct: f64, r_pct: f64) -> String {
    // Balanced: within 20 percentile points
    let max_pct = c_pct.max(s_pct).max(r_pct);
    let min_pct = c_pct.min(s_pct).min(r_pct);
    if max_pct - min_pct < 20.0 {
        return "Mixed".to_string();
    }

    let (strong, leaning, pct) = if c_pct >= s_pct && c_pct >= r_pct {
        ("Competitive", "C-leaning", c_pct)
    } else if s_pct >= c_pct && s_pct >= r_pct {
        ("Stress-tolerant", "S-leaning", s_pct)
    } else {
        ("Ruderal", "R-leaning", r_pct)
    };
    if pct > PERCENTILE_THRESHOLD { strong } else { leaning }.to_string()
}

fn is_climber(form: &str) -> bool {
    form.contains("vine") || form.contains("liana")
}

/// C-C conflict with growth form and height modulation
fn calculate_c_c_conflict(plant_a: &PlantRow, plant_b: &PlantRow) -> f64 {
    let form_a = plant_a.growth_form.as_str();
    let form_b = plant_b.growth_form.as_str();

    let modifier = if (is_climber(form_a) && form_b.contains("tree"))
        || (is_climber(form_b) && form_a.contains("tree"))
    {
        0.2 // Vine can climb tree
    } else if (form_a.contains("tree") && form_b.contains("herb"))
        || (form_b.contains("tree") && form_a.contains("herb"))
    {
        0.4 // Different vertical niches
    } else {
        let height_diff = (plant_a.height_m - plant_b.height_m).abs();
        if height_diff < 2.0 {
            1.0 // Same canopy layer
        } else if height_diff < 5.0 {
            0.6 // Partial separation
        } else {
            0.3 // Different canopy layers
        }
    };

    1.0 * modifier
}

/// C-S conflict with critical light preference modulation
fn calculate_c_s_conflict(plant_c: &PlantRow, plant_s: &PlantRow) -> f64 {
    let s_light = plant_s.light_pref;

    if s_light < 3.2 {
        // Shade-adapted S wants to be under the C canopy
        0.0
    } else if s_light > 7.47 {
        // Sun-loving S will be shaded out
        0.9
    } else if (plant_c.height_m - plant_s.height_m).abs() > 8.0 {
        0.6 * 0.3 // Vertical niche separation
    } else {
        0.6
    }
}

/// C-R conflict with height modulation
fn calculate_c_r_conflict(plant_c: &PlantRow, plant_r: &PlantRow) -> f64 {
    let height_diff = (plant_c.height_m - plant_r.height_m).abs();
    if height_diff > 5.0 {
        0.8 * 0.3 // R exploits gaps
    } else {
        0.8
    }
}
