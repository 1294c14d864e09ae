//! Guild Flags (N5 nitrogen fixation, N6 soil pH)
//!
//! Qualitative agronomic checks reported with every score. They carry a
//! penalty level for display but never enter the weighted overall score.

use crate::data::Plant;
use crate::utils::ecosystem_ratings::UNCLASSIFIED;
use serde::Serialize;

/// Rating column read for nitrogen fixation
pub const NITROGEN_FIXATION_COLUMN: &str = "nitrogen_fixation_rating";

/// More fixers than this risks over-fertilizing the bed
const EXCESS_FIXERS: usize = 2;

/// pH spread (units) above which preferences start to conflict
const PH_MODERATE_RANGE: f64 = 1.5;
const PH_EXTREME_RANGE: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NitrogenStatus {
    Present,
    Missing,
}

/// N5: nitrogen fixation in the guild
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NitrogenFlag {
    pub status: NitrogenStatus,
    /// Plants rated High or better, in guild order
    pub fixers: Vec<String>,
    /// 1.0 with no fixer, 0.5 with one, 0.0 with two or more
    pub penalty: f64,
    /// More than two fixers
    pub excess: bool,
}

/// N6: spread of preferred soil pH
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoilPhFlag {
    pub min_ph: f64,
    pub max_ph: f64,
    pub range: f64,
    /// 0.0, 0.5 above a 1.5-unit spread, 1.0 above 2.5 units
    pub penalty: f64,
    pub incompatible: bool,
    pub n_plants: usize,
}

/// Both flags; `None` when no plant carries the underlying data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuildFlags {
    pub nitrogen: Option<NitrogenFlag>,
    pub soil_ph: Option<SoilPhFlag>,
}

pub fn calculate_flags(plants: &[&Plant]) -> GuildFlags {
    GuildFlags {
        nitrogen: check_nitrogen_fixation(plants),
        soil_ph: check_soil_ph(plants),
    }
}

/// `Some(true)` for a fixer, `None` for a missing or unclassified rating
fn is_fixer(label: &str) -> Option<bool> {
    match label.trim() {
        "Very High" | "High" | "Moderate-High" => Some(true),
        UNCLASSIFIED | "No Information" | "" => None,
        _ => Some(false),
    }
}

/// Check nitrogen fixation status of guild
pub fn check_nitrogen_fixation(plants: &[&Plant]) -> Option<NitrogenFlag> {
    let rated: Vec<(&Plant, bool)> = plants
        .iter()
        .filter_map(|p| {
            let label = p.ecosystem_ratings.get(NITROGEN_FIXATION_COLUMN)?;
            is_fixer(label).map(|fixes| (*p, fixes))
        })
        .collect();
    if rated.is_empty() {
        return None;
    }

    let fixers: Vec<String> = rated
        .iter()
        .filter(|(_, fixes)| *fixes)
        .map(|(p, _)| p.id.clone())
        .collect();
    let (status, penalty) = match fixers.len() {
        0 => (NitrogenStatus::Missing, 1.0),
        1 => (NitrogenStatus::Present, 0.5),
        _ => (NitrogenStatus::Present, 0.0),
    };

    Some(NitrogenFlag {
        status,
        excess: fixers.len() > EXCESS_FIXERS,
        fixers,
        penalty,
    })
}

/// Check soil pH compatibility of guild
pub fn check_soil_ph(plants: &[&Plant]) -> Option<SoilPhFlag> {
    let ph_prefs: Vec<f64> = plants
        .iter()
        .filter_map(|p| p.ph_mean)
        .filter(|ph| ph.is_finite())
        .collect();
    if ph_prefs.is_empty() {
        return None;
    }

    let min_ph = ph_prefs.iter().copied().fold(f64::INFINITY, f64::min);
    let max_ph = ph_prefs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max_ph - min_ph;

    let penalty = if range > PH_EXTREME_RANGE {
        1.0
    } else if range > PH_MODERATE_RANGE {
        0.5
    } else {
        0.0
    };

    Some(SoilPhFlag {
        min_ph,
        max_ph,
        range,
        penalty,
        incompatible: range > PH_MODERATE_RANGE,
        n_plants: ph_prefs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn nitrogen(id: &str, rating: &str) -> Plant {
        let mut p = Plant::new(id, "Fabaceae", "G");
        p.ecosystem_ratings.insert(NITROGEN_FIXATION_COLUMN.into(), rating.into());
        p
    }

    fn ph(id: &str, value: Option<f64>) -> Plant {
        let mut p = Plant::new(id, "F", "G");
        p.ph_mean = value;
        p
    }

    #[test]
    fn test_nitrogen_fixer_present() {
        let a = nitrogen("a", "Very High");
        let b = nitrogen("b", "Low");
        let flag = check_nitrogen_fixation(&[&a, &b]).unwrap();
        assert_eq!(flag.status, NitrogenStatus::Present);
        assert_eq!(flag.fixers, vec!["a".to_string()]);
        assert_eq!(flag.penalty, 0.5);
        assert!(!flag.excess);
    }

    #[test]
    fn test_nitrogen_fixer_missing() {
        let a = nitrogen("a", "Moderate");
        let b = nitrogen("b", "Very Low");
        let flag = check_nitrogen_fixation(&[&a, &b]).unwrap();
        assert_eq!(flag.status, NitrogenStatus::Missing);
        assert!(flag.fixers.is_empty());
        assert_eq!(flag.penalty, 1.0);
    }

    #[test]
    fn test_excess_nitrogen() {
        let plants: Vec<Plant> = ["High", "Moderate-High", "Very High", "Low"]
            .iter()
            .enumerate()
            .map(|(i, r)| nitrogen(&format!("p{i}"), r))
            .collect();
        let refs: Vec<&Plant> = plants.iter().collect();
        let flag = check_nitrogen_fixation(&refs).unwrap();
        assert_eq!(flag.fixers.len(), 3);
        assert_eq!(flag.penalty, 0.0);
        assert!(flag.excess);
    }

    #[test]
    fn test_no_nitrogen_data() {
        let a = Plant::new("a", "F", "G");
        let b = nitrogen("b", UNCLASSIFIED);
        assert_eq!(check_nitrogen_fixation(&[&a, &b]), None);
    }

    #[test]
    fn test_incompatible_ph() {
        let a = ph("a", Some(4.5));
        let b = ph("b", Some(7.8));
        let c = ph("c", Some(5.2));
        let flag = check_soil_ph(&[&a, &b, &c]).unwrap();
        assert_relative_eq!(flag.range, 3.3, epsilon = 1e-12);
        assert_eq!((flag.min_ph, flag.max_ph), (4.5, 7.8));
        assert_eq!(flag.penalty, 1.0);
        assert!(flag.incompatible);
    }

    #[test]
    fn test_moderate_ph_spread() {
        let a = ph("a", Some(5.5));
        let b = ph("b", Some(7.5));
        let flag = check_soil_ph(&[&a, &b]).unwrap();
        assert_eq!(flag.penalty, 0.5);
        assert!(flag.incompatible);
    }

    #[test]
    fn test_compatible_ph() {
        // Exactly 1.5 units apart is still compatible
        let a = ph("a", Some(6.0));
        let b = ph("b", Some(7.5));
        let c = ph("c", None);
        let flag = check_soil_ph(&[&a, &b, &c]).unwrap();
        assert_eq!(flag.penalty, 0.0);
        assert!(!flag.incompatible);
        assert_eq!(flag.n_plants, 2);
    }

    #[test]
    fn test_no_ph_data() {
        let a = ph("a", None);
        let b = ph("b", None);
        assert_eq!(check_soil_ph(&[&a, &b]), None);
        assert_eq!(calculate_flags(&[&a]).soil_ph, None);
    }
}
