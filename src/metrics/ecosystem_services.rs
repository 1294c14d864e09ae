//! Ecosystem Services
//!
//! Community mean ratings for ecosystem services (Shipley 2025 framework).
//! Plant-level ratings are categorical (Very High, High, Moderate, Low,
//! Very Low); the guild rating converts them to numbers, averages, and
//! converts back. Reported alongside the score, never weighted.
//!
//! Services, one per rating column:
//! - NPP (Net Primary Productivity)
//! - Decomposition Rate
//! - Nutrient Cycling
//! - Nutrient Retention
//! - Nutrient Loss
//! - Carbon Storage - Biomass
//! - Carbon Storage - Recalcitrant
//! - Soil Erosion Protection
//! - Nitrogen Fixation
//!
//! The service balance is derived from CSR instead: competitors drive
//! productivity and biomass carbon, stress-tolerators retention and
//! recalcitrant carbon, ruderals decomposition and nutrient cycling. A guild
//! whose mean strategy is even across C, S and R supplies all three groups.
//! It is calibrated and reported as P7, unweighted by default.

use crate::data::{Plant, ECOSYSTEM_RATING_COLUMNS};
use crate::utils::ecosystem_ratings::mean_rating;
use serde::Serialize;
use std::collections::BTreeMap;

/// Guild-level rating for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRating {
    /// Mean numeric score (1-5), `None` when no plant has a valid rating
    pub score: Option<f64>,
    pub rating: String,
}

/// Guild mean CSR strategy and its evenness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsrServiceBalance {
    /// Mean C/S/R proportions (sum to 1; all 0 without CSR data)
    pub c: f64,
    pub s: f64,
    pub r: f64,
    /// Normalized Shannon evenness of (c, s, r), 0-1
    pub evenness: f64,
    /// Plants contributing a CSR profile
    pub n_plants: usize,
}

/// Result structure for ecosystem services, keyed by rating column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EcosystemServicesResult {
    pub services: BTreeMap<String, ServiceRating>,
    pub balance: CsrServiceBalance,
}

impl EcosystemServicesResult {
    pub fn get(&self, column: &str) -> Option<&ServiceRating> {
        self.services.get(column)
    }
}

/// Calculate every ecosystem service for a guild
///
/// For each service:
/// 1. Collect the guild's labels for the rating column
/// 2. Convert categorical ratings to numeric (Very High=5 … Very Low=1)
/// 3. Mean over valid ratings (excluding Unable to Classify / No Information)
/// 4. Convert back to categorical rating
pub fn calculate_ecosystem_services(plants: &[&Plant]) -> EcosystemServicesResult {
    let services = ECOSYSTEM_RATING_COLUMNS
        .iter()
        .map(|&column| {
            let labels: Vec<&str> = plants
                .iter()
                .filter_map(|p| p.ecosystem_ratings.get(column).map(String::as_str))
                .collect();
            let (score, rating) = mean_rating(&labels);
            (
                column.to_string(),
                ServiceRating {
                    score,
                    rating: rating.to_string(),
                },
            )
        })
        .collect();

    EcosystemServicesResult {
        services,
        balance: csr_service_balance(plants),
    }
}

/// Evenness of the guild's mean CSR strategy
///
/// Plants without CSR are skipped; a guild with none scores 0.
pub fn csr_service_balance(plants: &[&Plant]) -> CsrServiceBalance {
    let profiles: Vec<_> = plants.iter().filter_map(|p| p.csr).collect();
    let n = profiles.len();
    let (sum_c, sum_s, sum_r) = profiles
        .iter()
        .fold((0.0, 0.0, 0.0), |(c, s, r), p| (c + p.c, s + p.s, r + p.r));
    let total = sum_c + sum_s + sum_r;
    if n == 0 || total <= 0.0 {
        return CsrServiceBalance {
            c: 0.0,
            s: 0.0,
            r: 0.0,
            evenness: 0.0,
            n_plants: n,
        };
    }

    let (c, s, r) = (sum_c / total, sum_s / total, sum_r / total);
    let entropy: f64 = [c, s, r]
        .iter()
        .filter(|&&q| q > 0.0)
        .map(|&q| -q * q.ln())
        .sum();

    CsrServiceBalance {
        c,
        s,
        r,
        evenness: (entropy / 3f64.ln()).clamp(0.0, 1.0),
        n_plants: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CsrProfile;
    use approx::assert_relative_eq;

    fn rated(id: &str, npp: &str) -> Plant {
        let mut p = Plant::new(id, "F", "G");
        p.ecosystem_ratings.insert("npp_rating".into(), npp.into());
        p
    }

    #[test]
    fn test_community_mean() {
        let a = rated("a", "Very High");
        let b = rated("b", "High");
        let c = rated("c", "Unable to Classify");
        let result = calculate_ecosystem_services(&[&a, &b, &c]);

        let npp = result.get("npp_rating").unwrap();
        assert_relative_eq!(npp.score.unwrap(), 4.5);
        assert_eq!(npp.rating, "Very High");
        assert_eq!(result.services.len(), ECOSYSTEM_RATING_COLUMNS.len());
    }

    fn with_csr(id: &str, c: f64, s: f64, r: f64) -> Plant {
        let mut p = Plant::new(id, "F", "G");
        p.csr = Some(CsrProfile { c, s, r });
        p
    }

    #[test]
    fn test_service_balance_evenness() {
        let even = with_csr("a", 100.0 / 3.0, 100.0 / 3.0, 100.0 / 3.0);
        assert_relative_eq!(csr_service_balance(&[&even]).evenness, 1.0, epsilon = 1e-12);

        // Pure competitor supplies one service group only
        let pure = with_csr("b", 100.0, 0.0, 0.0);
        let balance = csr_service_balance(&[&pure]);
        assert_eq!(balance.evenness, 0.0);
        assert_eq!(balance.c, 1.0);

        // Complementary strategies balance each other
        let c = with_csr("c", 80.0, 10.0, 10.0);
        let s = with_csr("s", 10.0, 80.0, 10.0);
        let r = with_csr("r", 10.0, 10.0, 80.0);
        let mixed = csr_service_balance(&[&c, &s, &r]);
        assert_relative_eq!(mixed.evenness, 1.0, epsilon = 1e-12);
        assert!(csr_service_balance(&[&c, &s]).evenness < mixed.evenness);
    }

    #[test]
    fn test_service_balance_skips_missing_csr() {
        let a = with_csr("a", 80.0, 10.0, 10.0);
        let b = Plant::new("b", "F", "G");
        let balance = csr_service_balance(&[&a, &b]);
        assert_eq!(balance.n_plants, 1);
        assert_relative_eq!(balance.s, 0.1, epsilon = 1e-12);

        let none = csr_service_balance(&[&b]);
        assert_eq!(none.n_plants, 0);
        assert_eq!(none.evenness, 0.0);
        assert_eq!(calculate_ecosystem_services(&[&b]).balance, none);
    }

    #[test]
    fn test_no_valid_ratings() {
        let a = Plant::new("a", "F", "G");
        let result = calculate_ecosystem_services(&[&a]);
        let erosion = result.get("erosion_protection_rating").unwrap();
        assert_eq!(erosion.score, None);
        assert_eq!(erosion.rating, "Unable to Classify");
    }
}
