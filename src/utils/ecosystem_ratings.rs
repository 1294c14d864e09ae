//! Ecosystem Service Rating Utilities
//!
//! Provides conversions between categorical ratings (Very High, High, Moderate, Low, Very Low)
//! and numeric scores (5.0, 4.0, 3.0, 2.0, 1.0) for community-weighted mean calculations.

use tracing::warn;

pub const UNCLASSIFIED: &str = "Unable to Classify";

/// Convert categorical rating to numeric score
///
/// # Rating Scale
/// - Very High = 5.0
/// - High = 4.0
/// - Moderate = 3.0
/// - Low = 2.0
/// - Very Low = 1.0
/// - Unable to Classify / No Information / empty / unknown = `None`
pub fn rating_to_numeric(rating: &str) -> Option<f64> {
    match rating.trim() {
        "Very High" => Some(5.0),
        "High" => Some(4.0),
        "Moderate" => Some(3.0),
        "Low" => Some(2.0),
        "Very Low" => Some(1.0),
        UNCLASSIFIED | "No Information" | "" => None,
        other => {
            warn!(rating = other, "unknown ecosystem service rating");
            None
        }
    }
}

/// Convert numeric score back to categorical rating
///
/// Uses midpoint thresholds:
/// - [4.5, 5.0] → Very High
/// - [3.5, 4.5) → High
/// - [2.5, 3.5) → Moderate
/// - [1.5, 2.5) → Low
/// - [1.0, 1.5) → Very Low
pub fn numeric_to_rating(score: f64) -> &'static str {
    if score.is_nan() {
        UNCLASSIFIED
    } else if score >= 4.5 {
        "Very High"
    } else if score >= 3.5 {
        "High"
    } else if score >= 2.5 {
        "Moderate"
    } else if score >= 1.5 {
        "Low"
    } else {
        "Very Low"
    }
}

/// Community mean rating for a guild
///
/// Returns `(None, "Unable to Classify")` when no rating is valid.
///
/// # Example
/// ```
/// use guild_scorer::utils::ecosystem_ratings::mean_rating;
///
/// let (score, rating) = mean_rating(&["Very High", "High", "High"]);
/// assert!((score.unwrap() - 4.333).abs() < 0.01);
/// assert_eq!(rating, "High");
/// ```
pub fn mean_rating(ratings: &[&str]) -> (Option<f64>, &'static str) {
    let numeric: Vec<f64> = ratings.iter().filter_map(|r| rating_to_numeric(r)).collect();

    if numeric.is_empty() {
        return (None, UNCLASSIFIED);
    }

    let mean = numeric.iter().sum::<f64>() / numeric.len() as f64;
    (Some(mean), numeric_to_rating(mean))
}
