//! Utility modules shared across the statistics engines
//!
//! - Numeric: summary statistics and normal-distribution helpers
//! - Rank: average ranking for Spearman correlation

pub mod numeric;
pub mod rank;

// Re-export commonly used helpers
pub use numeric::{max_value, mean, min_value, normal_quantile, normal_sf, population_variance};
pub use rank::rank_average;
