//! Statistics engines
//!
//! - Normality: Shapiro-Wilk W and p-value
//! - Transform: normality-improving transforms with Box-Cox λ search
//! - Correlation: pairwise Pearson/Spearman and sample overlap

pub mod correlation;
pub mod normality;
pub mod transform;

pub use correlation::{pearson, spearman, CorrelationBundle, CorrelationEngine, CorrelationMatrix};
pub use normality::{NormalityOutcome, NormalityTest, ShapiroWilk};
pub use transform::{
    BoxCoxFit, TransformKind, TransformOutcome, TransformationEngine, TransformationResult, CATALOG,
};
