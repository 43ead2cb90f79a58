//! Phenotype core
//!
//! Analysis and exchange core of a plant phenotype repository.
//!
//! - `matrix`: long-format value records → dense observation-unit × trait matrix
//! - `stats`: normality scoring, transformations and cross-trait correlation
//! - `exchange`: ISA-Tab archives, PLINK/CSV tables and accession files
//! - `data`: store abstraction plus an in-memory store loaded with Polars
//!
//! The core is synchronous and read-only with respect to the store.

pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod matrix;
pub mod model;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use config::CoreConfig;
pub use data::{AccessionLookup, MemoryStore, PhenotypeStore};
pub use error::{PhenoError, Result};
pub use exchange::{import_study, IdAllocator, StudyBundle};
pub use matrix::{DenseMatrix, IdentityTable, MatrixBuilder, PivotKey};
pub use stats::{CorrelationEngine, ShapiroWilk, TransformKind, TransformationEngine};
