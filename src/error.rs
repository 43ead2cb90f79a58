//! Error types for the phenotype core.
//!
//! Resolution and format errors abort a whole operation. Per-transform domain
//! violations and degenerate statistics never surface here: they degrade to
//! `Unsupported` outcomes and p = 0 respectively.

use thiserror::Error;

use crate::model::{ObservationUnitId, StudyId, TraitId};

#[derive(Debug, Error)]
pub enum PhenoError {
    /// A requested trait id does not exist in the store.
    #[error("Phenotype with id {0} not found")]
    TraitNotFound(TraitId),

    #[error("Study with id {0} not found")]
    StudyNotFound(StudyId),

    /// Two value records for the same observation unit and pivot column.
    #[error("duplicate value for observation unit {observation_unit_id} in column '{column}'")]
    DuplicateValue {
        observation_unit_id: ObservationUnitId,
        column: String,
    },

    /// Malformed exchange file (header, delimiter, cell contents).
    #[error("format error: {0}")]
    Format(String),

    /// ISA-Tab archives are limited to a single study.
    #[error("only one study per ISA-Tab archive is supported, found {0}")]
    MultipleStudies(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl PhenoError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        PhenoError::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PhenoError>;
