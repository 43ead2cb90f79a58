//! ISA-Tab file layout: member names, fixed headers, node naming and the
//! tab-delimited table reader/writer shared by export and import.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::path::Path;

use crate::error::{PhenoError, Result};
use crate::model::{AccessionId, ObservationUnitId, StudyId};

pub const INVESTIGATION_FILE: &str = "i_investigation.txt";
pub const TRAIT_DEFINITION_FILE: &str = "tdf.txt";
pub const DERIVED_DATA_FILE: &str = "d_data.txt";

pub const PROTOCOL_REF: &str = "Data transformation";
pub const ORGANISM_SOURCE: &str = "NCBITaxon";
pub const ACCESSION_SOURCE: &str = "GMI_accessions";

/// Measurement type term accessions identifying a phenotyping assay
pub const PHENOTYPING_TERM_ACCESSIONS: [&str; 2] = ["23", "0000023"];

pub const SOURCE_NAME: &str = "Source Name";
pub const ORGANISM: &str = "Characteristics[Organism]";
pub const INFRASPECIFIC_NAME: &str = "Characteristics[Infraspecific name]";
pub const TERM_SOURCE_REF: &str = "Term Source REF";
pub const TERM_ACCESSION_NUMBER: &str = "Term Accession Number";
pub const SAMPLE_NAME: &str = "Sample Name";
pub const PROTOCOL_REF_COLUMN: &str = "Protocol REF";
pub const TRAIT_DEFINITION_COLUMN: &str = "Parameter Value[Trait Definition File]";
pub const ASSAY_NAME: &str = "Assay Name";
pub const DERIVED_DATA_COLUMN: &str = "Derived Data File";

pub const VARIABLE_ID: &str = "Variable ID";
pub const TRAIT: &str = "Trait";
pub const METHOD: &str = "Method";
pub const SCALE: &str = "Scale";

pub const STUDY_HEADER: [&str; 8] = [
    SOURCE_NAME,
    ORGANISM,
    TERM_SOURCE_REF,
    TERM_ACCESSION_NUMBER,
    INFRASPECIFIC_NAME,
    TERM_SOURCE_REF,
    TERM_ACCESSION_NUMBER,
    SAMPLE_NAME,
];

pub const ASSAY_HEADER: [&str; 5] = [
    SAMPLE_NAME,
    PROTOCOL_REF_COLUMN,
    TRAIT_DEFINITION_COLUMN,
    ASSAY_NAME,
    DERIVED_DATA_COLUMN,
];

/// Scale reference (UO) first, then TO, then EO
pub const TRAIT_DEFINITION_HEADER: [&str; 10] = [
    VARIABLE_ID,
    TRAIT,
    METHOD,
    SCALE,
    TERM_SOURCE_REF,
    TERM_ACCESSION_NUMBER,
    TERM_SOURCE_REF,
    TERM_ACCESSION_NUMBER,
    TERM_SOURCE_REF,
    TERM_ACCESSION_NUMBER,
];

pub fn study_file_name(study_id: StudyId) -> String {
    format!("s_study{}.txt", study_id)
}

pub fn assay_file_name(study_id: StudyId) -> String {
    format!("a_study{}.txt", study_id)
}

pub fn source_name(accession_id: AccessionId) -> String {
    format!("source{}", accession_id)
}

pub fn sample_name(observation_unit_id: ObservationUnitId) -> String {
    format!("sample{}", observation_unit_id)
}

pub fn assay_name(observation_unit_id: ObservationUnitId) -> String {
    format!("assay{}", observation_unit_id)
}

/// Header row plus data rows of a tab-delimited member
#[derive(Debug, Clone)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Position of the first header cell equal to `name`
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str, file: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| PhenoError::format(format!("{}: missing column '{}'", file, name)))
    }
}

/// Cell `idx` of a row, empty when the row is short
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

pub fn write_table<S: AsRef<str>>(path: &Path, header: &[&str], rows: &[Vec<S>]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Necessary)
        .from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row.iter().map(|c| c.as_ref()))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(|c| c.trim().to_string()).collect(),
        None => {
            return Err(PhenoError::format(format!(
                "{}: empty file",
                path.display()
            )))
        }
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    Ok(Table { header, rows })
}
