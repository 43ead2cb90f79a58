//! Accession passport files and accession id lists.

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use tracing::{info, warn};

use crate::data::COLLECTION_DATE_FORMAT;
use crate::error::{PhenoError, Result};
use crate::model::{Accession, AccessionId};

pub const ACCESSION_FILE_HEADER: [&str; 9] = [
    "id",
    "name",
    "country",
    "sitename",
    "latitude",
    "longitude",
    "collector",
    "collectiondate",
    "CS_number",
];

/// Parse a comma-separated accession passport file.
///
/// The header must match [`ACCESSION_FILE_HEADER`] exactly. Coordinates and
/// collection dates that do not parse are left empty; a bad id is fatal.
pub fn parse_accession_file<R: Read>(reader: R) -> Result<Vec<Accession>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let header = reader.headers()?;
    if header.iter().ne(ACCESSION_FILE_HEADER.iter().copied()) {
        return Err(PhenoError::format(format!(
            "header must be of form {}",
            ACCESSION_FILE_HEADER.join(",")
        )));
    }

    let mut accessions = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw_id = field(&record, 0).unwrap_or("");
        let id = raw_id.parse::<AccessionId>().map_err(|_| {
            PhenoError::format(format!("line {}: invalid accession id '{}'", line + 2, raw_id))
        })?;

        let latitude = field(&record, 4).and_then(|s| s.parse().ok());
        let longitude = field(&record, 5).and_then(|s| s.parse().ok());
        let collection_date = field(&record, 7)
            .and_then(|s| NaiveDateTime::parse_from_str(s, COLLECTION_DATE_FORMAT).ok());
        if field(&record, 7).is_some() && collection_date.is_none() {
            skipped += 1;
        }

        accessions.push(Accession {
            id,
            name: owned(&record, 1),
            country: owned(&record, 2),
            sitename: owned(&record, 3),
            latitude,
            longitude,
            collector: owned(&record, 6),
            collection_date,
            cs_number: owned(&record, 8),
        });
    }

    if skipped > 0 {
        warn!(skipped, "Ignored unparseable collection dates");
    }
    info!(accessions = accessions.len(), "Parsed accession file");
    Ok(accessions)
}

/// Non-empty field `idx`
fn field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).filter(|s| !s.is_empty())
}

fn owned(record: &StringRecord, idx: usize) -> Option<String> {
    field(record, idx).map(str::to_string)
}

/// Parse a list of accession ids: one per line, or comma-separated when the
/// text is a single line.
pub fn parse_accession_ids(text: &str) -> Result<Vec<AccessionId>> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tokens: Vec<&str> = if lines.len() == 1 {
        lines[0].split(',').collect()
    } else {
        lines
    };

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<AccessionId>()
                .map_err(|_| PhenoError::format(format!("invalid accession id '{}'", t)))
        })
        .collect()
}
