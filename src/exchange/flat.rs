//! Flat phenotype tables
//!
//! PLINK-style tables (`FID IID <trait> ...`, accession id in the first two
//! columns), RNA-seq expression CSV (accession id, then one column per gene)
//! and the per-trait value CSV download.

use csv::{QuoteStyle, ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use super::{IdAllocator, StudyBundle};
use crate::data::PhenotypeStore;
use crate::error::{PhenoError, Result};
use crate::model::{
    Accession, AccessionId, ObservationUnit, Study, Trait, TraitId, TraitKind, ValueRecord,
};

/// Scoring recorded for imported expression traits
pub const DEFAULT_EXPRESSION_SCORING: &str = "TPM";

/// Missing-value marker written to PLINK tables
pub const MISSING: &str = "NA";

pub const VALUES_CSV_HEADER: [&str; 7] = [
    "accession_id",
    "accession_name",
    "accession_cs_number",
    "accession_longitude",
    "accession_latitude",
    "accession_country",
    "phenotype_value",
];

/// Accessions x traits table read from or written to a flat file.
///
/// `rows[i][j]` is the value of trait `names[j]` for `accession_ids[i]`.
/// The same accession may appear on several rows (replicates).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitTable {
    pub names: Vec<String>,
    pub accession_ids: Vec<AccessionId>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl TraitTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn read_plink(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_plink(&text)
    }

    /// Parse a PLINK phenotype table.
    ///
    /// The delimiter is a space unless the header only splits on tabs. A
    /// header that splits on neither is rejected. Underscores in trait names
    /// are read back as spaces.
    pub fn parse_plink(text: &str) -> Result<Self> {
        let header = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| PhenoError::format("Wrong file format: empty file"))?
            .trim();

        let delimiter = if header.split(' ').count() > 1 {
            b' '
        } else if header.split('\t').count() > 1 {
            b'\t'
        } else {
            return Err(PhenoError::format("Wrong file format"));
        };
        debug!(delimiter = %(delimiter as char).escape_default(), "PLINK delimiter");

        Self::parse_delimited(text, delimiter, 2, |name| name.replace('_', " "))
    }

    pub fn read_expression_csv(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_expression_csv(&text)
    }

    /// Parse an expression matrix: first column accession ids, remaining
    /// header cells gene names.
    pub fn parse_expression_csv(text: &str) -> Result<Self> {
        Self::parse_delimited(text, b',', 1, str::to_string)
    }

    fn parse_delimited<F>(text: &str, delimiter: u8, skip: usize, name: F) -> Result<Self>
    where
        F: Fn(&str) -> String,
    {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Err(PhenoError::format("Wrong file format: empty file")),
        };
        if header.len() <= skip {
            return Err(PhenoError::format(format!(
                "Wrong file format: header has {} fields",
                header.len()
            )));
        }
        let names: Vec<String> = header.iter().skip(skip).map(&name).collect();

        let mut accession_ids = Vec::new();
        let mut rows = Vec::new();
        for (line, record) in records.enumerate() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            // header is line 1
            let line = line + 2;
            if record.len() != skip + names.len() {
                return Err(PhenoError::format(format!(
                    "line {}: expected {} fields, found {}",
                    line,
                    skip + names.len(),
                    record.len()
                )));
            }

            let raw_id = record.get(0).unwrap_or("");
            let accession_id = raw_id.parse::<AccessionId>().map_err(|_| {
                PhenoError::format(format!("line {}: invalid accession id '{}'", line, raw_id))
            })?;

            let mut row = Vec::with_capacity(names.len());
            for j in 0..names.len() {
                row.push(parse_cell(record.get(skip + j).unwrap_or(""), line)?);
            }
            accession_ids.push(accession_id);
            rows.push(row);
        }

        Ok(Self {
            names,
            accession_ids,
            rows,
        })
    }

    /// Single-trait table with one row per value record.
    pub fn for_trait<S: PhenotypeStore + ?Sized>(store: &S, trait_id: TraitId) -> Result<Self> {
        let t = store
            .trait_by_id(trait_id)
            .ok_or(PhenoError::TraitNotFound(trait_id))?;
        let values = store.values_for_trait(trait_id);

        Ok(Self {
            names: vec![t.name],
            accession_ids: values.iter().map(|v| v.accession_id).collect(),
            rows: values.iter().map(|v| vec![Some(v.value)]).collect(),
        })
    }

    /// Write as a space-delimited PLINK table.
    pub fn write_plink<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(b' ')
            .quote_style(QuoteStyle::Never)
            .from_writer(writer);

        let mut header = vec!["FID".to_string(), "IID".to_string()];
        header.extend(self.names.iter().map(|n| n.replace(' ', "_")));
        writer.write_record(&header)?;

        for (accession_id, row) in self.accession_ids.iter().zip(&self.rows) {
            let id = accession_id.to_string();
            let mut record = vec![id.clone(), id];
            record.extend(row.iter().map(|cell| match cell {
                Some(v) => v.to_string(),
                None => MISSING.to_string(),
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Build a new study from the table. Every row becomes one observation
    /// unit; missing cells produce no value record.
    pub fn into_bundle(
        self,
        study_name: &str,
        kind: TraitKind,
        scoring: Option<&str>,
        ids: &mut IdAllocator,
    ) -> StudyBundle {
        let study = Study::new(ids.study(), study_name);

        let traits: Vec<Trait> = self
            .names
            .into_iter()
            .map(|name| {
                let mut t = Trait::new(ids.trait_id(), name, study.id);
                t.kind = kind;
                t.scoring = scoring.map(str::to_string);
                t
            })
            .collect();

        let accessions = self
            .accession_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| Accession::new(id, None))
            .collect();

        let mut observation_units = Vec::with_capacity(self.rows.len());
        let mut values = Vec::new();
        for (accession_id, row) in self.accession_ids.into_iter().zip(self.rows) {
            let unit = ObservationUnit {
                id: ids.observation_unit(),
                accession_id,
                study_id: study.id,
            };
            for (t, cell) in traits.iter().zip(row) {
                if let Some(value) = cell {
                    values.push(ValueRecord {
                        trait_id: t.id,
                        observation_unit_id: unit.id,
                        value,
                    });
                }
            }
            observation_units.push(unit);
        }

        info!(
            study = %study.name,
            traits = traits.len(),
            units = observation_units.len(),
            values = values.len(),
            "Imported flat trait table"
        );

        StudyBundle {
            study,
            traits,
            observation_units,
            accessions,
            values,
            publications: Vec::new(),
        }
    }
}

fn parse_cell(raw: &str, line: usize) -> Result<Option<f64>> {
    if raw.is_empty() || raw.eq_ignore_ascii_case(MISSING) {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| PhenoError::format(format!("line {}: invalid value '{}'", line, raw)))?;
    Ok(if value.is_nan() { None } else { Some(value) })
}

#[derive(Serialize)]
struct ValueRow {
    accession_id: AccessionId,
    accession_name: Option<String>,
    accession_cs_number: Option<String>,
    accession_longitude: Option<f64>,
    accession_latitude: Option<f64>,
    accession_country: Option<String>,
    phenotype_value: f64,
}

/// Write every value of a trait with its accession passport fields.
/// Returns the number of data rows written.
pub fn write_values_csv<S, W>(store: &S, trait_id: TraitId, writer: W) -> Result<usize>
where
    S: PhenotypeStore + ?Sized,
    W: Write,
{
    if store.trait_by_id(trait_id).is_none() {
        return Err(PhenoError::TraitNotFound(trait_id));
    }

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(VALUES_CSV_HEADER)?;

    let values = store.values_for_trait(trait_id);
    for v in &values {
        let accession = store
            .accession(v.accession_id)
            .unwrap_or_else(|| Accession::new(v.accession_id, None));
        writer.serialize(ValueRow {
            accession_id: accession.id,
            accession_name: accession.name,
            accession_cs_number: accession.cs_number,
            accession_longitude: accession.longitude,
            accession_latitude: accession.latitude,
            accession_country: accession.country,
            phenotype_value: v.value,
        })?;
    }
    writer.flush()?;
    Ok(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryStore;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_plink_space_delimited() {
        let text = "FID IID flowering_time leaf_number\n6909 6909 12.5 8\n7000 7000 NA 9\n";
        let table = TraitTable::parse_plink(text).unwrap();
        assert_eq!(table.names, vec!["flowering time", "leaf number"]);
        assert_eq!(table.accession_ids, vec![6909, 7000]);
        assert_relative_eq!(table.rows[0][0].unwrap(), 12.5);
        assert_eq!(table.rows[1][0], None);
        assert_eq!(table.rows[1][1], Some(9.0));
    }

    #[test]
    fn test_parse_plink_falls_back_to_tab() {
        let text = "FID\tIID\tFT10\n6909\t6909\t60\n";
        let table = TraitTable::parse_plink(text).unwrap();
        assert_eq!(table.names, vec!["FT10"]);
        assert_eq!(table.rows, vec![vec![Some(60.0)]]);
    }

    #[test]
    fn test_parse_plink_rejects_single_field_header() {
        let err = TraitTable::parse_plink("FID,IID,FT10\n1,1,2\n").unwrap_err();
        assert!(matches!(err, PhenoError::Format(_)));
        assert!(err.to_string().contains("Wrong file format"));
    }

    #[test]
    fn test_parse_plink_bad_value_names_line() {
        let err = TraitTable::parse_plink("FID IID FT\n1 1 2\n2 2 abc\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_plink_short_row_names_line() {
        let err = TraitTable::parse_plink("FID IID FT10 FT16\n1 1 2 3\n2 2 4\n").unwrap_err();
        assert!(matches!(err, PhenoError::Format(_)));
        assert!(err.to_string().contains("line 3: expected 4 fields, found 3"));
    }

    #[test]
    fn test_expression_csv_short_row_rejected() {
        let err = TraitTable::parse_expression_csv(",g1,g2\n6909,1.5\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_expression_csv() {
        let text = ",AT1G01010,AT1G01020\n6909,1.5,0\n7000,,3.25\n";
        let table = TraitTable::parse_expression_csv(text).unwrap();
        assert_eq!(table.names, vec!["AT1G01010", "AT1G01020"]);
        assert_eq!(table.rows[1], vec![None, Some(3.25)]);
    }

    #[test]
    fn test_write_plink_then_parse() {
        let table = TraitTable {
            names: vec!["flowering time".to_string()],
            accession_ids: vec![6909, 6909, 7000],
            rows: vec![vec![Some(1.5)], vec![Some(2.0)], vec![None]],
        };
        let mut out = Vec::new();
        table.write_plink(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("FID IID flowering_time\n6909 6909 1.5\n"));
        assert!(text.contains("7000 7000 NA"));
        assert_eq!(TraitTable::parse_plink(&text).unwrap(), table);
    }

    #[test]
    fn test_into_bundle_assigns_fresh_ids() {
        let table = TraitTable::parse_plink("FID IID a b\n5 5 1 NA\n5 5 2 3\n").unwrap();
        let mut ids = IdAllocator {
            next_study: 10,
            next_trait: 100,
            next_observation_unit: 1000,
        };
        let bundle = table.into_bundle("imported", TraitKind::Phenotype, None, &mut ids);
        assert_eq!(bundle.study.id, 10);
        assert_eq!(bundle.traits[1].id, 101);
        assert_eq!(bundle.observation_units.len(), 2);
        assert_eq!(bundle.accessions.len(), 1);
        assert_eq!(bundle.values.len(), 3);
        assert_eq!(ids.next_observation_unit, 1002);
    }

    #[test]
    fn test_for_trait_and_values_csv() {
        let mut store = MemoryStore::new();
        store.add_study(Study::new(1, "s"));
        store.add_trait(Trait::new(3, "FT10", 1));
        let mut col = Accession::new(6909, Some("Col-0".to_string()));
        col.country = Some("USA".to_string());
        col.latitude = Some(38.3);
        store.add_accession(col);
        store.add_observation_unit(ObservationUnit { id: 1, accession_id: 6909, study_id: 1 });
        store.add_value(3, 1, 57.0);

        let table = TraitTable::for_trait(&store, 3).unwrap();
        assert_eq!(table.accession_ids, vec![6909]);

        let mut out = Vec::new();
        assert_eq!(write_values_csv(&store, 3, &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), VALUES_CSV_HEADER.join(","));
        assert_eq!(lines.next().unwrap(), "6909,Col-0,,,38.3,USA,57.0");

        assert!(matches!(
            TraitTable::for_trait(&store, 4),
            Err(PhenoError::TraitNotFound(4))
        ));
    }
}
