//! ISA-Tab import
//!
//! Parses an archive (zip file, zip bytes or extracted directory) into a
//! [`StudyBundle`]. Only single-study archives are supported. The study, its
//! traits and its observation units receive fresh ids from an [`IdAllocator`].
//!
//! Graph resolution:
//!   1. investigation file → study file + assay files (phenotyping only)
//!   2. study file → sample name → accession
//!   3. assay rows → (sample, trait definition file, assay name, data file)
//!   4. one trait map per definition file, one data map per data file
//!   5. every non-empty (assay, variable) cell → value record

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::layout::{
    self, cell, Table, ASSAY_NAME, DERIVED_DATA_COLUMN, INFRASPECIFIC_NAME, INVESTIGATION_FILE,
    METHOD, ORGANISM, PHENOTYPING_TERM_ACCESSIONS, SAMPLE_NAME, SCALE, TERM_ACCESSION_NUMBER,
    TERM_SOURCE_REF, TRAIT, TRAIT_DEFINITION_COLUMN, VARIABLE_ID,
};
use crate::config::ArchiveSettings;
use crate::error::{PhenoError, Result};
use crate::exchange::{IdAllocator, StudyBundle};
use crate::model::{
    Accession, AccessionId, ObservationUnit, ObservationUnitId, OntologyRef, OntologySource,
    Publication, Species, Study, StudyId, Trait, TraitId, ValueRecord,
};

/// Import a zip archive or an extracted ISA-Tab directory
pub fn import_isatab(path: &Path) -> Result<StudyBundle> {
    import_isatab_with(path, &mut IdAllocator::default())
}

pub fn import_isatab_with(path: &Path, ids: &mut IdAllocator) -> Result<StudyBundle> {
    import_isatab_in(path, ids, &ArchiveSettings::default())
}

/// Import with archives extracted under `archive.temp_root`
pub fn import_isatab_in(
    path: &Path,
    ids: &mut IdAllocator,
    archive: &ArchiveSettings,
) -> Result<StudyBundle> {
    if path.is_dir() {
        return parse_dir(path, ids);
    }
    if !path.exists() {
        return Err(PhenoError::format(format!(
            "File or folder {} does not exist",
            path.display()
        )));
    }
    let file = fs::File::open(path)?;
    extract_and_parse(ZipArchive::new(file)?, ids, archive)
}

/// Import archive bytes, e.g. an uploaded file
pub fn import_isatab_bytes(bytes: &[u8], ids: &mut IdAllocator) -> Result<StudyBundle> {
    import_isatab_bytes_in(bytes, ids, &ArchiveSettings::default())
}

pub fn import_isatab_bytes_in(
    bytes: &[u8],
    ids: &mut IdAllocator,
    archive: &ArchiveSettings,
) -> Result<StudyBundle> {
    extract_and_parse(ZipArchive::new(Cursor::new(bytes))?, ids, archive)
}

fn extract_and_parse<R: std::io::Read + std::io::Seek>(
    mut zip: ZipArchive<R>,
    ids: &mut IdAllocator,
    archive: &ArchiveSettings,
) -> Result<StudyBundle> {
    // removed on drop, on success and on error alike
    let work_dir = archive.scoped_dir("isatab")?;
    zip.extract(work_dir.path())?;

    // archives zipped with an enclosing folder
    let root = locate_investigation(work_dir.path())?;
    parse_dir(&root, ids)
}

fn locate_investigation(dir: &Path) -> Result<PathBuf> {
    if dir.join(INVESTIGATION_FILE).exists() {
        return Ok(dir.to_path_buf());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(INVESTIGATION_FILE).exists() {
            return Ok(path);
        }
    }
    Err(PhenoError::format(format!("archive has no {}", INVESTIGATION_FILE)))
}

// ============================================================================
// Investigation file
// ============================================================================

/// Key → values of the investigation-level and study-level rows
#[derive(Debug, Default)]
struct Investigation {
    study_count: usize,
    investigation: BTreeMap<String, Vec<String>>,
    study: BTreeMap<String, Vec<String>>,
}

impl Investigation {
    fn parse(text: &str) -> Self {
        let mut parsed = Investigation::default();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim() == "STUDY" {
                parsed.study_count += 1;
                continue;
            }
            let mut cells = line.split('\t').map(unquote);
            let Some(key) = cells.next() else { continue };
            let mut values: Vec<String> = cells.collect();
            while values.last().is_some_and(|v| v.is_empty()) {
                values.pop();
            }

            if key.starts_with("Study ") {
                parsed.study.entry(key).or_insert(values);
            } else if key.starts_with("Investigation ") {
                parsed.investigation.entry(key).or_insert(values);
            }
        }
        parsed
    }

    fn study_values(&self, key: &str) -> &[String] {
        row_values(&self.study, key)
    }

    fn study_first(&self, key: &str) -> Option<String> {
        self.study_values(key).first().filter(|v| !v.is_empty()).cloned()
    }

    fn publications(&self) -> Vec<Publication> {
        let mut out: Vec<Publication> = Vec::new();
        for (map, prefix) in [(&self.investigation, "Investigation"), (&self.study, "Study")] {
            let pubmed = row_values(map, &format!("{} PubMed ID", prefix));
            let doi = row_values(map, &format!("{} Publication DOI", prefix));
            let authors = row_values(map, &format!("{} Publication Author List", prefix));
            let titles = row_values(map, &format!("{} Publication Title", prefix));
            let n = [pubmed.len(), doi.len(), authors.len(), titles.len()]
                .into_iter()
                .max()
                .unwrap_or(0);

            for i in 0..n {
                let at = |v: &[String]| v.get(i).filter(|s| !s.is_empty()).cloned();
                let publication = Publication {
                    doi: at(doi),
                    pubmed_id: at(pubmed),
                    author_order: at(authors).unwrap_or_default(),
                    title: at(titles).unwrap_or_default(),
                };
                let empty = publication.doi.is_none()
                    && publication.pubmed_id.is_none()
                    && publication.title.is_empty()
                    && publication.author_order.is_empty();
                let duplicate = out
                    .iter()
                    .any(|p| p.doi.is_some() && p.doi == publication.doi);
                if !empty && !duplicate {
                    out.push(publication);
                }
            }
        }
        out
    }
}

fn row_values<'a>(map: &'a BTreeMap<String, Vec<String>>, key: &str) -> &'a [String] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

fn unquote(cell: &str) -> String {
    let cell = cell.trim();
    cell.strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(cell)
        .to_string()
}

// ============================================================================
// Member files
// ============================================================================

/// Resolve a member name referenced from another file inside `dir`
fn member_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if name.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(PhenoError::format(format!("invalid member file name '{}'", name)));
    }
    let path = dir.join(relative);
    if !path.is_file() {
        return Err(PhenoError::format(format!("referenced file {} is missing", name)));
    }
    Ok(path)
}

struct Sample {
    observation_unit_id: ObservationUnitId,
}

/// Variable id → imported trait id, for one trait definition file
type TraitMap = FxHashMap<String, TraitId>;

/// Assay name → (variable id, cell) pairs, for one derived data file
type DerivedDataMap = FxHashMap<String, Vec<(String, String)>>;

fn parse_dir(dir: &Path, ids: &mut IdAllocator) -> Result<StudyBundle> {
    // ========================================================================
    // STEP 1: Investigation
    // ========================================================================
    let text = fs::read_to_string(member_path(dir, INVESTIGATION_FILE)?)?;
    let investigation = Investigation::parse(&text);
    match investigation.study_count {
        0 => return Err(PhenoError::format("investigation file has no STUDY block")),
        1 => {}
        n => return Err(PhenoError::MultipleStudies(n)),
    }

    let study_file = investigation
        .study_first("Study File Name")
        .ok_or_else(|| PhenoError::format("investigation file has no Study File Name"))?;

    // ========================================================================
    // STEP 2: Study file (samples and accessions)
    // ========================================================================
    let study_table = layout::read_table(&member_path(dir, &study_file)?)?;
    let study_id = ids.study();
    let (samples, units, accessions, species) = parse_study_file(&study_table, &study_file, study_id, ids)?;

    let study = Study {
        id: study_id,
        name: investigation
            .study_first("Study Title")
            .or_else(|| investigation.study_first("Study Identifier"))
            .unwrap_or_else(|| format!("study{}", study_id)),
        description: investigation.study_first("Study Design Type"),
        species,
    };

    // ========================================================================
    // STEP 3: Phenotyping assays
    // ========================================================================
    let assay_files = investigation.study_values("Study Assay File Name");
    let measurement_types =
        investigation.study_values("Study Assay Measurement Type Term Accession Number");

    let mut traits: Vec<Trait> = Vec::new();
    let mut trait_maps: BTreeMap<String, TraitMap> = BTreeMap::new();
    let mut data_maps: BTreeMap<String, DerivedDataMap> = BTreeMap::new();
    let mut values: Vec<ValueRecord> = Vec::new();

    for (i, assay_file) in assay_files.iter().enumerate() {
        if assay_file.is_empty() {
            continue;
        }
        let measurement = measurement_types.get(i).map(String::as_str).unwrap_or("");
        if !PHENOTYPING_TERM_ACCESSIONS.contains(&measurement) {
            debug!(assay_file = %assay_file, measurement, "Skipping non-phenotyping assay");
            continue;
        }

        let table = layout::read_table(&member_path(dir, assay_file)?)?;
        let sample_col = table.require_column(SAMPLE_NAME, assay_file)?;
        let tdf_col = table.require_column(TRAIT_DEFINITION_COLUMN, assay_file)?;
        let assay_col = table.require_column(ASSAY_NAME, assay_file)?;
        let data_col = table.require_column(DERIVED_DATA_COLUMN, assay_file)?;

        for row in &table.rows {
            let sample_name = cell(row, sample_col);
            let tdf_name = cell(row, tdf_col);
            let assay_name = cell(row, assay_col);
            let data_name = cell(row, data_col);
            if sample_name.is_empty() {
                continue;
            }

            let sample = samples.get(sample_name).ok_or_else(|| {
                PhenoError::format(format!("{}: unknown sample '{}'", assay_file, sample_name))
            })?;

            if !trait_maps.contains_key(tdf_name) {
                let tdf = layout::read_table(&member_path(dir, tdf_name)?)?;
                let map = parse_trait_definitions(&tdf, tdf_name, study_id, ids, &mut traits)?;
                trait_maps.insert(tdf_name.to_string(), map);
            }
            if !data_maps.contains_key(data_name) {
                let data = layout::read_table(&member_path(dir, data_name)?)?;
                data_maps.insert(data_name.to_string(), parse_derived_data(&data, data_name)?);
            }
            let (Some(trait_map), Some(data_map)) = (trait_maps.get(tdf_name), data_maps.get(data_name))
            else {
                continue;
            };

            let cells = data_map.get(assay_name).ok_or_else(|| {
                PhenoError::format(format!("{}: no row for assay '{}'", data_name, assay_name))
            })?;

            for (variable, raw) in cells {
                if raw.is_empty() {
                    continue;
                }
                let trait_id = *trait_map.get(variable).ok_or_else(|| {
                    PhenoError::format(format!("{}: unknown variable id '{}'", tdf_name, variable))
                })?;
                let value: f64 = raw.parse().map_err(|_| {
                    PhenoError::format(format!(
                        "{}: value '{}' for {} / {} is not a number",
                        data_name, raw, assay_name, variable
                    ))
                })?;
                values.push(ValueRecord {
                    trait_id,
                    observation_unit_id: sample.observation_unit_id,
                    value,
                });
            }
        }
    }

    if trait_maps.is_empty() {
        warn!("ISA-Tab archive contains no phenotyping assay");
    }

    let publications = investigation.publications();
    info!(
        study = %study.name,
        traits = traits.len(),
        observation_units = units.len(),
        values = values.len(),
        "Imported ISA-Tab study"
    );

    Ok(StudyBundle {
        study,
        traits,
        observation_units: units,
        accessions,
        values,
        publications,
    })
}

type StudyFileContents = (
    FxHashMap<String, Sample>,
    Vec<ObservationUnit>,
    Vec<Accession>,
    Option<Species>,
);

fn parse_study_file(
    table: &Table,
    file: &str,
    study_id: StudyId,
    ids: &mut IdAllocator,
) -> Result<StudyFileContents> {
    let sample_col = table.require_column(SAMPLE_NAME, file)?;
    let name_col = table.require_column(INFRASPECIFIC_NAME, file)?;
    let accession_col = following_column(table, name_col, TERM_ACCESSION_NUMBER)
        .ok_or_else(|| PhenoError::format(format!("{}: no accession number column", file)))?;
    let organism_col = table.column(ORGANISM);
    let taxon_col = organism_col.and_then(|c| following_column(table, c, TERM_ACCESSION_NUMBER));

    let mut samples: FxHashMap<String, Sample> = FxHashMap::default();
    let mut units = Vec::new();
    let mut accessions: Vec<Accession> = Vec::new();
    let mut species: Option<Species> = None;

    for row in &table.rows {
        let sample_name = cell(row, sample_col);
        if sample_name.is_empty() || samples.contains_key(sample_name) {
            continue;
        }
        let raw_accession = cell(row, accession_col);
        let accession_id: AccessionId = raw_accession.parse().map_err(|_| {
            PhenoError::format(format!(
                "{}: accession number '{}' of {} is not an integer",
                file, raw_accession, sample_name
            ))
        })?;

        if !accessions.iter().any(|a| a.id == accession_id) {
            let name = cell(row, name_col);
            let name = (!name.is_empty()).then(|| name.to_string());
            accessions.push(Accession::new(accession_id, name));
        }

        if species.is_none() {
            species = organism_col.and_then(|c| parse_species(cell(row, c), taxon_col.map(|t| cell(row, t))));
        }

        let observation_unit_id = ids.observation_unit();
        units.push(ObservationUnit {
            id: observation_unit_id,
            accession_id,
            study_id,
        });
        samples.insert(sample_name.to_string(), Sample { observation_unit_id });
    }

    Ok((samples, units, accessions, species))
}

/// First column named `name` after position `after`
fn following_column(table: &Table, after: usize, name: &str) -> Option<usize> {
    table
        .header
        .iter()
        .enumerate()
        .skip(after + 1)
        .find(|(_, h)| h.as_str() == name)
        .map(|(i, _)| i)
}

fn parse_species(organism: &str, taxon: Option<&str>) -> Option<Species> {
    let (genus, species) = organism.trim().split_once(' ')?;
    // accept "3702" as well as "NCBITaxon_3702" or a term URI
    let ncbi_id = taxon.and_then(|t| {
        let digits: String = t.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
        digits.chars().rev().collect::<String>().parse().ok()
    });
    Some(Species {
        genus: genus.to_string(),
        species: species.trim().to_string(),
        ncbi_id,
    })
}

fn parse_trait_definitions(
    table: &Table,
    file: &str,
    study_id: StudyId,
    ids: &mut IdAllocator,
    traits: &mut Vec<Trait>,
) -> Result<TraitMap> {
    let id_col = table.column(VARIABLE_ID).unwrap_or(0);
    let trait_col = table.require_column(TRAIT, file)?;
    let method_col = table.require_column(METHOD, file)?;
    let scale_col = table.column(SCALE);
    let ref_cols: Vec<usize> = table
        .header
        .iter()
        .enumerate()
        .filter(|(_, h)| h.as_str() == TERM_SOURCE_REF)
        .map(|(i, _)| i)
        .collect();

    let mut map = TraitMap::default();
    for row in &table.rows {
        let variable = cell(row, id_col);
        let name = cell(row, trait_col);
        if variable.is_empty() || name.is_empty() {
            return Err(PhenoError::format(format!(
                "{}: trait definition without variable id or name",
                file
            )));
        }
        if map.contains_key(variable) {
            return Err(PhenoError::format(format!(
                "{}: duplicate variable id '{}'",
                file, variable
            )));
        }

        let mut t = Trait::new(ids.trait_id(), name, study_id);
        let method = cell(row, method_col);
        t.scoring = (!method.is_empty()).then(|| method.to_string());

        for &col in &ref_cols {
            let token = cell(row, col);
            let Some(source) = OntologySource::ALL.iter().find(|s| s.acronym() == token) else {
                continue;
            };
            let term = cell(row, col + 1);
            if term.is_empty() {
                continue;
            }
            let mut reference = OntologyRef::new(*source, term);
            if *source == OntologySource::Unit {
                if let Some(scale) = scale_col.map(|c| cell(row, c)).filter(|s| !s.is_empty()) {
                    reference = reference.with_name(scale);
                }
            }
            t.set_ontology(reference);
        }

        map.insert(variable.to_string(), t.id);
        traits.push(t);
    }
    Ok(map)
}

fn parse_derived_data(table: &Table, file: &str) -> Result<DerivedDataMap> {
    let assay_col = table.require_column(ASSAY_NAME, file)?;
    let mut map = DerivedDataMap::default();
    for row in &table.rows {
        let assay = cell(row, assay_col);
        if assay.is_empty() {
            continue;
        }
        let cells: Vec<(String, String)> = table
            .header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != assay_col)
            .map(|(i, variable)| (variable.clone(), cell(row, i).to_string()))
            .collect();
        map.insert(assay.to_string(), cells);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVESTIGATION: &str = "INVESTIGATION
Investigation Identifier\tstudy3
Investigation PubMed ID\t123
Investigation Publication DOI\t10.1/a
Investigation Publication Title\tFirst
STUDY
Study Identifier\tstudy3
Study Title\tDrought
Study File Name\ts_study3.txt
Study Design Type\tDrought response
Study PubMed ID\t\t456
Study Publication DOI\t10.1/a\t10.1/b
Study Publication Author List\tX\tY
Study Publication Title\tFirst\tSecond
Study Assay File Name\ta_study3.txt\ta_rna.txt
Study Assay Measurement Type Term Accession Number\t0000023\t424
";

    fn write_archive_dir(dir: &Path, investigation: &str) {
        fs::write(dir.join(INVESTIGATION_FILE), investigation).unwrap();
        fs::write(
            dir.join("s_study3.txt"),
            "Source Name\tCharacteristics[Organism]\tTerm Source REF\tTerm Accession Number\tCharacteristics[Infraspecific name]\tTerm Source REF\tTerm Accession Number\tSample Name\n\
             source6909\tArabidopsis thaliana\tNCBITaxon\t3702\tCol-0\tGMI_accessions\t6909\tsample1\n\
             source6909\tArabidopsis thaliana\tNCBITaxon\t3702\tCol-0\tGMI_accessions\t6909\tsample2\n\
             source6910\tArabidopsis thaliana\tNCBITaxon\t3702\t\tGMI_accessions\t6910\tsample3\n",
        )
        .unwrap();
        fs::write(
            dir.join("a_study3.txt"),
            "Sample Name\tProtocol REF\tParameter Value[Trait Definition File]\tAssay Name\tDerived Data File\n\
             sample1\tData transformation\ttdf.txt\tassay1\td_data.txt\n\
             sample2\tData transformation\ttdf.txt\tassay2\td_data.txt\n\
             sample3\tData transformation\ttdf.txt\tassay3\td_data.txt\n",
        )
        .unwrap();
        fs::write(
            dir.join("tdf.txt"),
            "Variable ID\tTrait\tMethod\tScale\tTerm Source REF\tTerm Accession Number\tTerm Source REF\tTerm Accession Number\tTerm Source REF\tTerm Accession Number\n\
             10\tLeaf area\tscan\tcm2\tUO\tUO:0000081\tTO\tTO:0000540\t\t\n\
             11\tRosette\t\t\t\t\t\t\tEO\tEO:0007404\n",
        )
        .unwrap();
        fs::write(
            dir.join("d_data.txt"),
            "Assay Name\t10\t11\nassay1\t1.5\t\nassay2\t2.5\t7\nassay3\t\t8.25\n",
        )
        .unwrap();
    }

    #[test]
    fn test_import_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_archive_dir(dir.path(), INVESTIGATION);

        let bundle = import_isatab(dir.path()).unwrap();
        assert_eq!(bundle.study.name, "Drought");
        assert_eq!(bundle.study.description.as_deref(), Some("Drought response"));
        assert_eq!(bundle.study.species.as_ref().unwrap().ncbi_id, Some(3702));

        assert_eq!(bundle.observation_units.len(), 3);
        assert_eq!(bundle.accessions.len(), 2);
        assert!(bundle.accessions[1].name.is_none());

        assert_eq!(bundle.traits.len(), 2);
        let leaf = &bundle.traits[0];
        assert_eq!(leaf.scoring.as_deref(), Some("scan"));
        assert_eq!(leaf.to_term.as_ref().unwrap().term_id, "TO:0000540");
        let unit = leaf.uo_term.as_ref().unwrap();
        assert_eq!(unit.term_name.as_deref(), Some("cm2"));
        assert!(leaf.eo_term.is_none());
        let rosette = &bundle.traits[1];
        assert_eq!(rosette.eo_term.as_ref().unwrap().term_id, "EO:0007404");
        assert!(rosette.to_term.is_none() && rosette.scoring.is_none());

        // four non-empty cells
        assert_eq!(bundle.values.len(), 4);
        let sum: f64 = bundle.values.iter().map(|v| v.value).sum();
        assert_eq!(sum, 1.5 + 2.5 + 7.0 + 8.25);
    }

    #[test]
    fn test_publications_deduplicated_by_doi() {
        let parsed = Investigation::parse(INVESTIGATION);
        let pubs = parsed.publications();
        assert_eq!(pubs.len(), 2);
        assert_eq!(pubs[0].pubmed_id.as_deref(), Some("123"));
        assert_eq!(pubs[1].title, "Second");
        assert_eq!(pubs[1].pubmed_id.as_deref(), Some("456"));
    }

    #[test]
    fn test_multiple_studies_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let doubled = format!("{}STUDY\nStudy Identifier\tstudy4\n", INVESTIGATION);
        write_archive_dir(dir.path(), &doubled);

        let err = import_isatab(dir.path()).unwrap_err();
        assert!(matches!(err, PhenoError::MultipleStudies(2)));
    }

    #[test]
    fn test_unknown_variable_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        write_archive_dir(dir.path(), INVESTIGATION);
        fs::write(dir.path().join("d_data.txt"), "Assay Name\t99\nassay1\t1.0\nassay2\t\nassay3\t\n").unwrap();

        let err = import_isatab(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unknown variable id '99'"));
    }

    fn zip_dir(dir: &Path) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            zip.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
            std::io::Write::write_all(&mut zip, &fs::read(&path).unwrap()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extraction_dir_removed() {
        let source = tempfile::tempdir().unwrap();
        write_archive_dir(source.path(), INVESTIGATION);
        let bytes = zip_dir(source.path());

        let root = tempfile::tempdir().unwrap();
        let settings = ArchiveSettings {
            temp_root: Some(root.path().to_path_buf()),
        };

        let bundle = import_isatab_bytes_in(&bytes, &mut IdAllocator::default(), &settings).unwrap();
        assert_eq!(bundle.values.len(), 4);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);

        // failing import
        fs::write(source.path().join("d_data.txt"), "Assay Name\t99\nassay1\t1.0\nassay2\t\nassay3\t\n").unwrap();
        let bytes = zip_dir(source.path());
        let err = import_isatab_bytes_in(&bytes, &mut IdAllocator::default(), &settings).unwrap_err();
        assert!(err.to_string().contains("unknown variable id '99'"));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_file_extracts_under_temp_root() {
        let source = tempfile::tempdir().unwrap();
        write_archive_dir(source.path(), INVESTIGATION);
        let out = tempfile::tempdir().unwrap();
        let archive_path = out.path().join("study.zip");
        fs::write(&archive_path, zip_dir(source.path())).unwrap();

        let root = tempfile::tempdir().unwrap();
        let settings = ArchiveSettings {
            temp_root: Some(root.path().to_path_buf()),
        };
        let bundle = import_isatab_in(&archive_path, &mut IdAllocator::default(), &settings).unwrap();
        assert_eq!(bundle.traits.len(), 2);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_member_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(member_path(dir.path(), "../etc/passwd").is_err());
        assert!(member_path(dir.path(), "/etc/passwd").is_err());
        assert!(member_path(dir.path(), "missing.txt").is_err());
    }

    #[test]
    fn test_species_parsing() {
        let species = parse_species("Arabidopsis thaliana", Some("NCBITaxon_3702")).unwrap();
        assert_eq!(species.organism(), "Arabidopsis thaliana");
        assert_eq!(species.ncbi_id, Some(3702));
        assert!(parse_species("", None).is_none());
    }
}
