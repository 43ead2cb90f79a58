//! ISA-Tab export
//!
//! Writes the five archive members for one study and zips them:
//!
//! - `i_investigation.txt`: ontology sources, investigation and study blocks
//! - `s_study<ID>.txt`: observation unit → accession and organism
//! - `a_study<ID>.txt`: observation unit → assay, protocol and data files
//! - `tdf.txt`: trait definitions with ontology cross-references
//! - `d_data.txt`: assay × trait value matrix
//!
//! The working directory and the archive file are scoped temporaries and are
//! removed on every exit path, including errors.

use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::{
    self, ACCESSION_SOURCE, ASSAY_HEADER, DERIVED_DATA_FILE, INVESTIGATION_FILE, ORGANISM_SOURCE,
    PROTOCOL_REF, STUDY_HEADER, TRAIT_DEFINITION_FILE, TRAIT_DEFINITION_HEADER,
};
use crate::config::{ArchiveSettings, CoreConfig};
use crate::error::Result;
use crate::exchange::StudyBundle;
use crate::matrix::{ColumnKey, DenseMatrix, IdentityTable, MatrixBuilder, PivotKey};
use crate::model::{AccessionId, OntologySource, Publication, Species, Trait};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const ONTOLOGY_SOURCE_REFERENCE: &str = "ONTOLOGY SOURCE REFERENCE
Term Source Name\tOBI\tEFO\tUO\tNCBITaxon\tPO\tGMI_accessions
Term Source File\thttp://data.bioontology.org/ontologies/OBI\thttp://data.bioontology.org/ontologies/EFO\thttp://purl.obolibrary.org/obo/UO\thttp://data.bioontology.org/ontologies/NCBITAXON\thttp://data.bioontology.org/ontologies/PO\thttp://gwas.gmi.oeaw.ac.at/#/taxonomy/1/passports?alleleAssayId=0
Term Source Version\t23\t118\t\t6\t10
Term Source Description\tOntology for Biomedical Investigations\tExperimental Factor Ontology\tUnit Ontology\tNational Center for Biotechnology Information (NCBI) Organismal Classification\tPlant Ontology\tCataloque of Arabidopsis accessions at GMI
";

const INVESTIGATION_PUBLICATIONS: &str = "INVESTIGATION PUBLICATIONS
Investigation PubMed ID
Investigation Publication DOI
Investigation Publication Author List
Investigation Publication Title
Investigation Publication Status
Investigation Publication Status Term Accession Number
Investigation Publication Status Term Source REF
";

const INVESTIGATION_CONTACTS: &str = "INVESTIGATION CONTACTS
Investigation Person Last Name
Investigation Person First Name
Investigation Person Mid Initials
Investigation Person Email
Investigation Person Phone
Investigation Person Fax
Investigation Person Address
Investigation Person Affiliation
Investigation Person Roles
Investigation Person Roles Term Accession Number
Investigation Person Roles Term Source REF
";

const STUDY_FACTORS: &str = "Study FACTORS
Study Factor Name
Study Factor Type
Study Factor Type Term Accession Number
Study Factor Type Term Source REF
";

const STUDY_PROTOCOLS_AND_CONTACTS: &str = "STUDY PROTOCOLS
Study Protocol Name\tData transformation
Study Protocol Type\tData transformation
Study Protocol Type Term Accession Number
Study Protocol Type Term Source REF
Study Protocol Description
Study Protocol URI
Study Protocol Version
Study Protocol Parameters Name\tTrait Definition File
Study Protocol Parameters Name Term Accession Number
Study Protocol Parameters Name Term Source REF
Study Protocol Components Name
Study Protocol Components Type
Study Protocol Components Type Term Accession Number
Study Protocol Components Type Term Source REF
STUDY CONTACTS
Study Person Last Name
Study Person First Name
Study Person Mid Initials
Study Person Email
Study Person Phone
Study Person Fax
Study Person Address
Study Person Affiliation
Study Person Roles
Study Person Roles Term Accession Number
Study Person Roles Term Source REF
";

/// Writes ISA-Tab directories and archives
#[derive(Debug, Clone)]
pub struct IsaTabExporter {
    /// Organism for studies without a species
    default_species: Species,
    archive: ArchiveSettings,
    /// Submission/release date; current local time when unset
    timestamp: Option<NaiveDateTime>,
}

impl Default for IsaTabExporter {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl IsaTabExporter {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            default_species: config.species.clone(),
            archive: config.archive.clone(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Export a study as zip archive bytes
    pub fn export(&self, bundle: &StudyBundle) -> Result<Vec<u8>> {
        let work_dir = self.archive.scoped_dir("isatab")?;
        let members = self.write_dir(bundle, work_dir.path())?;

        let mut archive = self.archive.scoped_file(".zip")?;
        {
            let mut zip = ZipWriter::new(archive.as_file_mut());
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for member in &members {
                let name = member
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                zip.start_file(name, options)?;
                zip.write_all(&fs::read(member)?)?;
            }
            zip.finish()?;
        }

        let file = archive.as_file_mut();
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        info!(
            study_id = bundle.study.id,
            members = members.len(),
            bytes = bytes.len(),
            "Exported ISA-Tab archive"
        );
        Ok(bytes)
    }

    /// Write the five members into `dir`, returning their paths
    pub fn write_dir(&self, bundle: &StudyBundle, dir: &Path) -> Result<Vec<PathBuf>> {
        let names: BTreeMap<AccessionId, String> = bundle
            .accessions
            .iter()
            .filter_map(|a| Some((a.id, a.name.clone()?)))
            .collect();
        let (identity, matrix) =
            MatrixBuilder::new(PivotKey::TraitId).build(&bundle.observed_values(), &names)?;
        let study_id = bundle.study.id;

        let investigation = dir.join(INVESTIGATION_FILE);
        fs::write(&investigation, self.render_investigation(bundle))?;

        let study = dir.join(layout::study_file_name(study_id));
        layout::write_table(&study, &STUDY_HEADER, &self.study_rows(bundle, &identity, &matrix))?;

        let assay = dir.join(layout::assay_file_name(study_id));
        layout::write_table(&assay, &ASSAY_HEADER, &assay_rows(&matrix))?;

        let tdf = dir.join(TRAIT_DEFINITION_FILE);
        layout::write_table(&tdf, &TRAIT_DEFINITION_HEADER, &trait_definition_rows(&bundle.traits))?;

        let data = dir.join(DERIVED_DATA_FILE);
        let (data_header, data_rows) = derived_data(&matrix);
        let header_refs: Vec<&str> = data_header.iter().map(String::as_str).collect();
        layout::write_table(&data, &header_refs, &data_rows)?;

        Ok(vec![investigation, study, assay, tdf, data])
    }

    fn species<'a>(&'a self, bundle: &'a StudyBundle) -> &'a Species {
        bundle.study.species.as_ref().unwrap_or(&self.default_species)
    }

    pub fn render_investigation(&self, bundle: &StudyBundle) -> String {
        let study = &bundle.study;
        let date = self
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local())
            .format(DATE_FORMAT)
            .to_string();
        let description = study.description.as_deref().unwrap_or("");

        let mut out = String::from(ONTOLOGY_SOURCE_REFERENCE);

        // writes into a String cannot fail
        let _ = write!(
            out,
            "INVESTIGATION
Investigation Identifier\tstudy{id}
Investigation Title\t{name}
Investigation Description\t{description}
Investigation Submission Date\t{date}
Investigation Public Release Date\t{date}
Comment [Created with configuration]    isaconfig-phenotyping-basic
Comment [Last Opened With Configuration]\tisaconfig-phenotyping-basic
",
            id = study.id,
            name = study.name,
        );
        out.push_str(INVESTIGATION_PUBLICATIONS);
        out.push_str(INVESTIGATION_CONTACTS);

        let _ = write!(
            out,
            "STUDY
Study Identifier\tstudy{id}
Study Title\t{name}
Study Description\t
Study Submission Date\t{date}
Study Public Release Date\t{date}
Study File Name\t{file}
STUDY DESIGN DESCRIPTORS
Study Design Type\t{description}
Study Design Type Term Accession Number\t
Study Design Type Term Source REF\t
",
            id = study.id,
            name = study.name,
            file = layout::study_file_name(study.id),
        );

        let pubs = &bundle.publications;
        let _ = write!(
            out,
            "STUDY PUBLICATIONS
Study PubMed ID\t{pubmed}
Study Publication DOI\t{doi}
Study Publication Author List\t{authors}
Study Publication Title\t{titles}
Study Publication Status\t{status}
Study Publication Status Term Accession Number\t{status_terms}
Study Publication Status Term Source REF\t{status_refs}
",
            pubmed = join_cells(pubs, |p| p.pubmed_id.clone().unwrap_or_default()),
            doi = join_cells(pubs, |p| p.doi.clone().unwrap_or_default()),
            authors = join_cells(pubs, |p| p.author_order.clone()),
            titles = join_cells(pubs, |p| p.title.clone()),
            status = join_cells(pubs, |_| "published".to_string()),
            status_terms = join_cells(pubs, |_| "1796".to_string()),
            status_refs = join_cells(pubs, |_| "EFO".to_string()),
        );
        out.push_str(STUDY_FACTORS);

        let _ = write!(
            out,
            "STUDY ASSAYS
Study Assay File Name\t{file}
Study Assay Measurement Type\tphenotyping
Study Assay Measurement Type Term Accession Number\t23
Study Assay Measurement Type Term Source REF\tOBI
Study Assay Technology Type
Study Assay Technology Type Term Accession Number
Study Assay Technology Type Term Source REF
Study Assay Technology Platform
",
            file = layout::assay_file_name(study.id),
        );
        out.push_str(STUDY_PROTOCOLS_AND_CONTACTS);
        out
    }

    fn study_rows(&self, bundle: &StudyBundle, identity: &IdentityTable, matrix: &DenseMatrix) -> Vec<Vec<String>> {
        let species = self.species(bundle);
        let organism = species.organism();
        let ncbi = species.ncbi_id.map(|id| id.to_string()).unwrap_or_default();

        matrix
            .row_ids()
            .iter()
            .filter_map(|obs| identity.get(*obs))
            .map(|row| {
                vec![
                    layout::source_name(row.accession_id),
                    organism.clone(),
                    ORGANISM_SOURCE.to_string(),
                    ncbi.clone(),
                    row.accession_name.clone().unwrap_or_default(),
                    ACCESSION_SOURCE.to_string(),
                    row.accession_id.to_string(),
                    layout::sample_name(row.observation_unit_id),
                ]
            })
            .collect()
    }
}

/// One tab-separated cell per publication
fn join_cells<F: Fn(&Publication) -> String>(publications: &[Publication], f: F) -> String {
    publications.iter().map(f).collect::<Vec<_>>().join("\t")
}

fn assay_rows(matrix: &DenseMatrix) -> Vec<Vec<String>> {
    matrix
        .row_ids()
        .iter()
        .map(|obs| {
            vec![
                layout::sample_name(*obs),
                PROTOCOL_REF.to_string(),
                TRAIT_DEFINITION_FILE.to_string(),
                layout::assay_name(*obs),
                DERIVED_DATA_FILE.to_string(),
            ]
        })
        .collect()
}

fn trait_definition_rows(traits: &[Trait]) -> Vec<Vec<String>> {
    let mut sorted: Vec<&Trait> = traits.iter().collect();
    sorted.sort_by_key(|t| t.id);

    sorted
        .into_iter()
        .map(|t| {
            let scale = t
                .uo_term
                .as_ref()
                .and_then(|r| r.term_name.clone())
                .unwrap_or_default();
            let mut row = vec![
                t.id.to_string(),
                t.name.clone(),
                t.scoring.clone().unwrap_or_default(),
                scale,
            ];
            for source in [OntologySource::Unit, OntologySource::Trait, OntologySource::Environment] {
                match t.ontology(source) {
                    Some(reference) => {
                        row.push(source.acronym().to_string());
                        row.push(reference.term_id.clone());
                    }
                    None => {
                        row.push(String::new());
                        row.push(String::new());
                    }
                }
            }
            row
        })
        .collect()
}

fn derived_data(matrix: &DenseMatrix) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header = vec![layout::ASSAY_NAME.to_string()];
    header.extend(matrix.columns().iter().map(ColumnKey::to_string));

    let rows = matrix
        .row_ids()
        .iter()
        .enumerate()
        .map(|(r, obs)| {
            let mut row = vec![layout::assay_name(*obs)];
            row.extend(
                matrix
                    .row(r)
                    .iter()
                    .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()),
            );
            row
        })
        .collect();

    (header, rows)
}
