//! Data Access
//!
//! Read-only seam between the analysis core and whatever persists studies,
//! traits, accessions and values. The core only ever asks for simple key
//! lookups and per-scope value listings.
//!
//! `MemoryStore` is the in-process implementation used by the CLI, the
//! ISA-Tab importer and the tests. `MemoryStore::load_dir` reads a directory
//! of CSV exports with Polars:
//!
//! | file                     | columns                                                        |
//! |--------------------------|----------------------------------------------------------------|
//! | studies.csv              | id, name, description?, genus?, species?, ncbi_id?             |
//! | traits.csv               | id, name, study_id, scoring?, kind?, growth_conditions?, to_term?, eo_term?, uo_term? |
//! | accessions.csv           | id, name?, country?, sitename?, latitude?, longitude?, collector?, collectiondate?, cs_number? |
//! | observation_units.csv    | id, accession_id, study_id                                     |
//! | values.csv               | trait_id, observation_unit_id, value                           |
//! | publications.csv (opt.)  | study_id, doi?, pubmed_id?, author_order?, title?              |

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::exchange::StudyBundle;
use crate::model::{
    Accession, AccessionId, ObservationUnit, ObservationUnitId, ObservedValue, OntologyRef,
    OntologySource, Publication, Species, Study, StudyId, Trait, TraitId, TraitKind, ValueRecord,
};

/// Date format of accession collection dates
pub const COLLECTION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accession id → display name
pub trait AccessionLookup {
    fn accession_name(&self, accession_id: AccessionId) -> Option<String>;
}

impl AccessionLookup for BTreeMap<AccessionId, String> {
    fn accession_name(&self, accession_id: AccessionId) -> Option<String> {
        self.get(&accession_id).cloned()
    }
}

/// Read-only store queried by the analysis engines.
///
/// Value listings come back in the store's own order; consumers that need a
/// specific order sort themselves.
pub trait PhenotypeStore: AccessionLookup {
    fn study(&self, id: StudyId) -> Option<Study>;
    fn trait_by_id(&self, id: TraitId) -> Option<Trait>;
    fn traits_for_study(&self, study_id: StudyId) -> Vec<Trait>;
    fn values_for_trait(&self, trait_id: TraitId) -> Vec<ObservedValue>;
    fn values_for_study(&self, study_id: StudyId) -> Vec<ObservedValue>;
    fn values_for_accession(&self, accession_id: AccessionId) -> Vec<ObservedValue>;
    fn observation_units_for_study(&self, study_id: StudyId) -> Vec<ObservationUnit>;
    fn accession(&self, id: AccessionId) -> Option<Accession>;
    fn publications_for_study(&self, study_id: StudyId) -> Vec<Publication>;
}

/// In-memory store. Values keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    studies: BTreeMap<StudyId, Study>,
    traits: BTreeMap<TraitId, Trait>,
    accessions: BTreeMap<AccessionId, Accession>,
    observation_units: BTreeMap<ObservationUnitId, ObservationUnit>,
    values: Vec<ValueRecord>,
    publications: Vec<(StudyId, Publication)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding exactly the contents of one bundle
    pub fn from_bundle(bundle: StudyBundle) -> Self {
        let mut store = Self::new();
        store.insert_bundle(bundle);
        store
    }

    pub fn insert_bundle(&mut self, bundle: StudyBundle) {
        let study_id = bundle.study.id;
        self.add_study(bundle.study);
        for t in bundle.traits {
            self.add_trait(t);
        }
        // imported accessions are usually bare ids; keep stored metadata
        for acc in bundle.accessions {
            match self.accessions.entry(acc.id) {
                Entry::Occupied(mut stored) => stored.get_mut().fill_missing(acc),
                Entry::Vacant(slot) => {
                    slot.insert(acc);
                }
            }
        }
        for unit in bundle.observation_units {
            self.add_observation_unit(unit);
        }
        self.values.extend(bundle.values);
        for publication in bundle.publications {
            self.add_publication(study_id, publication);
        }
    }

    pub fn add_study(&mut self, study: Study) {
        self.studies.insert(study.id, study);
    }

    pub fn add_trait(&mut self, t: Trait) {
        self.traits.insert(t.id, t);
    }

    pub fn add_accession(&mut self, accession: Accession) {
        self.accessions.insert(accession.id, accession);
    }

    pub fn add_observation_unit(&mut self, unit: ObservationUnit) {
        self.observation_units.insert(unit.id, unit);
    }

    pub fn add_value(&mut self, trait_id: TraitId, observation_unit_id: ObservationUnitId, value: f64) {
        self.values.push(ValueRecord {
            trait_id,
            observation_unit_id,
            value,
        });
    }

    pub fn add_publication(&mut self, study_id: StudyId, publication: Publication) {
        self.publications.push((study_id, publication));
    }

    pub fn studies(&self) -> impl Iterator<Item = &Study> {
        self.studies.values()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    fn observed<F>(&self, keep: F) -> Vec<ObservedValue>
    where
        F: Fn(&ValueRecord, &Trait, &ObservationUnit) -> bool,
    {
        self.values
            .iter()
            .filter_map(|record| {
                let t = self.traits.get(&record.trait_id)?;
                let Some(unit) = self.observation_units.get(&record.observation_unit_id) else {
                    warn!(
                        observation_unit_id = record.observation_unit_id,
                        "Value references unknown observation unit, skipped"
                    );
                    return None;
                };
                if !keep(record, t, unit) {
                    return None;
                }
                Some(ObservedValue {
                    trait_id: t.id,
                    trait_name: t.name.clone(),
                    observation_unit_id: unit.id,
                    accession_id: unit.accession_id,
                    value: record.value,
                })
            })
            .collect()
    }

    // ========================================================================
    // CSV directory loading
    // ========================================================================

    /// Load a store from a directory of CSV exports (see module docs)
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::new();

        let studies = read_csv(&dir.join("studies.csv"))?;
        for study in parse_studies(&studies)? {
            store.add_study(study);
        }

        let traits = read_csv(&dir.join("traits.csv"))?;
        for t in parse_traits(&traits)? {
            store.add_trait(t);
        }

        let accessions = read_csv(&dir.join("accessions.csv"))?;
        for acc in parse_accessions(&accessions)? {
            store.add_accession(acc);
        }

        let units = read_csv(&dir.join("observation_units.csv"))?;
        let ids = required_i64(&units, "id")?;
        let accession_ids = required_i64(&units, "accession_id")?;
        let study_ids = required_i64(&units, "study_id")?;
        for ((id, accession_id), study_id) in ids.into_iter().zip(accession_ids).zip(study_ids) {
            store.add_observation_unit(ObservationUnit {
                id,
                accession_id,
                study_id,
            });
        }

        let values = read_csv(&dir.join("values.csv"))?;
        let trait_ids = required_i64(&values, "trait_id")?;
        let unit_ids = required_i64(&values, "observation_unit_id")?;
        let numbers = f64_column(&values, "value")?;
        for ((trait_id, unit_id), value) in trait_ids.into_iter().zip(unit_ids).zip(numbers) {
            // empty cells are missing values, not records
            if let Some(value) = value {
                store.add_value(trait_id, unit_id, value);
            }
        }

        let publications_path = dir.join("publications.csv");
        if publications_path.exists() {
            let df = read_csv(&publications_path)?;
            let study_ids = required_i64(&df, "study_id")?;
            let dois = optional_str(&df, "doi")?;
            let pubmed = optional_str(&df, "pubmed_id")?;
            let authors = optional_str(&df, "author_order")?;
            let titles = optional_str(&df, "title")?;
            for (i, study_id) in study_ids.into_iter().enumerate() {
                store.add_publication(
                    study_id,
                    Publication {
                        doi: dois[i].clone(),
                        pubmed_id: pubmed[i].clone(),
                        author_order: authors[i].clone().unwrap_or_default(),
                        title: titles[i].clone().unwrap_or_default(),
                    },
                );
            }
        }

        info!(
            studies = store.studies.len(),
            traits = store.traits.len(),
            accessions = store.accessions.len(),
            observation_units = store.observation_units.len(),
            values = store.values.len(),
            "Loaded store from {}",
            dir.display()
        );

        Ok(store)
    }
}

impl AccessionLookup for MemoryStore {
    fn accession_name(&self, accession_id: AccessionId) -> Option<String> {
        self.accessions.get(&accession_id).and_then(|a| a.name.clone())
    }
}

impl PhenotypeStore for MemoryStore {
    fn study(&self, id: StudyId) -> Option<Study> {
        self.studies.get(&id).cloned()
    }

    fn trait_by_id(&self, id: TraitId) -> Option<Trait> {
        self.traits.get(&id).cloned()
    }

    fn traits_for_study(&self, study_id: StudyId) -> Vec<Trait> {
        self.traits
            .values()
            .filter(|t| t.study_id == study_id)
            .cloned()
            .collect()
    }

    fn values_for_trait(&self, trait_id: TraitId) -> Vec<ObservedValue> {
        self.observed(|record, _, _| record.trait_id == trait_id)
    }

    fn values_for_study(&self, study_id: StudyId) -> Vec<ObservedValue> {
        self.observed(|_, t, _| t.study_id == study_id)
    }

    fn values_for_accession(&self, accession_id: AccessionId) -> Vec<ObservedValue> {
        self.observed(|_, _, unit| unit.accession_id == accession_id)
    }

    fn observation_units_for_study(&self, study_id: StudyId) -> Vec<ObservationUnit> {
        self.observation_units
            .values()
            .filter(|u| u.study_id == study_id)
            .copied()
            .collect()
    }

    fn accession(&self, id: AccessionId) -> Option<Accession> {
        self.accessions.get(&id).cloned()
    }

    fn publications_for_study(&self, study_id: StudyId) -> Vec<Publication> {
        self.publications
            .iter()
            .filter(|(id, _)| *id == study_id)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

// ============================================================================
// Polars helpers
// ============================================================================

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .with_context(|| format!("Failed to create CSV reader: {}", path.display()))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {}", path.display()))
}

fn required_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    i64_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.with_context(|| format!("Column '{}' is empty at row {}", name, row)))
        .collect()
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("Column '{}' not found", name))?
        .cast(&DataType::Int64)
        .with_context(|| format!("Column '{}' is not integer", name))?;
    let values = column
        .i64()
        .with_context(|| format!("Column '{}' is not Int64", name))?;
    Ok(values.into_iter().collect())
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("Column '{}' not found", name))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' is not numeric", name))?;
    let values = column
        .f64()
        .with_context(|| format!("Column '{}' is not Float64", name))?;
    Ok(values.into_iter().collect())
}

fn optional_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    f64_column(df, name)
}

fn optional_i64(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    if df.column(name).is_err() {
        return Ok(vec![None; df.height()]);
    }
    i64_column(df, name)
}

/// String column with empty cells as `None`; an absent column is all `None`
fn optional_str(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let Ok(column) = df.column(name) else {
        return Ok(vec![None; df.height()]);
    };
    let column = column
        .cast(&DataType::String)
        .with_context(|| format!("Column '{}' cannot be read as text", name))?;
    let values = column
        .str()
        .with_context(|| format!("Column '{}' is not string type", name))?;
    Ok(values
        .into_iter()
        .map(|v| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect())
}

fn parse_studies(df: &DataFrame) -> Result<Vec<Study>> {
    let ids = required_i64(df, "id")?;
    let names = optional_str(df, "name")?;
    let descriptions = optional_str(df, "description")?;
    let genera = optional_str(df, "genus")?;
    let species = optional_str(df, "species")?;
    let ncbi = optional_i64(df, "ncbi_id")?;

    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| Study {
            id,
            name: names[i].clone().unwrap_or_else(|| format!("study{}", id)),
            description: descriptions[i].clone(),
            species: match (&genera[i], &species[i]) {
                (Some(genus), Some(sp)) => Some(Species {
                    genus: genus.clone(),
                    species: sp.clone(),
                    ncbi_id: ncbi[i],
                }),
                _ => None,
            },
        })
        .collect())
}

fn parse_traits(df: &DataFrame) -> Result<Vec<Trait>> {
    let ids = required_i64(df, "id")?;
    let names = optional_str(df, "name")?;
    let study_ids = required_i64(df, "study_id")?;
    let scoring = optional_str(df, "scoring")?;
    let kinds = optional_str(df, "kind")?;
    let growth = optional_str(df, "growth_conditions")?;
    let to_terms = optional_str(df, "to_term")?;
    let eo_terms = optional_str(df, "eo_term")?;
    let uo_terms = optional_str(df, "uo_term")?;

    let mut traits = Vec::with_capacity(ids.len());
    for (i, id) in ids.into_iter().enumerate() {
        let name = names[i]
            .clone()
            .with_context(|| format!("Trait {} has no name", id))?;
        let mut t = Trait::new(id, name, study_ids[i]);
        t.scoring = scoring[i].clone();
        t.growth_conditions = growth[i].clone();
        t.kind = match kinds[i].as_deref() {
            Some("expression") => TraitKind::Expression,
            _ => TraitKind::Phenotype,
        };
        for (source, term) in [
            (OntologySource::Trait, &to_terms[i]),
            (OntologySource::Environment, &eo_terms[i]),
            (OntologySource::Unit, &uo_terms[i]),
        ] {
            if let Some(term_id) = term {
                t.set_ontology(OntologyRef::new(source, term_id.clone()));
            }
        }
        traits.push(t);
    }
    Ok(traits)
}

fn parse_accessions(df: &DataFrame) -> Result<Vec<Accession>> {
    let ids = required_i64(df, "id")?;
    let names = optional_str(df, "name")?;
    let countries = optional_str(df, "country")?;
    let sites = optional_str(df, "sitename")?;
    let latitudes = optional_f64(df, "latitude")?;
    let longitudes = optional_f64(df, "longitude")?;
    let collectors = optional_str(df, "collector")?;
    let dates = optional_str(df, "collectiondate")?;
    let cs_numbers = optional_str(df, "cs_number")?;

    let mut accessions = Vec::with_capacity(ids.len());
    for (i, id) in ids.into_iter().enumerate() {
        let collection_date = match &dates[i] {
            Some(raw) => Some(
                NaiveDateTime::parse_from_str(raw, COLLECTION_DATE_FORMAT)
                    .with_context(|| format!("Accession {}: bad collection date '{}'", id, raw))?,
            ),
            None => None,
        };
        accessions.push(Accession {
            id,
            name: names[i].clone(),
            country: countries[i].clone(),
            sitename: sites[i].clone(),
            collector: collectors[i].clone(),
            collection_date,
            latitude: latitudes[i],
            longitude: longitudes[i],
            cs_number: cs_numbers[i].clone(),
        });
    }
    Ok(accessions)
}
