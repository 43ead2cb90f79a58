//! Domain records shared by every module.
//!
//! These mirror what the relational store hands to the core. The core never
//! mutates them; derived structures (matrices, transformation results,
//! correlation bundles) live in their own modules.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type TraitId = i64;
pub type StudyId = i64;
pub type AccessionId = i64;
pub type ObservationUnitId = i64;

/// Ontology a cross-reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OntologySource {
    /// Trait ontology
    #[serde(rename = "TO")]
    Trait,
    /// Environment ontology
    #[serde(rename = "EO")]
    Environment,
    /// Unit ontology
    #[serde(rename = "UO")]
    Unit,
}

impl OntologySource {
    pub const ALL: [OntologySource; 3] = [
        OntologySource::Trait,
        OntologySource::Environment,
        OntologySource::Unit,
    ];

    /// Source acronym as written in exchange files.
    pub fn acronym(&self) -> &'static str {
        match self {
            OntologySource::Trait => "TO",
            OntologySource::Environment => "EO",
            OntologySource::Unit => "UO",
        }
    }
}

/// Cross-reference from a trait to an ontology term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyRef {
    pub source: OntologySource,
    /// Term id, e.g. `TO:0000207`
    pub term_id: String,
    pub term_name: Option<String>,
}

impl OntologyRef {
    pub fn new(source: OntologySource, term_id: impl Into<String>) -> Self {
        Self {
            source,
            term_id: term_id.into(),
            term_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.term_name = Some(name.into());
        self
    }
}

/// Phenotype measurement or expression (RNA-seq) score series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    #[default]
    Phenotype,
    Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub id: TraitId,
    pub name: String,
    pub study_id: StudyId,
    /// How the trait was scored (e.g. "days to flowering", "TPM")
    pub scoring: Option<String>,
    #[serde(default)]
    pub kind: TraitKind,
    pub growth_conditions: Option<String>,
    pub to_term: Option<OntologyRef>,
    pub eo_term: Option<OntologyRef>,
    pub uo_term: Option<OntologyRef>,
}

impl Trait {
    pub fn new(id: TraitId, name: impl Into<String>, study_id: StudyId) -> Self {
        Self {
            id,
            name: name.into(),
            study_id,
            scoring: None,
            kind: TraitKind::Phenotype,
            growth_conditions: None,
            to_term: None,
            eo_term: None,
            uo_term: None,
        }
    }

    pub fn ontology(&self, source: OntologySource) -> Option<&OntologyRef> {
        match source {
            OntologySource::Trait => self.to_term.as_ref(),
            OntologySource::Environment => self.eo_term.as_ref(),
            OntologySource::Unit => self.uo_term.as_ref(),
        }
    }

    pub fn set_ontology(&mut self, reference: OntologyRef) {
        match reference.source {
            OntologySource::Trait => self.to_term = Some(reference),
            OntologySource::Environment => self.eo_term = Some(reference),
            OntologySource::Unit => self.uo_term = Some(reference),
        }
    }
}

/// One physical sample: links one accession to one study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationUnit {
    pub id: ObservationUnitId,
    pub accession_id: AccessionId,
    pub study_id: StudyId,
}

/// One measurement. Absence of a record means missing data, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub trait_id: TraitId,
    pub observation_unit_id: ObservationUnitId,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accession {
    pub id: AccessionId,
    pub name: Option<String>,
    pub country: Option<String>,
    pub sitename: Option<String>,
    pub collector: Option<String>,
    pub collection_date: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Stock centre number
    pub cs_number: Option<String>,
}

impl Accession {
    pub fn new(id: AccessionId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            ..Default::default()
        }
    }

    /// Take fields from `other` only where this record has none
    pub fn fill_missing(&mut self, other: Accession) {
        self.name = self.name.take().or(other.name);
        self.country = self.country.take().or(other.country);
        self.sitename = self.sitename.take().or(other.sitename);
        self.collector = self.collector.take().or(other.collector);
        self.collection_date = self.collection_date.or(other.collection_date);
        self.latitude = self.latitude.or(other.latitude);
        self.longitude = self.longitude.or(other.longitude);
        self.cs_number = self.cs_number.take().or(other.cs_number);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub genus: String,
    pub species: String,
    pub ncbi_id: Option<i64>,
}

impl Species {
    /// Binomial as written in the organism column, e.g. "Arabidopsis thaliana".
    pub fn organism(&self) -> String {
        format!("{} {}", self.genus, self.species)
    }
}

impl Default for Species {
    fn default() -> Self {
        Self {
            genus: "Arabidopsis".to_string(),
            species: "thaliana".to_string(),
            ncbi_id: Some(3702),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: StudyId,
    pub name: String,
    pub description: Option<String>,
    pub species: Option<Species>,
}

impl Study {
    pub fn new(id: StudyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            species: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub doi: Option<String>,
    pub pubmed_id: Option<String>,
    /// Comma-separated author names in publication order
    pub author_order: String,
    pub title: String,
}

/// Long-format value record as read from the store: a [`ValueRecord`]
/// enriched with its trait name and its observation unit's accession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedValue {
    pub trait_id: TraitId,
    pub trait_name: String,
    pub observation_unit_id: ObservationUnitId,
    pub accession_id: AccessionId,
    pub value: f64,
}
