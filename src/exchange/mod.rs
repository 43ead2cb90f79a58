//! Exchange codecs
//!
//! All codecs read and write the same [`StudyBundle`] shape:
//!
//! - `isatab`: multi-file ISA-Tab archives (investigation/study/assay graph)
//! - `flat`: PLINK phenotype tables, expression CSV and per-trait value CSV
//! - `accessions`: accession passport files and accession id lists

pub mod accessions;
pub mod flat;
pub mod isatab;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::data::{AccessionLookup, PhenotypeStore};
use crate::error::{PhenoError, Result};
use crate::model::{
    Accession, AccessionId, ObservationUnit, ObservationUnitId, ObservedValue, Publication,
    Study, StudyId, Trait, TraitId, TraitKind, ValueRecord,
};

/// One study with everything needed to write or rebuild it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyBundle {
    pub study: Study,
    pub traits: Vec<Trait>,
    pub observation_units: Vec<ObservationUnit>,
    pub accessions: Vec<Accession>,
    pub values: Vec<ValueRecord>,
    pub publications: Vec<Publication>,
}

impl StudyBundle {
    /// Collect a study from the store
    pub fn from_store<S: PhenotypeStore + ?Sized>(store: &S, study_id: StudyId) -> Result<Self> {
        let study = store
            .study(study_id)
            .ok_or(PhenoError::StudyNotFound(study_id))?;
        let traits = store.traits_for_study(study_id);
        let observation_units = store.observation_units_for_study(study_id);

        let accession_ids: BTreeSet<AccessionId> =
            observation_units.iter().map(|u| u.accession_id).collect();
        let accessions = accession_ids
            .into_iter()
            .map(|id| store.accession(id).unwrap_or_else(|| Accession::new(id, None)))
            .collect();

        let values = store
            .values_for_study(study_id)
            .into_iter()
            .map(|v| ValueRecord {
                trait_id: v.trait_id,
                observation_unit_id: v.observation_unit_id,
                value: v.value,
            })
            .collect();

        Ok(Self {
            publications: store.publications_for_study(study_id),
            study,
            traits,
            observation_units,
            accessions,
            values,
        })
    }

    /// Value records joined with trait names and accessions.
    ///
    /// Records whose trait or observation unit is not part of the bundle are
    /// dropped.
    pub fn observed_values(&self) -> Vec<ObservedValue> {
        let traits: FxHashMap<TraitId, &Trait> = self.traits.iter().map(|t| (t.id, t)).collect();
        let units: FxHashMap<ObservationUnitId, &ObservationUnit> =
            self.observation_units.iter().map(|u| (u.id, u)).collect();

        self.values
            .iter()
            .filter_map(|v| {
                let t = traits.get(&v.trait_id)?;
                let unit = units.get(&v.observation_unit_id)?;
                Some(ObservedValue {
                    trait_id: t.id,
                    trait_name: t.name.clone(),
                    observation_unit_id: unit.id,
                    accession_id: unit.accession_id,
                    value: v.value,
                })
            })
            .collect()
    }
}

impl AccessionLookup for StudyBundle {
    fn accession_name(&self, accession_id: AccessionId) -> Option<String> {
        self.accessions
            .iter()
            .find(|a| a.id == accession_id)
            .and_then(|a| a.name.clone())
    }
}

/// Hands out fresh ids for imported records
#[derive(Debug, Clone)]
pub struct IdAllocator {
    pub next_study: StudyId,
    pub next_trait: TraitId,
    pub next_observation_unit: ObservationUnitId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next_study: 1,
            next_trait: 1,
            next_observation_unit: 1,
        }
    }
}

impl IdAllocator {
    pub(crate) fn study(&mut self) -> StudyId {
        let id = self.next_study;
        self.next_study += 1;
        id
    }

    pub(crate) fn trait_id(&mut self) -> TraitId {
        let id = self.next_trait;
        self.next_trait += 1;
        id
    }

    pub(crate) fn observation_unit(&mut self) -> ObservationUnitId {
        let id = self.next_observation_unit;
        self.next_observation_unit += 1;
        id
    }
}

/// Import a study file, choosing the codec by extension:
/// `.zip` ISA-Tab, `.plink` PLINK table, `.csv` expression matrix.
///
/// The study is named after the file stem for the flat formats.
pub fn import_study(path: &Path, ids: &mut IdAllocator) -> Result<StudyBundle> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("study")
        .to_string();

    match extension.as_str() {
        "zip" => isatab::import_isatab_with(path, ids),
        "plink" => Ok(flat::TraitTable::read_plink(path)?.into_bundle(
            &name,
            TraitKind::Phenotype,
            None,
            ids,
        )),
        "csv" => Ok(flat::TraitTable::read_expression_csv(path)?.into_bundle(
            &name,
            TraitKind::Expression,
            Some(flat::DEFAULT_EXPRESSION_SCORING),
            ids,
        )),
        other => Err(PhenoError::format(format!("Extension .{} not supported", other))),
    }
}
