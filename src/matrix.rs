//! MATRIX BUILDER
//!
//! Pivots long-format value records into a dense observation-unit × trait
//! table and a parallel identity table (observation unit → accession).
//!
//! Rows are sorted by observation-unit id and columns by pivot key (numeric
//! for trait ids, lexicographic for names). Cells with no record hold `None`,
//! never 0. Replicate observation units of one accession stay separate rows.

use polars::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::data::{AccessionLookup, PhenotypeStore};
use crate::error::{PhenoError, Result};
use crate::model::{AccessionId, ObservationUnitId, ObservedValue, StudyId, TraitId};

/// Which trait attribute names the matrix columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PivotKey {
    #[default]
    TraitName,
    /// Avoids collisions between traits sharing a display name
    TraitId,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum ColumnKey {
    Id(TraitId),
    Name(String),
}

impl ColumnKey {
    fn for_record(pivot: PivotKey, record: &ObservedValue) -> Self {
        match pivot {
            PivotKey::TraitId => ColumnKey::Id(record.trait_id),
            PivotKey::TraitName => ColumnKey::Name(record.trait_name.clone()),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Id(id) => write!(f, "{}", id),
            ColumnKey::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityRow {
    pub observation_unit_id: ObservationUnitId,
    pub accession_id: AccessionId,
    pub accession_name: Option<String>,
}

/// One row per observation unit, first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentityTable {
    rows: Vec<IdentityRow>,
    #[serde(skip)]
    index: FxHashMap<ObservationUnitId, usize>,
}

impl IdentityTable {
    pub fn rows(&self) -> &[IdentityRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, observation_unit_id: ObservationUnitId) -> Option<&IdentityRow> {
        self.index.get(&observation_unit_id).map(|&i| &self.rows[i])
    }

    fn push(&mut self, row: IdentityRow) {
        self.index.insert(row.observation_unit_id, self.rows.len());
        self.rows.push(row);
    }

    /// Observation units (replicates) per accession
    pub fn replicate_counts(&self) -> BTreeMap<AccessionId, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.accession_id).or_insert(0) += 1;
        }
        counts
    }
}

/// Observation unit × pivot-key table, row-major
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DenseMatrix {
    row_ids: Vec<ObservationUnitId>,
    columns: Vec<ColumnKey>,
    cells: Vec<Option<f64>>,
}

impl DenseMatrix {
    pub fn row_ids(&self) -> &[ObservationUnitId] {
        &self.row_ids
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    /// Cell by position
    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.n_rows() || col >= self.n_cols() {
            return None;
        }
        self.cells[row * self.n_cols() + col]
    }

    /// Cell by observation unit and key
    pub fn get(&self, observation_unit_id: ObservationUnitId, key: &ColumnKey) -> Option<f64> {
        let row = self.row_ids.binary_search(&observation_unit_id).ok()?;
        let col = self.columns.binary_search(key).ok()?;
        self.cell(row, col)
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        let n = self.n_cols();
        &self.cells[row * n..(row + 1) * n]
    }

    /// Full column including missing cells, in row order
    pub fn column_cells(&self, key: &ColumnKey) -> Option<Vec<Option<f64>>> {
        let col = self.columns.binary_search(key).ok()?;
        Some((0..self.n_rows()).map(|row| self.cell(row, col)).collect())
    }

    /// Non-missing values of one column, in row order
    pub fn column_values(&self, key: &ColumnKey) -> Vec<f64> {
        self.column_cells(key)
            .map(|cells| cells.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    /// Export as a DataFrame: `obs_unit_id` plus one nullable f64 column per key
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.n_cols() + 1);
        columns.push(Series::new("obs_unit_id".into(), self.row_ids.clone()).into());
        for (col, key) in self.columns.iter().enumerate() {
            let values: Vec<Option<f64>> = (0..self.n_rows()).map(|row| self.cell(row, col)).collect();
            columns.push(Series::new(key.to_string().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixBuilder {
    pivot: PivotKey,
}

impl MatrixBuilder {
    pub fn new(pivot: PivotKey) -> Self {
        Self { pivot }
    }

    /// Pivot records into (identity table, matrix).
    ///
    /// # Arguments
    /// * `records` - Every value record of the scope (one study or one accession)
    /// * `lookup` - Accession names for the identity table
    ///
    /// # Returns
    /// Empty table and matrix for zero records; `DuplicateValue` when two
    /// records share an observation unit and pivot key
    pub fn build<L: AccessionLookup + ?Sized>(
        &self,
        records: &[ObservedValue],
        lookup: &L,
    ) -> Result<(IdentityTable, DenseMatrix)> {
        // ====================================================================
        // STEP 1: Identity table, first-seen wins
        // ====================================================================
        let mut seen: FxHashSet<ObservationUnitId> = FxHashSet::default();
        let mut identity = IdentityTable::default();
        for record in records {
            if seen.insert(record.observation_unit_id) {
                identity.push(IdentityRow {
                    observation_unit_id: record.observation_unit_id,
                    accession_id: record.accession_id,
                    accession_name: lookup.accession_name(record.accession_id),
                });
            }
        }

        // ====================================================================
        // STEP 2: Sorted axes
        // ====================================================================
        let row_ids: Vec<ObservationUnitId> = seen.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let columns: Vec<ColumnKey> = records
            .iter()
            .map(|r| ColumnKey::for_record(self.pivot, r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_index: FxHashMap<ObservationUnitId, usize> =
            row_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let col_index: FxHashMap<&ColumnKey, usize> =
            columns.iter().enumerate().map(|(i, key)| (key, i)).collect();

        // ====================================================================
        // STEP 3: Fill cells
        // ====================================================================
        let n_cols = columns.len();
        let mut cells = vec![None; row_ids.len() * n_cols];
        for record in records {
            let key = ColumnKey::for_record(self.pivot, record);
            let (Some(&row), Some(&col)) = (row_index.get(&record.observation_unit_id), col_index.get(&key))
            else {
                continue;
            };
            let cell = &mut cells[row * n_cols + col];
            if cell.is_some() {
                return Err(PhenoError::DuplicateValue {
                    observation_unit_id: record.observation_unit_id,
                    column: key.to_string(),
                });
            }
            *cell = Some(record.value);
        }

        debug!(
            rows = row_ids.len(),
            columns = n_cols,
            records = records.len(),
            "Pivoted value records"
        );

        Ok((
            identity,
            DenseMatrix {
                row_ids,
                columns,
                cells,
            },
        ))
    }

    /// Matrix of every value recorded in a study
    pub fn build_for_study<S: PhenotypeStore + ?Sized>(
        &self,
        store: &S,
        study_id: StudyId,
    ) -> Result<(IdentityTable, DenseMatrix)> {
        if store.study(study_id).is_none() {
            return Err(PhenoError::StudyNotFound(study_id));
        }
        self.build(&store.values_for_study(study_id), store)
    }

    /// Matrix of every value recorded for one accession, across studies
    pub fn build_for_accession<S: PhenotypeStore + ?Sized>(
        &self,
        store: &S,
        accession_id: AccessionId,
    ) -> Result<(IdentityTable, DenseMatrix)> {
        self.build(&store.values_for_accession(accession_id), store)
    }
}
