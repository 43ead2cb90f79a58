//! CORRELATION ENGINE
//!
//! Pairwise Pearson/Spearman correlation and sample-overlap statistics for a
//! set of traits, packaged for the correlation heat map, scatter and Venn
//! views.
//!
//! **Alignment**: for each pair of traits, every position of trait i is
//! matched with every position of trait j carrying the same accession id.
//! An accession repeated within one trait (replicate observation units)
//! therefore contributes the product of its repeat counts. This over-counting
//! is the established behaviour of the correlation views and is kept as is.
//!
//! **Undefined cells**: fewer than two aligned pairs or zero variance yield
//! `None`, serialized as the string `"NaN"` because JSON has no NaN.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::data::PhenotypeStore;
use crate::error::{PhenoError, Result};
use crate::model::{AccessionId, Trait, TraitId};
use crate::utils::rank::rank_average;

/// Marker written for undefined correlation cells
pub const NAN_MARKER: &str = "NaN";

/// Pearson product-moment correlation.
///
/// `None` when the slices differ in length, hold fewer than two pairs, or
/// either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Spearman rank correlation: Pearson on average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    pearson(&rank_average(x), &rank_average(y))
}

/// Axis entry of the heat map
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AxisDescriptor {
    pub label: String,
    /// Position in the request and in both matrices
    pub index: usize,
    #[serde(rename = "pheno_id")]
    pub trait_id: TraitId,
}

/// Raw values of one trait for client-side scatter plots
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScatterSeries {
    #[serde(rename = "pheno_id")]
    pub trait_id: TraitId,
    pub label: String,
    pub values: Vec<f64>,
    /// Accession id per value, duplicates allowed
    pub samples: Vec<AccessionId>,
}

/// Sample overlap between two traits (Venn diagram)
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OverlapRecord {
    #[serde(rename = "labelA")]
    pub label_a: String,
    #[serde(rename = "labelA_id")]
    pub label_a_id: TraitId,
    #[serde(rename = "labelB")]
    pub label_b: String,
    #[serde(rename = "labelB_id")]
    pub label_b_id: TraitId,
    /// Values of trait A
    #[serde(rename = "A")]
    pub a: usize,
    /// Values of trait B
    #[serde(rename = "B")]
    pub b: usize,
    /// Distinct accessions shared by A and B
    #[serde(rename = "C")]
    pub c: usize,
}

/// Square matrix with optional cells (row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    size: usize,
    cells: Vec<Option<f64>>,
}

impl CorrelationMatrix {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    fn set_symmetric(&mut self, i: usize, j: usize, value: Option<f64>) {
        self.cells[i * self.size + j] = value;
        self.cells[j * self.size + i] = value;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Cell (i, j); `None` when undefined or out of bounds
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.size || j >= self.size {
            return None;
        }
        self.cells[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[Option<f64>] {
        &self.cells[i * self.size..(i + 1) * self.size]
    }
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum CellRepr {
    Value(f64),
    Marker(&'static str),
}

struct RowRepr<'a>(&'a [Option<f64>]);

impl Serialize for RowRepr<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for cell in self.0 {
            match cell {
                Some(v) => seq.serialize_element(&CellRepr::Value(*v))?,
                None => seq.serialize_element(&CellRepr::Marker(NAN_MARKER))?,
            }
        }
        seq.end()
    }
}

impl Serialize for CorrelationMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.size))?;
        for i in 0..self.size {
            seq.serialize_element(&RowRepr(self.row(i)))?;
        }
        seq.end()
    }
}

/// Everything the correlation views need, in request order
#[derive(Debug, Clone, serde::Serialize)]
pub struct CorrelationBundle {
    pub axes: Vec<AxisDescriptor>,
    pub scatter: Vec<ScatterSeries>,
    #[serde(rename = "venn")]
    pub overlaps: Vec<OverlapRecord>,
    pub pearson: CorrelationMatrix,
    pub spearman: CorrelationMatrix,
}

pub struct CorrelationEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: PhenotypeStore + ?Sized> CorrelationEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Correlate the requested traits.
    ///
    /// All ids are resolved before any computation; the first unknown id
    /// fails the whole request with [`PhenoError::TraitNotFound`].
    pub fn correlate(&self, trait_ids: &[TraitId]) -> Result<CorrelationBundle> {
        // ====================================================================
        // STEP 1: Resolve every trait
        // ====================================================================
        let mut traits: Vec<Trait> = Vec::with_capacity(trait_ids.len());
        for &id in trait_ids {
            let t = self
                .store
                .trait_by_id(id)
                .ok_or(PhenoError::TraitNotFound(id))?;
            traits.push(t);
        }

        // ====================================================================
        // STEP 2: Per-trait sample and value vectors (store order)
        // ====================================================================
        let scatter: Vec<ScatterSeries> = traits
            .iter()
            .map(|t| {
                let (samples, values) = self
                    .store
                    .values_for_trait(t.id)
                    .into_iter()
                    .map(|v| (v.accession_id, v.value))
                    .unzip();
                ScatterSeries {
                    trait_id: t.id,
                    label: self.label_for(t),
                    values,
                    samples,
                }
            })
            .collect();

        let axes: Vec<AxisDescriptor> = scatter
            .iter()
            .enumerate()
            .map(|(index, s)| AxisDescriptor {
                label: s.label.clone(),
                index,
                trait_id: s.trait_id,
            })
            .collect();

        // ====================================================================
        // STEP 3: Upper triangle (diagonal included), mirrored
        // ====================================================================
        let n = scatter.len();
        let mut pearson_m = CorrelationMatrix::new(n);
        let mut spearman_m = CorrelationMatrix::new(n);
        let mut overlaps = Vec::with_capacity(n * n.saturating_sub(1) / 2);

        for i in 0..n {
            for j in i..n {
                let (x, y) = align(&scatter[i], &scatter[j]);
                pearson_m.set_symmetric(i, j, pearson(&x, &y));
                spearman_m.set_symmetric(i, j, spearman(&x, &y));
                debug!(
                    trait_a = scatter[i].trait_id,
                    trait_b = scatter[j].trait_id,
                    pairs = x.len(),
                    "Aligned trait pair"
                );

                if i < j {
                    overlaps.push(overlap(&scatter[i], &scatter[j]));
                }
            }
        }

        info!(traits = n, overlaps = overlaps.len(), "Correlation bundle built");

        Ok(CorrelationBundle {
            axes,
            scatter,
            overlaps,
            pearson: pearson_m,
            spearman: spearman_m,
        })
    }

    fn label_for(&self, t: &Trait) -> String {
        match self.store.study(t.study_id) {
            Some(study) => format!("{} ({})", t.name, study.name),
            None => t.name.clone(),
        }
    }
}

/// Cross-product alignment of two series on accession id.
///
/// Pairs come out in the order of a nested loop over positions of `a`
/// then positions of `b`.
fn align(a: &ScatterSeries, b: &ScatterSeries) -> (Vec<f64>, Vec<f64>) {
    let mut positions: FxHashMap<AccessionId, SmallVec<[usize; 2]>> = FxHashMap::default();
    for (pos, acc) in b.samples.iter().enumerate() {
        positions.entry(*acc).or_default().push(pos);
    }

    let mut x = Vec::new();
    let mut y = Vec::new();
    for (acc, &value) in a.samples.iter().zip(a.values.iter()) {
        if let Some(matches) = positions.get(acc) {
            for &pos in matches {
                x.push(value);
                y.push(b.values[pos]);
            }
        }
    }
    (x, y)
}

fn overlap(a: &ScatterSeries, b: &ScatterSeries) -> OverlapRecord {
    let set_a: FxHashSet<AccessionId> = a.samples.iter().copied().collect();
    let set_b: FxHashSet<AccessionId> = b.samples.iter().copied().collect();
    OverlapRecord {
        label_a: a.label.clone(),
        label_a_id: a.trait_id,
        label_b: b.label.clone(),
        label_b_id: b.trait_id,
        a: a.samples.len(),
        b: b.samples.len(),
        c: set_a.intersection(&set_b).count(),
    }
}
