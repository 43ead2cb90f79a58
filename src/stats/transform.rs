//! TRANSFORMATION ENGINE
//!
//! Applies the catalog of normality-improving transforms to a raw trait
//! series and scores each result with a [`NormalityTest`].
//!
//! **Standardizing shift**: most transforms operate on
//! `s = (x - min(x)) + 0.1 × var(x)` (population variance), which keeps the
//! radicand/logarithm argument positive for any finite input. The raw
//! variants (`standard = false`) apply the formula to `x` directly.
//!
//! **Box-Cox**: λ is scanned over a fixed increasing grid (default
//! -2.0..=2.0 step 0.1); the FIRST λ reaching the maximum p-value wins, so a
//! flat p-value curve resolves to the lowest λ.
//!
//! Any non-finite output value marks the transform unsupported. Nothing in
//! this module returns an error for numeric reasons.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::TransformSettings;
use crate::error::PhenoError;
use crate::stats::normality::{NormalityTest, ShapiroWilk};
use crate::utils::numeric::{max_value, min_value, population_variance};

/// Transform identifiers. Declaration order is catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    No,
    Log,
    Sqrt,
    Sqr,
    ArcsinSqrt,
    BoxCox,
    Ascombe,
    /// Available on request only, not part of [`CATALOG`]
    Exp,
}

/// Transforms evaluated by [`TransformationEngine::transform_all`]
pub const CATALOG: [TransformKind; 7] = [
    TransformKind::No,
    TransformKind::Log,
    TransformKind::Sqrt,
    TransformKind::Sqr,
    TransformKind::ArcsinSqrt,
    TransformKind::BoxCox,
    TransformKind::Ascombe,
];

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::No => "no",
            TransformKind::Log => "log",
            TransformKind::Sqrt => "sqrt",
            TransformKind::Sqr => "sqr",
            TransformKind::ArcsinSqrt => "arcsin_sqrt",
            TransformKind::BoxCox => "box_cox",
            TransformKind::Ascombe => "ascombe",
            TransformKind::Exp => "exp",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = PhenoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .chain(std::iter::once(&TransformKind::Exp))
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| PhenoError::Format(format!("Transformation {} unknown", s)))
    }
}

/// Outcome of one transform
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransformOutcome {
    Supported {
        /// Transformed series, aligned with the input order
        values: Vec<f64>,
        p_value: f64,
        /// -log10(p), present only when 0 < p < 1
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        /// Chosen λ (Box-Cox only)
        #[serde(skip_serializing_if = "Option::is_none")]
        lambda: Option<f64>,
    },
    Unsupported,
}

impl TransformOutcome {
    fn supported(values: Vec<f64>, p_value: f64, lambda: Option<f64>) -> Self {
        let score = if p_value > 0.0 && p_value < 1.0 {
            Some(-p_value.log10())
        } else {
            None
        };
        TransformOutcome::Supported {
            values,
            p_value,
            score,
            lambda,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, TransformOutcome::Supported { .. })
    }

    pub fn values(&self) -> Option<&[f64]> {
        match self {
            TransformOutcome::Supported { values, .. } => Some(values),
            TransformOutcome::Unsupported => None,
        }
    }

    pub fn p_value(&self) -> Option<f64> {
        match self {
            TransformOutcome::Supported { p_value, .. } => Some(*p_value),
            TransformOutcome::Unsupported => None,
        }
    }
}

/// Per-transform outcomes, ordered by catalog position
pub type TransformationResult = BTreeMap<TransformKind, TransformOutcome>;

/// Result of the Box-Cox λ search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxCoxFit {
    pub lambda: f64,
    pub values: Vec<f64>,
    pub p_value: f64,
}

pub struct TransformationEngine<S = ShapiroWilk> {
    scorer: S,
    settings: TransformSettings,
}

impl Default for TransformationEngine<ShapiroWilk> {
    fn default() -> Self {
        Self::new(TransformSettings::default())
    }
}

impl TransformationEngine<ShapiroWilk> {
    pub fn new(settings: TransformSettings) -> Self {
        Self::with_scorer(ShapiroWilk, settings)
    }
}

impl<S: NormalityTest> TransformationEngine<S> {
    pub fn with_scorer(scorer: S, settings: TransformSettings) -> Self {
        Self { scorer, settings }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    /// Apply one transform.
    ///
    /// # Arguments
    /// * `values` - Raw series
    /// * `kind` - Transform to apply
    /// * `standard` - Use the standardizing shift (sqrt, log, sqr, exp, Box-Cox)
    ///
    /// # Returns
    /// The transformed series, or `None` when the transform is unsupported
    /// for this input (precondition violated or non-finite output)
    pub fn transform(&self, values: &[f64], kind: TransformKind, standard: bool) -> Option<Vec<f64>> {
        if kind == TransformKind::BoxCox {
            return self.box_cox(values, standard).map(|fit| fit.values);
        }
        self.apply(values, kind, standard)
    }

    /// Score one transform
    pub fn evaluate(&self, values: &[f64], kind: TransformKind, standard: bool) -> TransformOutcome {
        let outcome = if kind == TransformKind::BoxCox {
            match self.box_cox(values, standard) {
                Some(fit) => TransformOutcome::supported(fit.values, fit.p_value, Some(fit.lambda)),
                None => TransformOutcome::Unsupported,
            }
        } else {
            match self.apply(values, kind, standard) {
                Some(transformed) => {
                    let p = self.scorer.p_value(&transformed);
                    TransformOutcome::supported(transformed, p, None)
                }
                None => TransformOutcome::Unsupported,
            }
        };

        match &outcome {
            TransformOutcome::Supported { p_value, .. } => {
                debug!(transform = %kind, p_value, "Transform scored");
            }
            TransformOutcome::Unsupported => {
                debug!(transform = %kind, "Transform unsupported for series");
            }
        }
        outcome
    }

    /// Evaluate every catalog transform. A failing transform is recorded as
    /// unsupported and never aborts the batch.
    pub fn transform_all(&self, values: &[f64], standard: bool) -> TransformationResult {
        CATALOG
            .iter()
            .map(|&kind| (kind, self.evaluate(values, kind, standard)))
            .collect()
    }

    /// Box-Cox with λ chosen by maximum normality p-value (first maximum in
    /// increasing λ order).
    pub fn box_cox(&self, values: &[f64], standard: bool) -> Option<BoxCoxFit> {
        if values.is_empty() {
            return None;
        }
        let base = if standard {
            self.standardize(values)?
        } else {
            values.to_vec()
        };

        let lambdas = self.settings.lambdas();
        let mut best: Option<(f64, f64)> = None;
        for &lambda in &lambdas {
            let candidate = box_cox_with(&base, lambda);
            let p = if candidate.iter().all(|v| v.is_finite()) {
                self.scorer.p_value(&candidate)
            } else {
                0.0
            };
            match best {
                Some((_, best_p)) if !(p > best_p) => {}
                _ => best = Some((lambda, p)),
            }
        }

        let (lambda, p_value) = best?;
        let transformed = box_cox_with(&base, lambda);
        if !all_finite(&transformed) {
            return None;
        }
        debug!(lambda, p_value, "Box-Cox lambda selected");

        Some(BoxCoxFit {
            lambda,
            values: transformed,
            p_value,
        })
    }

    fn apply(&self, values: &[f64], kind: TransformKind, standard: bool) -> Option<Vec<f64>> {
        if values.is_empty() {
            return None;
        }

        let base = || -> Option<Vec<f64>> {
            if standard {
                self.standardize(values)
            } else {
                Some(values.to_vec())
            }
        };

        let transformed: Vec<f64> = match kind {
            TransformKind::No => values.to_vec(),
            TransformKind::Sqrt => base()?.into_iter().map(f64::sqrt).collect(),
            TransformKind::Log => base()?.into_iter().map(f64::ln).collect(),
            TransformKind::Sqr => base()?.into_iter().map(|s| s * s).collect(),
            TransformKind::Exp => base()?.into_iter().map(f64::exp).collect(),
            TransformKind::Ascombe => values.iter().map(|x| 2.0 * (x + 3.0 / 8.0).sqrt()).collect(),
            TransformKind::ArcsinSqrt => {
                let (lo, hi) = (min_value(values)?, max_value(values)?);
                if lo < 0.0 || hi > 1.0 {
                    debug!("Some values are outside of range [0,1], skipping arcsin_sqrt");
                    return None;
                }
                values.iter().map(|x| x.sqrt().asin()).collect()
            }
            TransformKind::BoxCox => return self.box_cox(values, standard).map(|fit| fit.values),
        };

        if all_finite(&transformed) {
            Some(transformed)
        } else {
            None
        }
    }

    /// (x - min) + shift × var, with population variance
    fn standardize(&self, values: &[f64]) -> Option<Vec<f64>> {
        let min = min_value(values)?;
        let offset = self.settings.variance_shift * population_variance(values);
        Some(values.iter().map(|x| (x - min) + offset).collect())
    }
}

fn box_cox_with(base: &[f64], lambda: f64) -> Vec<f64> {
    if lambda == 0.0 {
        base.iter().map(|s| s.ln()).collect()
    } else {
        base.iter().map(|s| (s.powf(lambda) - 1.0) / lambda).collect()
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::normality::NormalityOutcome;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    const SQUARES: [f64; 5] = [1.0, 4.0, 9.0, 16.0, 25.0];

    /// Scores every series identically and counts invocations
    struct FlatScorer {
        calls: Cell<usize>,
    }

    impl NormalityTest for FlatScorer {
        fn test(&self, _series: &[f64]) -> NormalityOutcome {
            self.calls.set(self.calls.get() + 1);
            NormalityOutcome {
                statistic: 0.9,
                p_value: 0.5,
            }
        }
    }

    #[test]
    fn test_raw_sqrt_of_squares() {
        let engine = TransformationEngine::default();
        let out = engine.transform(&SQUARES, TransformKind::Sqrt, false).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_standardized_log_is_supported() {
        let engine = TransformationEngine::default();
        let out = engine.transform(&SQUARES, TransformKind::Log, true).unwrap();
        // shift = 0.1 × 74.8
        assert_relative_eq!(out[0], 7.48_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(out[4], (24.0_f64 + 7.48).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_standardized_square() {
        let engine = TransformationEngine::default();
        let out = engine.transform(&[0.0, 1.0, 2.0], TransformKind::Sqr, true).unwrap();
        // var = 2/3, shift = 1/15
        let shift = 0.1 * 2.0 / 3.0;
        assert_relative_eq!(out[0], shift * shift, epsilon = 1e-12);
        assert_relative_eq!(out[2], (2.0 + shift) * (2.0 + shift), epsilon = 1e-12);

        let raw = engine.transform(&[-2.0, 3.0], TransformKind::Sqr, false).unwrap();
        assert_eq!(raw, vec![4.0, 9.0]);
    }

    #[test]
    fn test_anscombe() {
        let engine = TransformationEngine::default();
        let out = engine.transform(&[0.0, 1.0], TransformKind::Ascombe, true).unwrap();
        assert_relative_eq!(out[0], 2.0 * 0.375_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(out[1], 2.0 * 1.375_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_arcsin_sqrt_range_check() {
        let engine = TransformationEngine::default();
        let out = engine
            .transform(&[0.0, 0.25, 1.0], TransformKind::ArcsinSqrt, true)
            .unwrap();
        assert_relative_eq!(out[1], std::f64::consts::FRAC_PI_6, epsilon = 1e-12);
        assert_relative_eq!(out[2], std::f64::consts::FRAC_PI_2, epsilon = 1e-12);

        assert!(engine.transform(&[0.5, 1.2], TransformKind::ArcsinSqrt, true).is_none());
        assert!(engine.transform(&[-0.1, 0.5], TransformKind::ArcsinSqrt, true).is_none());
    }

    #[test]
    fn test_non_finite_output_is_unsupported() {
        let engine = TransformationEngine::default();
        // ln(0) = -inf
        assert!(engine.transform(&[0.0, 1.0, 2.0], TransformKind::Log, false).is_none());
        // sqrt(-1) = NaN
        assert!(engine.transform(&[-1.0, 1.0, 2.0], TransformKind::Sqrt, false).is_none());
        // constant series: shift is 0 so ln(0)
        assert!(engine.transform(&[3.0, 3.0, 3.0], TransformKind::Log, true).is_none());
    }

    #[test]
    fn test_box_cox_ties_pick_lowest_lambda() {
        let scorer = FlatScorer { calls: Cell::new(0) };
        let engine = TransformationEngine::with_scorer(scorer, TransformSettings::default());
        let fit = engine.box_cox(&SQUARES, true).unwrap();
        assert_relative_eq!(fit.lambda, -2.0);
        assert_eq!(fit.p_value, 0.5);
        assert_eq!(engine.scorer.calls.get(), 41);
    }

    #[test]
    fn test_box_cox_is_deterministic() {
        let engine = TransformationEngine::default();
        let first = engine.box_cox(&SQUARES, true).unwrap();
        let second = engine.box_cox(&SQUARES, true).unwrap();
        assert_eq!(first, second);

        // the chosen λ is never beaten by another grid point
        for lambda in engine.settings().lambdas() {
            let base: Vec<f64> = SQUARES.iter().map(|x| (x - 1.0) + 7.48).collect();
            let p = ShapiroWilk.score(&box_cox_with(&base, lambda));
            assert!(p <= first.p_value + 1e-12);
        }
    }

    #[test]
    fn test_box_cox_lambda_zero_is_log() {
        let base = [1.0, std::f64::consts::E];
        let out = box_cox_with(&base, 0.0);
        assert_relative_eq!(out[1], 1.0, epsilon = 1e-12);
        let out = box_cox_with(&[4.0], 0.5);
        assert_relative_eq!(out[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_all_catalog_order_and_scores() {
        let engine = TransformationEngine::default();
        let result = engine.transform_all(&SQUARES, true);

        let kinds: Vec<TransformKind> = result.keys().copied().collect();
        assert_eq!(kinds, CATALOG.to_vec());

        // squares are outside [0, 1]
        assert_eq!(result[&TransformKind::ArcsinSqrt], TransformOutcome::Unsupported);

        match &result[&TransformKind::No] {
            TransformOutcome::Supported { p_value, score, lambda, .. } => {
                assert_relative_eq!(*p_value, 0.735_934_781, epsilon = 1e-6);
                assert_relative_eq!(score.unwrap(), -p_value.log10(), epsilon = 1e-12);
                assert!(lambda.is_none());
            }
            TransformOutcome::Unsupported => panic!("identity must be supported"),
        }

        match &result[&TransformKind::BoxCox] {
            TransformOutcome::Supported { lambda, .. } => assert!(lambda.is_some()),
            TransformOutcome::Unsupported => panic!("box_cox must be supported"),
        }
    }

    #[test]
    fn test_degenerate_series_has_no_score() {
        let engine = TransformationEngine::default();
        // two values: p = 0, so no score
        match engine.evaluate(&[1.0, 2.0], TransformKind::No, true) {
            TransformOutcome::Supported { p_value, score, .. } => {
                assert_eq!(p_value, 0.0);
                assert!(score.is_none());
            }
            TransformOutcome::Unsupported => panic!("identity must be supported"),
        }
    }

    #[test]
    fn test_empty_input_is_unsupported_everywhere() {
        let engine = TransformationEngine::default();
        let result = engine.transform_all(&[], true);
        assert_eq!(result.len(), CATALOG.len());
        assert!(result.values().all(|o| !o.is_supported()));
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!("box_cox".parse::<TransformKind>().unwrap(), TransformKind::BoxCox);
        assert_eq!("exp".parse::<TransformKind>().unwrap(), TransformKind::Exp);
        assert!("cube".parse::<TransformKind>().is_err());
        assert_eq!(
            serde_json::to_string(&TransformKind::ArcsinSqrt).unwrap(),
            "\"arcsin_sqrt\""
        );
        assert!(!CATALOG.contains(&TransformKind::Exp));
    }

    #[test]
    fn test_result_serializes_with_wire_keys() {
        let engine = TransformationEngine::default();
        let result = engine.transform_all(&[0.2, 0.4, 0.5, 0.9], true);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("arcsin_sqrt").is_some());
        assert_eq!(json["no"]["status"], "supported");
    }
}
