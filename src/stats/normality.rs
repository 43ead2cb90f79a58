//! NORMALITY SCORER: Shapiro-Wilk W test
//!
//! Royston's algorithm (AS R94): normal-score coefficients from polynomial
//! approximations, exact p-value for n = 3, log-normal approximations of the
//! null distribution of 1 - W for 4 ≤ n ≤ 11 and n ≥ 12.
//!
//! Degenerate input never raises. n < 3, fewer than 3 distinct values, zero
//! range or any non-finite value yields a NaN statistic and p = 0, so a
//! degenerate candidate always sorts last in a p-value search.

use serde::Serialize;
use tracing::warn;

use crate::utils::numeric::{normal_quantile, normal_sf, poly};

/// Largest sample size the coefficient approximations are valid for.
pub const MAX_SAMPLE_SIZE: usize = 5000;

const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

/// Result of a normality test
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalityOutcome {
    /// Test statistic (W for Shapiro-Wilk); NaN for degenerate input
    pub statistic: f64,
    /// p-value in [0, 1]; 0 for degenerate input
    pub p_value: f64,
}

impl NormalityOutcome {
    pub fn degenerate() -> Self {
        Self {
            statistic: f64::NAN,
            p_value: 0.0,
        }
    }
}

/// Goodness-of-fit test against the normal distribution.
///
/// Implementations must not fail: degenerate series map to p = 0.
pub trait NormalityTest {
    fn test(&self, series: &[f64]) -> NormalityOutcome;

    fn p_value(&self, series: &[f64]) -> f64 {
        self.test(series).p_value
    }
}

/// Shapiro-Wilk test
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapiroWilk;

impl ShapiroWilk {
    pub fn new() -> Self {
        ShapiroWilk
    }

    /// p-value of the series, 0 for degenerate input
    pub fn score(&self, series: &[f64]) -> f64 {
        self.test(series).p_value
    }
}

impl NormalityTest for ShapiroWilk {
    fn test(&self, series: &[f64]) -> NormalityOutcome {
        if series.len() < 3 || series.iter().any(|v| !v.is_finite()) {
            return NormalityOutcome::degenerate();
        }
        if series.len() > MAX_SAMPLE_SIZE {
            warn!(
                n = series.len(),
                max = MAX_SAMPLE_SIZE,
                "Shapiro-Wilk p-value may not be accurate above the maximum sample size"
            );
        }

        let mut sorted = series.to_vec();
        sorted.sort_by(f64::total_cmp);

        if distinct_sorted(&sorted) < 3 {
            return NormalityOutcome::degenerate();
        }

        let Some(w) = w_statistic(&sorted) else {
            return NormalityOutcome::degenerate();
        };
        if !w.is_finite() {
            return NormalityOutcome::degenerate();
        }

        let p = p_value_for(w, sorted.len());
        if !p.is_finite() {
            return NormalityOutcome::degenerate();
        }

        NormalityOutcome {
            statistic: w,
            p_value: p.clamp(0.0, 1.0),
        }
    }
}

fn distinct_sorted(sorted: &[f64]) -> usize {
    let mut count = 0;
    let mut prev: Option<f64> = None;
    for &v in sorted {
        if prev != Some(v) {
            count += 1;
            prev = Some(v);
        }
    }
    count
}

/// Positive coefficients for the lower half of the order statistics
/// (a_1 ≥ a_2 ≥ … ≥ a_{n/2}); the upper half is antisymmetric.
fn coefficients(n: usize) -> Vec<f64> {
    let half = n / 2;
    if n == 3 {
        return vec![std::f64::consts::FRAC_1_SQRT_2];
    }

    let an25 = n as f64 + 0.25;
    let m: Vec<f64> = (0..half)
        .map(|i| normal_quantile((i as f64 + 1.0 - 0.375) / an25))
        .collect();

    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();
    let a1 = poly(&C1, rsn) - m[0] / ssumm2;

    let mut a = vec![0.0; half];
    let (first_scaled, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        a[1] = a2;
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };
    a[0] = a1;
    for i in first_scaled..half {
        a[i] = -m[i] / fac;
    }
    a
}

/// W as the squared correlation between the ordered sample and the
/// antisymmetric coefficient vector.
fn w_statistic(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    let range = sorted[n - 1] - sorted[0];
    if range < 1e-19 {
        return None;
    }

    let a = coefficients(n);
    // scale by the range to keep sums well conditioned
    let x: Vec<f64> = sorted.iter().map(|v| v / range).collect();
    let mean = x.iter().sum::<f64>() / n as f64;
    let ssx: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();

    let mut numerator = 0.0;
    let mut ssa = 0.0;
    for (i, &ai) in a.iter().enumerate() {
        numerator += ai * (x[n - 1 - i] - x[i]);
        ssa += 2.0 * ai * ai;
    }

    Some(numerator * numerator / (ssa * ssx))
}

fn p_value_for(w: f64, n: usize) -> f64 {
    if n == 3 {
        // exact: (6/π)(asin(√W) - π/3)
        let p = 6.0 / std::f64::consts::PI * (w.sqrt().asin() - std::f64::consts::FRAC_PI_3);
        return p.max(0.0);
    }

    let an = n as f64;
    let mut y = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if y >= gamma {
            return 1e-99;
        }
        y = -(gamma - y).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let xx = an.ln();
        (poly(&C5, xx), poly(&C6, xx).exp())
    };

    normal_sf(y, m, s)
}
