//! Numeric helpers
//!
//! Summary statistics and normal-distribution functions shared by the
//! normality test, the transformation engine and the correlation engine.

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divisor n). NaN for an empty slice.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Smallest value. `None` for an empty slice.
pub fn min_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max_value(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Evaluate `cc[0] + cc[1]·x + cc[2]·x² + …` (Horner).
pub fn poly(cc: &[f64], x: f64) -> f64 {
    cc.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Upper tail of the normal distribution, P(X > x) for X ~ N(mean, sd).
pub fn normal_sf(x: f64, mean: f64, sd: f64) -> f64 {
    0.5 * libm::erfc((x - mean) / (sd * std::f64::consts::SQRT_2))
}

/// Standard normal quantile function (Wichura's AS 241, PPND16).
///
/// Accurate to about 1e-16 over (0, 1). Returns ±inf at the bounds and NaN
/// outside them.
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 8] = [
        3.387_132_872_796_366_6,
        1.331_416_678_917_843_8e2,
        1.971_590_950_306_551_3e3,
        1.373_169_376_550_946_1e4,
        4.592_195_393_154_987_1e4,
        6.726_577_092_700_870_1e4,
        3.343_057_558_358_812_8e4,
        2.509_080_928_730_122_7e3,
    ];
    const B: [f64; 8] = [
        1.0,
        4.231_333_070_160_091_1e1,
        6.871_870_074_920_579_1e2,
        5.394_196_021_424_751_1e3,
        2.121_379_430_158_659_6e4,
        3.930_789_580_009_271_1e4,
        2.872_908_573_572_194_3e4,
        5.226_495_278_852_854_6e3,
    ];
    const C: [f64; 8] = [
        1.423_437_110_749_683_6,
        4.630_337_846_156_545_3,
        5.769_497_221_460_691_4,
        3.647_848_324_763_204_6,
        1.270_458_252_452_368_4,
        2.417_807_251_774_506_1e-1,
        2.272_384_498_926_918_4e-2,
        7.745_450_142_783_414_1e-4,
    ];
    const D: [f64; 8] = [
        1.0,
        2.053_191_626_637_758_8,
        1.676_384_830_183_803_8,
        6.897_673_349_851_000_5e-1,
        1.481_039_764_274_800_7e-1,
        1.519_866_656_361_645_7e-2,
        5.475_938_084_995_345e-4,
        1.050_750_071_644_416_8e-9,
    ];
    const E: [f64; 8] = [
        6.657_904_643_501_103_8,
        5.463_784_911_164_114_4,
        1.784_826_539_917_291_3,
        2.965_605_718_285_048_9e-1,
        2.653_218_952_657_612_3e-2,
        1.242_660_947_388_078_4e-3,
        2.711_555_568_743_487_6e-5,
        2.010_334_399_292_288_1e-7,
    ];
    const F: [f64; 8] = [
        1.0,
        5.998_322_065_558_879_4e-1,
        1.369_298_809_227_358e-1,
        1.487_536_129_085_061_5e-2,
        7.868_691_311_456_132_6e-4,
        1.846_318_317_510_054_7e-5,
        1.421_511_758_316_445_9e-7,
        2.044_263_103_389_939_8e-15,
    ];

    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let q = p - 0.5;
    if q.abs() <= 0.425 {
        let r = 0.180625 - q * q;
        return q * poly(&A, r) / poly(&B, r);
    }

    let tail = if q < 0.0 { p } else { 1.0 - p };
    let mut r = (-tail.ln()).sqrt();
    let value = if r <= 5.0 {
        r -= 1.6;
        poly(&C, r) / poly(&D, r)
    } else {
        r -= 5.0;
        poly(&E, r) / poly(&F, r)
    };

    if q < 0.0 {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_population_variance() {
        // var([1, 4, 9, 16, 25]) with divisor n
        assert_relative_eq!(population_variance(&[1.0, 4.0, 9.0, 16.0, 25.0]), 74.8, epsilon = 1e-12);
        assert_eq!(population_variance(&[3.0, 3.0, 3.0]), 0.0);
        assert!(population_variance(&[]).is_nan());
    }

    #[test]
    fn test_normal_quantile_known_values() {
        assert_eq!(normal_quantile(0.5), 0.0);
        assert_relative_eq!(normal_quantile(0.975), 1.959_963_984_540_054, epsilon = 1e-12);
        assert_relative_eq!(normal_quantile(0.025), -1.959_963_984_540_054, epsilon = 1e-12);
        assert_relative_eq!(normal_quantile(1e-10), -6.361_340_902_404_056, epsilon = 1e-9);
        assert!(normal_quantile(1.5).is_nan());
    }

    #[test]
    fn test_quantile_inverts_sf() {
        for &p in &[0.01, 0.2, 0.5, 0.7, 0.999] {
            let z = normal_quantile(p);
            assert_relative_eq!(1.0 - normal_sf(z, 0.0, 1.0), p, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_poly_horner() {
        // 1 + 2x + 3x² at x = 2
        assert_eq!(poly(&[1.0, 2.0, 3.0], 2.0), 17.0);
    }
}
