//! Normality tests for a single group or cell.

use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

use crate::error::{AnovaError, Result};

/// Statistic and p-value of a normality test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalityStatistic {
    pub statistic: f64,
    pub p_value: f64,
}

/// Royston's polynomial coefficients for the two largest weights.
const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
/// Normalising transform of `ln(1 - W)` for 4 <= n <= 11.
const SW_GAMMA: [f64; 2] = [-2.273, 0.459];
const SW_SMALL_MEAN: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const SW_SMALL_SD: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
/// Normalising transform of `ln(1 - W)` for n >= 12.
const SW_LARGE_MEAN: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_LARGE_SD: [f64; 3] = [-0.4803, -0.082676, 0.0030302];

/// Largest sample size for which Royston's approximation is calibrated.
pub const SHAPIRO_WILK_MAX_N: usize = 5000;

/// Shapiro-Wilk W statistic and p-value (Royston 1995).
///
/// The p-value is exact for `n = 3`. Returns `None` when the sample has fewer
/// than 3 observations or zero range, where W is undefined.
pub fn shapiro_wilk(sample: &[f64]) -> Result<Option<NormalityStatistic>> {
    let n = sample.len();
    if n < 3 {
        return Ok(None);
    }
    let sorted = sorted_copy(sample);
    let range = sorted[n - 1] - sorted[0];
    if range <= 0.0 {
        return Ok(None);
    }

    let normal = standard_normal()?;
    let weights = shapiro_wilk_weights(n, &normal);

    // scale by the range before squaring to keep large-magnitude data in range
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let numerator: f64 = weights
        .iter()
        .zip(&sorted)
        .map(|(a, x)| a * x / range)
        .sum();
    let denominator: f64 = sorted.iter().map(|x| ((x - mean) / range).powi(2)).sum();
    let w = (numerator * numerator / denominator).min(1.0);

    Ok(Some(NormalityStatistic {
        statistic: w,
        p_value: shapiro_wilk_p_value(w, n, &normal),
    }))
}

/// Antisymmetric weights `a_1 <= ... <= a_n` with `Σ a_i² = 1`.
fn shapiro_wilk_weights(n: usize, normal: &Normal) -> Vec<f64> {
    let mut weights = vec![0.0; n];
    if n == 3 {
        let a = std::f64::consts::FRAC_1_SQRT_2;
        weights[0] = -a;
        weights[2] = a;
        return weights;
    }

    let an = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / (an + 0.25)))
        .collect();
    let summ2: f64 = m.iter().map(|v| v * v).sum();
    let ssumm2 = summ2.sqrt();
    let u = 1.0 / an.sqrt();

    let a_n = polynomial(&SW_C1, u) + m[n - 1] / ssumm2;
    let (phi, fixed) = if n > 5 {
        let a_n1 = polynomial(&SW_C2, u) + m[n - 2] / ssumm2;
        let phi = (summ2 - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
            / (1.0 - 2.0 * a_n.powi(2) - 2.0 * a_n1.powi(2));
        weights[n - 2] = a_n1;
        weights[1] = -a_n1;
        (phi, 2)
    } else {
        let phi = (summ2 - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * a_n.powi(2));
        (phi, 1)
    };
    weights[n - 1] = a_n;
    weights[0] = -a_n;

    let root_phi = phi.sqrt();
    for i in fixed..n - fixed {
        weights[i] = m[i] / root_phi;
    }
    weights
}

fn shapiro_wilk_p_value(w: f64, n: usize, normal: &Normal) -> f64 {
    if n == 3 {
        let p = 6.0 / std::f64::consts::PI
            * (w.sqrt().asin() - std::f64::consts::FRAC_PI_3);
        return p.clamp(0.0, 1.0);
    }

    let w1 = 1.0 - w;
    if w1 <= 0.0 {
        return 1.0;
    }
    let an = n as f64;
    let mut y = w1.ln();

    let (mean, sd) = if n <= 11 {
        let gamma = polynomial(&SW_GAMMA, an);
        if y >= gamma {
            return 0.0;
        }
        y = -(gamma - y).ln();
        (
            polynomial(&SW_SMALL_MEAN, an),
            polynomial(&SW_SMALL_SD, an).exp(),
        )
    } else {
        let ln_n = an.ln();
        (
            polynomial(&SW_LARGE_MEAN, ln_n),
            polynomial(&SW_LARGE_SD, ln_n).exp(),
        )
    };

    normal.sf((y - mean) / sd).clamp(0.0, 1.0)
}

/// Anderson-Darling statistic against a normal with estimated mean and variance.
///
/// The statistic is the small-sample corrected `A*² = A²(1 + 0.75/n + 2.25/n²)`
/// and the p-value follows D'Agostino & Stephens (1986). Returns `None` for
/// fewer than 3 observations or a constant sample.
pub fn anderson_darling(sample: &[f64]) -> Result<Option<NormalityStatistic>> {
    let n = sample.len();
    if n < 3 {
        return Ok(None);
    }
    let sorted = sorted_copy(sample);
    let an = n as f64;
    let mean = sorted.iter().sum::<f64>() / an;
    let sd = (sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (an - 1.0)).sqrt();
    if sd <= 0.0 {
        return Ok(None);
    }

    let normal = standard_normal()?;
    let z: Vec<f64> = sorted.iter().map(|x| (x - mean) / sd).collect();
    let s: f64 = (0..n)
        .map(|i| {
            let lower = normal.cdf(z[i]).max(f64::MIN_POSITIVE).ln();
            let upper = normal.sf(z[n - 1 - i]).max(f64::MIN_POSITIVE).ln();
            (2.0 * i as f64 + 1.0) * (lower + upper)
        })
        .sum();
    let a2 = -an - s / an;
    let corrected = a2 * (1.0 + 0.75 / an + 2.25 / (an * an));

    let p_value = if corrected >= 0.6 {
        (1.2937 - 5.709 * corrected + 0.0186 * corrected.powi(2)).exp()
    } else if corrected >= 0.34 {
        (0.9177 - 4.279 * corrected - 1.38 * corrected.powi(2)).exp()
    } else if corrected >= 0.2 {
        1.0 - (-8.318 + 42.796 * corrected - 59.938 * corrected.powi(2)).exp()
    } else {
        1.0 - (-13.436 + 101.14 * corrected - 223.73 * corrected.powi(2)).exp()
    };

    Ok(Some(NormalityStatistic {
        statistic: corrected,
        p_value: p_value.clamp(0.0, 1.0),
    }))
}

/// `c[0] + c[1] x + c[2] x² + ...`
fn polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x + c)
}

fn sorted_copy(sample: &[f64]) -> Vec<f64> {
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| AnovaError::distribution(e.to_string()))
}
