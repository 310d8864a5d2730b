//! Goodness-of-fit helpers for the shuffle distribution tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// Error function (Abramowitz and Stegun 7.1.26, |error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Upper-tail probability of a standard normal
pub fn normal_upper_tail(z: f64) -> f64 {
    0.5 * (1.0 - erf(z / std::f64::consts::SQRT_2))
}

pub fn chi_square(observed: &[u64], expected: f64) -> f64 {
    observed
        .iter()
        .map(|&count| {
            let diff = count as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

/// Chi-square upper-tail p-value via the Wilson–Hilferty cube-root transform
pub fn chi_square_p_value(chi_square: f64, df: usize) -> f64 {
    let k = df as f64;
    let v = 2.0 / (9.0 * k);
    let z = ((chi_square / k).cbrt() - (1.0 - v)) / v.sqrt();
    normal_upper_tail(z)
}

pub struct KsResult {
    pub d_stat: f64,
    pub p_value: f64,
}

/// One-sample Kolmogorov–Smirnov test against Uniform(0, 1)
pub fn kolmogorov_smirnov_uniform(samples: &[f64]) -> KsResult {
    if samples.is_empty() {
        return KsResult {
            d_stat: 0.0,
            p_value: 1.0,
        };
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let mut d_stat: f64 = 0.0;
    for (i, &value) in sorted.iter().enumerate() {
        let above = (i + 1) as f64 / n - value;
        let below = value - i as f64 / n;
        d_stat = d_stat.max(above).max(below);
    }

    let lambda = (n.sqrt() + 0.12 + 0.11 / n.sqrt()) * d_stat;
    // The alternating series does not converge for tiny lambda; p is 1 there
    let p_value = if lambda < 0.3 {
        1.0
    } else {
        let mut sum = 0.0;
        for k in 1..100 {
            let term = (-2.0 * (k as f64).powi(2) * lambda * lambda).exp();
            sum += (-1.0f64).powi(k as i32 - 1) * term;
        }
        (2.0 * sum).clamp(0.0, 1.0)
    };

    KsResult { d_stat, p_value }
}

/// Write lines `0..n`, one decimal number per line
pub fn write_numbered(path: &Path, n: usize) {
    let text: String = (0..n).map(|i| format!("{}\n", i)).collect();
    fs::write(path, text).unwrap();
}

/// Output position of every input number: `positions[value] = index`
pub fn positions(path: &Path, n: usize) -> Vec<usize> {
    let mut positions = vec![usize::MAX; n];
    for (index, line) in fs::read_to_string(path).unwrap().lines().enumerate() {
        let value: usize = line.parse().unwrap();
        assert_eq!(positions[value], usize::MAX, "value {} repeated", value);
        positions[value] = index;
    }
    assert!(positions.iter().all(|&p| p != usize::MAX), "missing values");
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erf_reference_values() {
        assert!(erf(0.0).abs() < 1e-6);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
    }

    #[test]
    fn test_chi_square_p_value_reference_values() {
        // 95th percentile of chi-square with 9 degrees of freedom
        assert!((chi_square_p_value(16.919, 9) - 0.05).abs() < 0.005);
        assert!(chi_square_p_value(9.0, 9) > 0.3);
        assert!(chi_square_p_value(40.0, 9) < 1e-4);
    }
}
