//! Performance statistics for monthly value series.
//!
//! [`compute_stats`] turns a value (or price) series into a [`StatsRecord`]
//! of annualised risk/return metrics, including the skew-adjusted skill
//! metric from [`crate::skill`]. Moments follow the usual sample (bias
//! corrected) definitions.

use crate::error::{Result, SimulationError};
use crate::skill::skill_metric;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observation periods per year.
pub const PERIODS_PER_YEAR: f64 = 12.0;

/// Distribution-aware performance statistics of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Number of monthly returns.
    pub months: usize,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualised volatility (`sigma`).
    pub vol: f64,
    /// Annualised mean return over annualised volatility.
    pub sharpe: f64,
    /// CAGR over the magnitude of the max drawdown; `None` without drawdown.
    pub calmar: Option<f64>,
    /// Largest peak-to-trough loss as a non-positive fraction.
    pub max_drawdown: f64,
    /// Skew-adjusted skill metric; `None` when skew is outside the correction table.
    pub tau: Option<f64>,
    /// Annualised skew (`raw_skew / sqrt(12)`).
    pub skew: f64,
    /// Annualised excess kurtosis (`raw_kurtosis / 12`).
    pub kurtosis: f64,
    /// Sample skewness of monthly returns.
    pub raw_skew: f64,
    /// Sample excess kurtosis of monthly returns.
    pub raw_kurtosis: f64,
    /// Cumulative return over the whole series.
    pub total_return: f64,
    pub best_month: f64,
    pub worst_month: f64,
}

/// Period-over-period fractional changes; the undefined first entry is dropped.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Central moment sums `(sum d^2, sum d^3, sum d^4)`.
fn moment_sums(xs: &[f64]) -> (f64, f64, f64) {
    let m = mean(xs);
    xs.iter().fold((0.0, 0.0, 0.0), |(s2, s3, s4), x| {
        let d = x - m;
        let d2 = d * d;
        (s2 + d2, s3 + d2 * d, s4 + d2 * d2)
    })
}

/// Bias-corrected sample skewness. Zero for constant series and below 3 points.
pub fn skewness(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 3 {
        return 0.0;
    }
    let (s2, s3, _) = moment_sums(xs);
    let nf = n as f64;
    let m2 = s2 / nf;
    if m2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    let m3 = s3 / nf;
    (nf * (nf - 1.0)).sqrt() / (nf - 2.0) * m3 / m2.powf(1.5)
}

/// Bias-corrected sample excess kurtosis. Zero for constant series and below 4 points.
pub fn kurtosis(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 4 {
        return 0.0;
    }
    let (s2, _, s4) = moment_sums(xs);
    if s2 <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    let nf = n as f64;
    let adj = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    let numer = nf * (nf + 1.0) * (nf - 1.0) * s4;
    let denom = (nf - 2.0) * (nf - 3.0) * s2 * s2;
    numer / denom - adj
}

/// Compound annual growth rate of monthly returns.
pub fn cagr(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return f64::NAN;
    }
    let ending: f64 = returns.iter().map(|r| 1.0 + r).product();
    let years = returns.len() as f64 / PERIODS_PER_YEAR;
    ending.powf(1.0 / years) - 1.0
}

/// Maximum drawdown of the wealth path implied by `returns`, starting from 1.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut worst: f64 = 0.0;
    for r in returns {
        wealth *= 1.0 + r;
        peak = f64::max(peak, wealth);
        worst = worst.min((wealth - peak) / peak);
    }
    worst
}

/// Compute the statistics record of a monthly value series.
///
/// Needs at least two observations (one return).
pub fn compute_stats(values: &[f64]) -> Result<StatsRecord> {
    if values.len() < 2 {
        return Err(SimulationError::InsufficientData {
            required: 2,
            actual: values.len(),
        });
    }
    Ok(stats_from_returns(&pct_change(values)))
}

/// Compute the statistics record of a monthly return series.
pub fn stats_from_returns(returns: &[f64]) -> StatsRecord {
    let af = PERIODS_PER_YEAR.sqrt();

    let raw_skew = skewness(returns);
    let raw_kurtosis = kurtosis(returns);
    let skew = raw_skew / af;
    let kurt = raw_kurtosis / PERIODS_PER_YEAR;
    let sigma = std_dev(returns) * af;
    let mu = mean(returns) * PERIODS_PER_YEAR;

    let sharpe = if sigma.is_finite() && sigma > 0.0 {
        mu / sigma
    } else {
        0.0
    };
    let tau = skill_metric(mu, sigma, skew);

    let growth = cagr(returns);
    let drawdown = max_drawdown(returns);
    let calmar = if drawdown < 0.0 {
        Some(growth / drawdown.abs())
    } else {
        None
    };

    let total_return = returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
    let best_month = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let worst_month = returns.iter().copied().fold(f64::INFINITY, f64::min);

    StatsRecord {
        months: returns.len(),
        cagr: growth,
        vol: sigma,
        sharpe,
        calmar,
        max_drawdown: drawdown,
        tau,
        skew,
        kurtosis: kurt,
        raw_skew,
        raw_kurtosis,
        total_return,
        best_month,
        worst_month,
    }
}

/// Statistics for several independent columns, computed in parallel.
pub fn stats_table(
    columns: &BTreeMap<String, Vec<f64>>,
) -> BTreeMap<String, Result<StatsRecord>> {
    columns
        .par_iter()
        .map(|(name, values)| (name.clone(), compute_stats(values)))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// Pearson correlation of two equally long samples; `NaN` when undefined.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va <= 0.0 || vb <= 0.0 {
        return f64::NAN;
    }
    cov / (va * vb).sqrt()
}

/// Pairwise correlation of the monthly returns of each value column.
pub fn correlation_matrix(
    columns: &BTreeMap<String, Vec<f64>>,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let returns: BTreeMap<&String, Vec<f64>> = columns
        .iter()
        .map(|(name, values)| (name, pct_change(values)))
        .collect();

    returns
        .iter()
        .map(|(row, a)| {
            let cells = returns
                .iter()
                .map(|(col, b)| ((*col).clone(), correlation(a, b)))
                .collect();
            ((*row).clone(), cells)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn values_from_returns(returns: &[f64]) -> Vec<f64> {
        let mut values = vec![100.0];
        for r in returns {
            let last = *values.last().unwrap();
            values.push(last * (1.0 + r));
        }
        values
    }

    #[test]
    fn test_pct_change() {
        let r = pct_change(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!(approx(r[0], 0.10, 1e-12));
        assert!(approx(r[1], -0.10, 1e-12));
    }

    #[test]
    fn test_sample_moments() {
        let xs = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert!(approx(mean(&xs), 4.0, 1e-12));
        assert!(approx(std_dev(&xs), 12.5_f64.sqrt(), 1e-12));
        // Reference values from the adjusted Fisher-Pearson estimators.
        assert!(approx(skewness(&xs), 12.0 * 0.02_f64.sqrt(), 1e-12));
        assert!(approx(kurtosis(&xs), 3.152, 1e-9));
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew() {
        let xs = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(approx(skewness(&xs), 0.0, 1e-12));
        assert!(kurtosis(&xs) < 0.0);
    }

    #[test]
    fn test_constant_series_moments() {
        let xs = [0.01; 12];
        assert_eq!(skewness(&xs), 0.0);
        assert_eq!(kurtosis(&xs), 0.0);
        assert!(approx(std_dev(&xs), 0.0, 1e-15));
        assert_eq!(skewness(&[1.0, 2.0]), 0.0);
        assert_eq!(kurtosis(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_cagr_one_year_doubling() {
        let monthly = 2f64.powf(1.0 / 12.0) - 1.0;
        let returns = vec![monthly; 12];
        assert!(approx(cagr(&returns), 1.0, 1e-9));
    }

    #[test]
    fn test_max_drawdown() {
        // 100 -> 120 -> 60 -> 90
        let returns = [0.2, -0.5, 0.5];
        assert!(approx(max_drawdown(&returns), -0.5, 1e-12));

        // A first-month loss counts against the starting wealth.
        assert!(approx(max_drawdown(&[-0.1, 0.05]), -0.1, 1e-12));
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_compute_stats_requires_two_points() {
        assert!(matches!(
            compute_stats(&[100.0]),
            Err(SimulationError::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_compute_stats_flat_series() {
        let stats = compute_stats(&[1_000_000.0; 13]).unwrap();
        assert_eq!(stats.months, 12);
        assert!(approx(stats.cagr, 0.0, 1e-12));
        assert_eq!(stats.vol, 0.0);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(stats.calmar, None);
        assert_eq!(stats.tau, None);
        assert_eq!(stats.skew, 0.0);
    }

    #[test]
    fn test_compute_stats_annualisation() {
        let returns = [0.02, -0.01, 0.03, 0.01, -0.02, 0.015, 0.005, -0.005, 0.02, 0.0, 0.01, -0.01];
        let stats = compute_stats(&values_from_returns(&returns)).unwrap();

        let af = 12f64.sqrt();
        let mu = mean(&returns) * 12.0;
        let sigma = std_dev(&returns) * af;
        assert!(approx(stats.vol, sigma, 1e-12));
        assert!(approx(stats.sharpe, mu / sigma, 1e-9));
        assert!(approx(stats.skew, stats.raw_skew / af, 1e-12));
        assert!(approx(stats.kurtosis, stats.raw_kurtosis / 12.0, 1e-12));
        assert!(approx(stats.best_month, 0.03, 1e-9));
        assert!(approx(stats.worst_month, -0.02, 1e-9));
        assert!(stats.max_drawdown < 0.0);
        let calmar = stats.calmar.unwrap();
        assert!(approx(calmar, stats.cagr / stats.max_drawdown.abs(), 1e-12));
        assert!(stats.tau.is_some());
    }

    #[test]
    fn test_tau_equals_sharpe_when_skew_rounds_to_zero() {
        // Symmetric returns around a positive mean.
        let returns = [0.03, -0.01, 0.01, 0.01, 0.03, -0.01, 0.01, 0.01];
        let stats = compute_stats(&values_from_returns(&returns)).unwrap();
        assert!(stats.skew.abs() < 0.005);
        assert_eq!(stats.tau, Some(stats.sharpe));
    }

    #[test]
    fn test_stats_table_parallel() {
        let mut columns = BTreeMap::new();
        columns.insert("flat".to_string(), vec![100.0; 24]);
        columns.insert(
            "growing".to_string(),
            (0..24).map(|i| 100.0 * 1.01f64.powi(i)).collect(),
        );
        columns.insert("short".to_string(), vec![100.0]);

        let table = stats_table(&columns);
        assert_eq!(table.len(), 3);
        assert!(approx(
            table["growing"].as_ref().unwrap().cagr,
            1.01f64.powi(12) - 1.0,
            1e-9
        ));
        assert!(table["short"].is_err());
    }

    #[test]
    fn test_correlation_matrix() {
        let mut columns = BTreeMap::new();
        let a = values_from_returns(&[0.01, 0.02, -0.01, 0.03]);
        let b = values_from_returns(&[0.02, 0.04, -0.02, 0.06]);
        let c = values_from_returns(&[-0.01, -0.02, 0.01, -0.03]);
        columns.insert("a".to_string(), a);
        columns.insert("b".to_string(), b);
        columns.insert("c".to_string(), c);

        let matrix = correlation_matrix(&columns);
        assert!(approx(matrix["a"]["a"], 1.0, 1e-12));
        assert!(approx(matrix["a"]["b"], 1.0, 1e-9));
        assert!(approx(matrix["a"]["c"], -1.0, 1e-9));
        assert!(approx(matrix["c"]["a"], matrix["a"]["c"], 1e-15));
    }
}
