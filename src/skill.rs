//! Skew-adjusted skill metric (`tau`).
//!
//! `tau` generalises the Sharpe ratio to skewed return distributions. The
//! correction factor `eta` comes from a fixed table keyed by skewness rounded
//! to two decimals. The table holds the shape parameter of the skew-normal
//! distribution with that skewness, for skews in `[-0.99, 0.99]`; the
//! skew-normal cannot reach `|skew| >= 0.9953`, so outside the table the metric
//! is undefined rather than extrapolated.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Largest tabulated skew, in hundredths.
const MAX_SKEW_KEY: i32 = 99;

static ETA_TABLE: OnceLock<BTreeMap<i32, f64>> = OnceLock::new();

/// Skew-normal shape parameter for a given skewness.
fn shape_for_skew(skew: f64) -> f64 {
    if skew == 0.0 {
        return 0.0;
    }
    let c = ((4.0 - PI) / 2.0).powf(2.0 / 3.0);
    let g = skew.abs().powf(2.0 / 3.0);
    let delta = ((PI / 2.0) * g / (g + c)).sqrt();
    skew.signum() * delta / (1.0 - delta * delta).sqrt()
}

/// The `eta` correction table, keyed by skew in hundredths.
pub fn eta_table() -> &'static BTreeMap<i32, f64> {
    ETA_TABLE.get_or_init(|| {
        (-MAX_SKEW_KEY..=MAX_SKEW_KEY)
            .map(|key| (key, shape_for_skew(key as f64 / 100.0)))
            .collect()
    })
}

/// `-1`, `0` or `1` by the sign of `x`.
pub fn sgn(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Look up `eta` for a skew value; `None` outside the table.
pub fn compute_eta(skew: f64) -> Option<f64> {
    if !skew.is_finite() {
        return None;
    }
    let key = (skew * 100.0).round();
    if key.abs() > MAX_SKEW_KEY as f64 {
        return None;
    }
    eta_table().get(&(key as i32)).copied()
}

/// Skill metric for annualised mean `mu`, volatility `sigma` and skew.
///
/// Returns `None` when the skew is outside the correction table or `sigma` is
/// not a positive number. For `eta == 0` the result is exactly `mu / sigma`.
pub fn skill_metric(mu: f64, sigma: f64, skew: f64) -> Option<f64> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return None;
    }
    let eta = compute_eta(skew)?;
    let eta_sq = eta * eta;
    let t = (2.0 / PI) * (eta_sq / (1.0 + eta_sq));
    Some(
        (mu / sigma) * (1.0 - t).sqrt()
            + sgn(eta) * (2.0 / PI) * ((2.0 * mu) / (PI * sigma)).atan() * t.sqrt(),
    )
}
