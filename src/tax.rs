//! Capital-gains tax accounting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Decides which instruments are subject to capital-gains tax.
pub trait TaxClassifier {
    fn is_taxable(&self, instrument: &str) -> bool;
}

impl TaxClassifier for BTreeSet<String> {
    fn is_taxable(&self, instrument: &str) -> bool {
        self.contains(instrument)
    }
}

impl TaxClassifier for HashSet<String> {
    fn is_taxable(&self, instrument: &str) -> bool {
        self.contains(instrument)
    }
}

impl<F> TaxClassifier for F
where
    F: Fn(&str) -> bool,
{
    fn is_taxable(&self, instrument: &str) -> bool {
        self(instrument)
    }
}

/// Accrued tax position of a portfolio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxState {
    /// Net gains realized since the last settlement.
    pub realized_gains_this_period: f64,
    /// Tax assessed but not yet paid out of the portfolio.
    pub tax_owed_carried_forward: f64,
}

/// Outcome of one annual settlement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxSettlement {
    pub date: NaiveDate,
    pub realized_gains: f64,
    pub tax: f64,
}

impl TaxState {
    /// Accumulate a realized gain (negative for a loss).
    pub fn record_gain(&mut self, gain: f64) {
        self.realized_gains_this_period += gain;
    }

    /// Close the tax period.
    ///
    /// Positive net gains are taxed at `tax_rate` and the tax is added to the
    /// carried-forward amount. Net losses are discarded: they neither offset
    /// later gains nor produce a refund. The period accumulator is reset either
    /// way. Returns `None` when no tax was assessed.
    pub fn settle(&mut self, date: NaiveDate, tax_rate: f64) -> Option<TaxSettlement> {
        let gains = self.realized_gains_this_period;
        self.realized_gains_this_period = 0.0;
        if gains <= 0.0 {
            return None;
        }
        let tax = gains * tax_rate;
        self.tax_owed_carried_forward += tax;
        Some(TaxSettlement {
            date,
            realized_gains: gains,
            tax,
        })
    }

    /// Take the carried-forward tax for payment, leaving nothing owed.
    pub fn take_owed(&mut self) -> f64 {
        std::mem::take(&mut self.tax_owed_carried_forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    #[test]
    fn test_settle_taxes_positive_gains() {
        let mut state = TaxState::default();
        state.record_gain(20_000.0);
        let settlement = state.settle(date(), 0.15).unwrap();
        assert!((settlement.tax - 3_000.0).abs() < 1e-9);
        assert!((state.tax_owed_carried_forward - 3_000.0).abs() < 1e-9);
        assert_eq!(state.realized_gains_this_period, 0.0);
    }

    #[test]
    fn test_settle_discards_losses() {
        let mut state = TaxState::default();
        state.record_gain(1_000.0);
        state.record_gain(-5_000.0);
        assert!(state.settle(date(), 0.15).is_none());
        assert_eq!(state, TaxState::default());

        // The discarded loss does not offset the next period.
        state.record_gain(2_000.0);
        let settlement = state.settle(date(), 0.5).unwrap();
        assert!((settlement.tax - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_take_owed_resets() {
        let mut state = TaxState {
            realized_gains_this_period: 0.0,
            tax_owed_carried_forward: 250.0,
        };
        assert_eq!(state.take_owed(), 250.0);
        assert_eq!(state.tax_owed_carried_forward, 0.0);
    }

    #[test]
    fn test_classifiers() {
        let set: BTreeSet<String> = ["gold".to_string()].into_iter().collect();
        assert!(set.is_taxable("gold"));
        assert!(!set.is_taxable("bonds"));

        let closure = |name: &str| name.starts_with("etf_");
        assert!(closure.is_taxable("etf_world"));
        assert!(!closure.is_taxable("fund"));
    }
}
