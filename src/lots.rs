//! FIFO tax-lot ledger.
//!
//! Each taxable instrument owns one [`LotLedger`]. Buys append a lot at the
//! tail; sells consume lots from the head, oldest first, and report the cost
//! basis of the shares sold.

use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Quantities closer than this are treated as equal.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// A purchase record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub quantity: f64,
    pub unit_price: f64,
}

impl Lot {
    pub fn new(quantity: f64, unit_price: f64) -> Self {
        Self {
            quantity,
            unit_price,
        }
    }

    /// Total purchase cost of the remaining quantity.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Ordered queue of lots for one instrument, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotLedger {
    instrument: String,
    lots: VecDeque<Lot>,
}

impl LotLedger {
    /// Create an empty ledger for an instrument.
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            lots: VecDeque::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Lots in FIFO order.
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Sum of remaining lot quantities.
    pub fn total_quantity(&self) -> f64 {
        self.lots.iter().map(|lot| lot.quantity).sum()
    }

    /// Sum of remaining cost basis.
    pub fn total_cost(&self) -> f64 {
        self.lots.iter().map(Lot::cost_basis).sum()
    }

    fn invalid_quantity(&self, quantity: f64) -> SimulationError {
        SimulationError::InvalidQuantity {
            instrument: self.instrument.clone(),
            quantity,
        }
    }

    /// Append a lot at the tail.
    pub fn buy(&mut self, quantity: f64, unit_price: f64) -> Result<()> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(self.invalid_quantity(quantity));
        }
        if !(unit_price.is_finite() && unit_price >= 0.0) {
            return Err(SimulationError::InvalidUnitPrice {
                instrument: self.instrument.clone(),
                price: unit_price,
            });
        }
        self.lots.push_back(Lot::new(quantity, unit_price));
        Ok(())
    }

    /// Consume `quantity` shares from the oldest lots and return their cost basis.
    ///
    /// Requesting more than the ledger holds is an accounting inconsistency
    /// and fails with [`SimulationError::InsufficientLots`] without touching
    /// any lot.
    pub fn sell(&mut self, quantity: f64) -> Result<f64> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(self.invalid_quantity(quantity));
        }

        let available = self.total_quantity();
        if quantity > available + QUANTITY_EPSILON * available.max(1.0) {
            return Err(SimulationError::InsufficientLots {
                instrument: self.instrument.clone(),
                requested: quantity,
                available,
            });
        }

        let mut remaining = quantity;
        let mut cost_basis = 0.0;
        while remaining > 0.0 {
            let Some(mut lot) = self.lots.pop_front() else {
                break;
            };
            if lot.quantity <= remaining + QUANTITY_EPSILON {
                cost_basis += lot.cost_basis();
                remaining -= lot.quantity;
            } else {
                cost_basis += remaining * lot.unit_price;
                lot.quantity -= remaining;
                remaining = 0.0;
                self.lots.push_front(lot);
            }
        }

        Ok(cost_basis)
    }
}
