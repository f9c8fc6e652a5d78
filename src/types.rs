//! Core data types for the simulator.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Held share quantity per instrument.
pub type Holdings = BTreeMap<String, f64>;

/// A single monthly price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    /// Create a new price observation.
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }

    /// A usable price is finite and strictly positive.
    pub fn validate(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Total portfolio value at a simulated date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A share adjustment executed during a rebalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub instrument: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    /// Realized gain for taxable sells, `None` otherwise.
    pub realized_gain: Option<f64>,
}

impl Trade {
    /// Notional value of the trade.
    pub fn value(&self) -> f64 {
        self.quantity * self.price
    }
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Calendar quarter (1-4) of `date`.
pub fn quarter(date: NaiveDate) -> u32 {
    (date.month0() / 3) + 1
}

/// Number of monthly observations from `start` to `end`, both inclusive.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> usize {
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if months < 0 {
        0
    } else {
        months as usize + 1
    }
}

/// Month-start dates from `start` to `end`, both inclusive.
pub fn month_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let start = month_start(start);
    let count = months_between(start, end);
    (0..count)
        .map_while(|i| start.checked_add_months(Months::new(i as u32)))
        .collect()
}
