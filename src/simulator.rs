//! Monthly rebalancing simulator with FIFO capital-gains tax accounting.
//!
//! The simulation is a single ordered pass over month-start dates. The first
//! date buys the target allocation; every later date values the portfolio and,
//! when the [`RebalancePolicy`] triggers, trades back to the target weights.
//! Taxable sells realise gains against FIFO lots. Gains are assessed once a
//! year, on the first observation of the next calendar year, and the tax is
//! paid out of the portfolio at the next rebalance.

use crate::allocation::FlatAllocation;
use crate::data::{PriceData, PriceProvider};
use crate::error::{Result, SimulationError};
use crate::lots::{Lot, LotLedger, QUANTITY_EPSILON};
use crate::report::PORTFOLIO_LABEL;
use crate::tax::{TaxClassifier, TaxSettlement, TaxState};
use crate::types::{month_range, month_start, quarter, Holdings, Side, Trade, ValuePoint};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// When the portfolio is traded back to its target weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalancePolicy {
    /// First observation of each calendar year.
    #[default]
    Annual,
    /// First observation of each calendar quarter.
    Quarterly,
    /// Every observation after the first.
    Monthly,
    /// Buy and hold.
    Never,
}

impl RebalancePolicy {
    /// Whether `date` opens a new rebalance period relative to `previous`.
    pub fn triggers(&self, previous: NaiveDate, date: NaiveDate) -> bool {
        match self {
            RebalancePolicy::Annual => date.year() != previous.year(),
            RebalancePolicy::Quarterly => {
                (date.year(), quarter(date)) != (previous.year(), quarter(previous))
            }
            RebalancePolicy::Monthly => date != previous,
            RebalancePolicy::Never => false,
        }
    }
}

impl std::fmt::Display for RebalancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RebalancePolicy::Annual => "annual",
            RebalancePolicy::Quarterly => "quarterly",
            RebalancePolicy::Monthly => "monthly",
            RebalancePolicy::Never => "never",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationPhase {
    Uninitialized,
    Running,
    Rebalancing,
    Terminated,
}

/// Everything a simulation run needs besides prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Capital invested on the first simulated date.
    pub initial_capital: f64,
    /// Target weight per instrument.
    pub allocation: FlatAllocation,
    /// Capital-gains tax rate as a fraction.
    pub tax_rate: f64,
    /// Instruments subject to capital-gains tax.
    pub taxable: BTreeSet<String>,
    pub rebalance: RebalancePolicy,
    /// First simulated month; defaults to the start of the common data range.
    pub start_date: Option<NaiveDate>,
    /// Last simulated month; defaults to the end of the common data range.
    pub end_date: Option<NaiveDate>,
}

impl SimulationConfig {
    /// Create a tax-free, annually rebalanced configuration.
    pub fn new(initial_capital: f64, allocation: FlatAllocation) -> Self {
        Self {
            initial_capital,
            allocation,
            tax_rate: 0.0,
            taxable: BTreeSet::new(),
            rebalance: RebalancePolicy::default(),
            start_date: None,
            end_date: None,
        }
    }

    /// Tax gains on `taxable` instruments at `rate`.
    pub fn with_tax(mut self, rate: f64, taxable: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tax_rate = rate;
        self.taxable = taxable.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rebalance(mut self, policy: RebalancePolicy) -> Self {
        self.rebalance = policy;
        self
    }

    /// Restrict the simulated calendar.
    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Check the configuration before any simulation work starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(SimulationError::Config(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(SimulationError::Config(format!(
                "tax rate must be in [0, 1), got {}",
                self.tax_rate
            )));
        }
        if self.allocation.is_empty() {
            return Err(SimulationError::Config("allocation is empty".to_string()));
        }
        if self.allocation.weight(PORTFOLIO_LABEL).is_some() {
            return Err(SimulationError::Config(format!(
                "'{}' is reserved for the portfolio row and cannot name an instrument",
                PORTFOLIO_LABEL
            )));
        }
        if let Some(unknown) = self
            .taxable
            .iter()
            .find(|name| self.allocation.weight(name).is_none())
        {
            return Err(SimulationError::Config(format!(
                "taxable instrument '{}' is not part of the allocation",
                unknown
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if month_start(start) > end {
                return Err(SimulationError::Config(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a completed simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Portfolio value at every simulated date, before that date's trades.
    pub values: Vec<ValuePoint>,
    /// Shares held at the end of the run.
    pub holdings: Holdings,
    /// Tax position at the end of the run.
    pub tax: TaxState,
    /// Every annual settlement that assessed tax.
    pub settlements: Vec<TaxSettlement>,
    /// Dates on which a rebalance was executed.
    pub rebalance_dates: Vec<NaiveDate>,
    pub trades: Vec<Trade>,
    /// Remaining FIFO lots per taxable instrument.
    pub lots: BTreeMap<String, Vec<Lot>>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SimulationResult {
    /// Portfolio values without dates, ready for [`crate::analytics::compute_stats`].
    pub fn value_series(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.value).collect()
    }

    pub fn final_value(&self) -> Option<f64> {
        self.values.last().map(|v| v.value)
    }

    /// Total tax assessed over the run.
    pub fn total_tax(&self) -> f64 {
        self.settlements.iter().map(|s| s.tax).sum()
    }
}

/// Mutable portfolio state threaded through the monthly loop.
#[derive(Debug)]
struct PortfolioState {
    phase: SimulationPhase,
    holdings: Holdings,
    ledgers: BTreeMap<String, LotLedger>,
    tax: TaxState,
    settlements: Vec<TaxSettlement>,
    rebalance_dates: Vec<NaiveDate>,
    trades: Vec<Trade>,
}

impl PortfolioState {
    fn new() -> Self {
        Self {
            phase: SimulationPhase::Uninitialized,
            holdings: Holdings::new(),
            ledgers: BTreeMap::new(),
            tax: TaxState::default(),
            settlements: Vec::new(),
            rebalance_dates: Vec::new(),
            trades: Vec::new(),
        }
    }

    fn value(&self, data: &PriceData, date: NaiveDate) -> Result<f64> {
        let mut value = 0.0;
        for (instrument, shares) in &self.holdings {
            value += shares * data.price(instrument, date)?;
        }
        Ok(value)
    }
}

/// Runs a [`SimulationConfig`] against price data.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
}

impl Simulator {
    /// Create a simulator, rejecting invalid configurations up front.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Load the allocation's instruments from `provider` and run.
    pub fn run_provider(&self, provider: &dyn PriceProvider) -> Result<SimulationResult> {
        let instruments: BTreeSet<String> = self
            .config
            .allocation
            .instruments()
            .map(str::to_string)
            .collect();
        let data = provider.load(&instruments)?;
        self.run(&data)
    }

    /// Run with the configured set of taxable instruments.
    pub fn run(&self, data: &PriceData) -> Result<SimulationResult> {
        self.run_with(data, &self.config.taxable)
    }

    /// Run with an external tax classifier.
    pub fn run_with(
        &self,
        data: &PriceData,
        classifier: &dyn TaxClassifier,
    ) -> Result<SimulationResult> {
        let (start, end) = self.calendar_range(data)?;
        let dates = month_range(start, end);
        if dates.is_empty() {
            return Err(SimulationError::NoData);
        }

        info!(
            "Running simulation: {} instruments, {} months from {} to {} ({} rebalance)",
            self.config.allocation.len(),
            dates.len(),
            start,
            end,
            self.config.rebalance
        );

        let mut state = PortfolioState::new();
        let mut values = Vec::with_capacity(dates.len());
        let mut previous: Option<NaiveDate> = None;

        for &date in &dates {
            let Some(prev) = previous else {
                self.initialize(&mut state, data, classifier, date)?;
                values.push(ValuePoint {
                    date,
                    value: state.value(data, date)?,
                });
                previous = Some(date);
                continue;
            };

            let current_value = state.value(data, date)?;
            values.push(ValuePoint {
                date,
                value: current_value,
            });

            if date.year() != prev.year() {
                if let Some(settlement) = state.tax.settle(date, self.config.tax_rate) {
                    info!(
                        "Tax settlement on {}: gains {:.2}, tax {:.2}",
                        date, settlement.realized_gains, settlement.tax
                    );
                    state.settlements.push(settlement);
                }
            }

            if self.config.rebalance.triggers(prev, date) {
                self.rebalance(&mut state, data, classifier, date, current_value)?;
            }

            previous = Some(date);
        }

        state.phase = SimulationPhase::Terminated;

        let lots = state
            .ledgers
            .iter()
            .map(|(name, ledger)| (name.clone(), ledger.lots().copied().collect()))
            .collect();

        info!(
            "Simulation finished: final value {:.2}, {} rebalances, {} trades",
            values.last().map(|v| v.value).unwrap_or(0.0),
            state.rebalance_dates.len(),
            state.trades.len()
        );

        Ok(SimulationResult {
            values,
            holdings: state.holdings,
            tax: state.tax,
            settlements: state.settlements,
            rebalance_dates: state.rebalance_dates,
            trades: state.trades,
            lots,
            start_date: start,
            end_date: end,
        })
    }

    /// Resolve the simulated months from the configuration and the data.
    fn calendar_range(&self, data: &PriceData) -> Result<(NaiveDate, NaiveDate)> {
        let (start, end) = match (self.config.start_date, self.config.end_date) {
            (Some(start), Some(end)) => (start, end),
            (start, end) => {
                let (common_start, common_end) =
                    data.common_range(self.config.allocation.instruments())?;
                (start.unwrap_or(common_start), end.unwrap_or(common_end))
            }
        };
        let start = month_start(start);
        if start > end {
            return Err(SimulationError::Config(format!(
                "simulation starts {} after it ends {}",
                start, end
            )));
        }
        Ok((start, month_start(end)))
    }

    /// Buy the target allocation with the initial capital.
    fn initialize(
        &self,
        state: &mut PortfolioState,
        data: &PriceData,
        classifier: &dyn TaxClassifier,
        date: NaiveDate,
    ) -> Result<()> {
        debug_assert_eq!(state.phase, SimulationPhase::Uninitialized);
        for (instrument, weight) in self.config.allocation.iter() {
            let price = data.price(instrument, date)?;
            let shares = self.config.initial_capital * weight / price;
            state.holdings.insert(instrument.to_string(), shares);

            if classifier.is_taxable(instrument) {
                let mut ledger = LotLedger::new(instrument);
                ledger.buy(shares, price)?;
                state.ledgers.insert(instrument.to_string(), ledger);
            }

            state.trades.push(Trade {
                date,
                instrument: instrument.to_string(),
                side: Side::Buy,
                quantity: shares,
                price,
                realized_gain: None,
            });
        }

        debug!("Initial holdings on {}: {:?}", date, state.holdings);
        state.phase = SimulationPhase::Running;
        Ok(())
    }

    /// Pay owed tax and trade every instrument back to its target weight.
    fn rebalance(
        &self,
        state: &mut PortfolioState,
        data: &PriceData,
        classifier: &dyn TaxClassifier,
        date: NaiveDate,
        current_value: f64,
    ) -> Result<()> {
        debug_assert_eq!(state.phase, SimulationPhase::Running);
        state.phase = SimulationPhase::Rebalancing;

        // Targets stay non-negative only while the tax leaves something to invest.
        let owed = state.tax.tax_owed_carried_forward;
        if owed >= current_value {
            return Err(SimulationError::TaxExceedsValue {
                date,
                owed,
                value: current_value,
            });
        }
        let investable = current_value - state.tax.take_owed();
        if owed > 0.0 {
            info!("Paying {:.2} carried-forward tax on {}", owed, date);
        }

        for (instrument, weight) in self.config.allocation.iter() {
            let price = data.price(instrument, date)?;
            let target = investable * weight / price;
            let held = state.holdings.get(instrument).copied().unwrap_or(0.0);
            let delta = target - held;

            if delta.abs() <= QUANTITY_EPSILON * held.abs().max(1.0) {
                continue;
            }

            debug!(
                "{} {}: {:.6} -> {:.6} shares at {:.4}",
                date, instrument, held, target, price
            );

            let mut realized_gain = None;
            if classifier.is_taxable(instrument) {
                let ledger = state
                    .ledgers
                    .entry(instrument.to_string())
                    .or_insert_with(|| LotLedger::new(instrument));
                if delta < 0.0 {
                    let quantity = -delta;
                    let cost_basis = ledger.sell(quantity)?;
                    let gain = quantity * price - cost_basis;
                    state.tax.record_gain(gain);
                    realized_gain = Some(gain);
                } else {
                    ledger.buy(delta, price)?;
                }
            }

            state.trades.push(Trade {
                date,
                instrument: instrument.to_string(),
                side: if delta < 0.0 { Side::Sell } else { Side::Buy },
                quantity: delta.abs(),
                price,
                realized_gain,
            });
            state.holdings.insert(instrument.to_string(), target);
        }

        state.rebalance_dates.push(date);
        info!("Rebalanced on {} to: {:?}", date, state.holdings);
        state.phase = SimulationPhase::Running;
        Ok(())
    }
}
