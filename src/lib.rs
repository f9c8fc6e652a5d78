//! portsim - a portfolio simulator for hierarchical allocations.
//!
//! # Overview
//!
//! portsim answers "what would this allocation have done?" for a portfolio of
//! monthly-priced instruments:
//!
//! - **Allocation trees**: nested percentage splits flattened into per-instrument weights
//! - **Rebalancing**: annual by default, also quarterly, monthly or buy-and-hold
//! - **Capital-gains tax**: FIFO tax lots, annual settlement, tax paid at the next rebalance
//! - **Statistics**: CAGR, volatility, Sharpe, Calmar, drawdown, skew, kurtosis and the
//!   skew-adjusted skill metric `tau`
//! - **Configuration files**: TOML run files for reproducible simulations
//!
//! # Quick Start
//!
//! ```
//! use portsim::{
//!     allocation::{flatten, AllocationNode},
//!     analytics::compute_stats,
//!     data::{PriceData, PriceSeries},
//!     simulator::{SimulationConfig, Simulator},
//! };
//! use chrono::NaiveDate;
//!
//! let tree = AllocationNode::internal(
//!     "root",
//!     1.0,
//!     vec![AllocationNode::leaf("A", 0.6), AllocationNode::leaf("B", 0.4)],
//! );
//! let allocation = flatten(&tree).unwrap();
//!
//! let months = portsim::types::month_range(
//!     NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2021, 12, 1).unwrap(),
//! );
//! let a = PriceSeries::from_pairs(months.iter().enumerate().map(|(i, d)| (*d, 100.0 + i as f64)))
//!     .unwrap();
//! let b = PriceSeries::from_pairs(months.iter().map(|d| (*d, 50.0))).unwrap();
//! let data = PriceData::new().with_series("A", a).with_series("B", b);
//!
//! let config = SimulationConfig::new(100_000.0, allocation).with_tax(0.25, ["A"]);
//! let result = Simulator::new(config).unwrap().run(&data).unwrap();
//! let stats = compute_stats(&result.value_series()).unwrap();
//!
//! assert_eq!(result.values.len(), 24);
//! assert!(stats.cagr > 0.0);
//! ```

pub mod allocation;
pub mod analytics;
pub mod config;
pub mod data;
pub mod error;
pub mod lots;
pub mod report;
pub mod simulator;
pub mod skill;
pub mod tax;
pub mod types;

pub use allocation::{flatten, AllocationNode, FlatAllocation};
pub use analytics::{compute_stats, correlation_matrix, stats_table, StatsRecord};
pub use config::RunFileConfig;
pub use data::{
    load_csv, CsvPriceProvider, DataConfig, InMemoryProvider, PriceData, PriceProvider,
    PriceSeries, SeriesKind,
};
pub use error::{Result, SimulationError};
pub use lots::{Lot, LotLedger};
pub use report::ResultFormatter;
pub use simulator::{
    RebalancePolicy, SimulationConfig, SimulationPhase, SimulationResult, Simulator,
};
pub use skill::{compute_eta, skill_metric};
pub use tax::{TaxClassifier, TaxSettlement, TaxState};
pub use types::{Holdings, PricePoint, Side, Trade, ValuePoint};
