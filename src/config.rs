//! Run-file support for simulations.
//!
//! A run file is a TOML document describing the allocation tree, tax
//! treatment, rebalance policy and where the price data lives, so that a
//! simulation can be reproduced from a single file.

use crate::allocation::{flatten, AllocationNode};
use crate::data::{CsvPriceProvider, DataConfig, SeriesKind};
use crate::error::{Result, SimulationError};
use crate::simulator::{RebalancePolicy, SimulationConfig};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Complete simulation run loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFileConfig {
    /// General simulation settings.
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Capital-gains tax settings.
    #[serde(default)]
    pub tax: TaxSettings,
    /// Price data settings.
    #[serde(default)]
    pub data: DataSettings,
    /// Root of the allocation tree.
    pub allocation: AllocationNode,
}

/// General simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    #[serde(default)]
    pub rebalance: RebalancePolicy,
    /// Start date (YYYY-MM-DD format).
    #[serde(default)]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD format).
    #[serde(default)]
    pub end_date: Option<String>,
}

fn default_capital() -> f64 { 100_000.0 }

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            initial_capital: default_capital(),
            rebalance: RebalancePolicy::Annual,
            start_date: None,
            end_date: None,
        }
    }
}

/// Capital-gains tax settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxSettings {
    /// Tax rate as a fraction (0.25 for 25%).
    #[serde(default)]
    pub rate: f64,
    /// Instruments whose gains are taxed.
    #[serde(default)]
    pub taxable: Vec<String>,
}

/// Where and how price series are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory holding one `<instrument>.csv` per instrument.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub kind: SeriesKind,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default = "default_true")]
    pub has_headers: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_true")]
    pub skip_invalid: bool,
    /// Per-instrument exceptions, keyed by instrument name.
    #[serde(default)]
    pub series: BTreeMap<String, SeriesOverride>,
}

fn default_directory() -> PathBuf { PathBuf::from("data") }
fn default_delimiter() -> char { ',' }
fn default_true() -> bool { true }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            kind: SeriesKind::Prices,
            date_format: None,
            has_headers: true,
            delimiter: default_delimiter(),
            skip_invalid: true,
            series: BTreeMap::new(),
        }
    }
}

/// Settings that differ for one instrument's file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesOverride {
    #[serde(default)]
    pub kind: Option<SeriesKind>,
    #[serde(default)]
    pub date_format: Option<String>,
}

impl DataSettings {
    /// CSV configuration shared by every instrument.
    pub fn data_config(&self) -> Result<DataConfig> {
        if !self.delimiter.is_ascii() {
            return Err(SimulationError::Config(format!(
                "delimiter '{}' must be a single ASCII character",
                self.delimiter
            )));
        }
        Ok(DataConfig {
            kind: self.kind,
            date_format: self.date_format.clone(),
            has_headers: self.has_headers,
            delimiter: self.delimiter as u8,
            skip_invalid: self.skip_invalid,
            ..Default::default()
        })
    }

    /// CSV provider for the configured directory, with per-series overrides.
    pub fn provider(&self) -> Result<CsvPriceProvider> {
        let base = self.data_config()?;
        let mut provider = CsvPriceProvider::new(&self.directory, base.clone());
        for (name, over) in &self.series {
            let config = DataConfig {
                kind: over.kind.unwrap_or(base.kind),
                date_format: over.date_format.clone().or_else(|| base.date_format.clone()),
                ..base.clone()
            };
            provider = provider.with_override(name.clone(), config);
        }
        Ok(provider)
    }
}

fn parse_date(field: &str, value: Option<&String>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                SimulationError::Config(format!("{} '{}' is not YYYY-MM-DD: {}", field, s, e))
            })
        })
        .transpose()
}

impl RunFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: RunFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SimulationError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Flatten the allocation and build a validated [`SimulationConfig`].
    pub fn to_simulation_config(&self) -> Result<SimulationConfig> {
        let allocation = flatten(&self.allocation)?;
        let config = SimulationConfig {
            initial_capital: self.simulation.initial_capital,
            allocation,
            tax_rate: self.tax.rate,
            taxable: self.tax.taxable.iter().cloned().collect(),
            rebalance: self.simulation.rebalance,
            start_date: parse_date("start_date", self.simulation.start_date.as_ref())?,
            end_date: parse_date("end_date", self.simulation.end_date.as_ref())?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# portsim run file

[simulation]
initial_capital = 100000.0
rebalance = "annual"      # annual | quarterly | monthly | never
# start_date = "2010-01-01"
# end_date = "2020-12-01"

[tax]
rate = 0.25
taxable = ["world_equity", "gold"]

[data]
directory = "data"
kind = "prices"           # prices | monthly-returns-pct
# date_format = "%Y-%m-%d"
delimiter = ","

# A series stored as monthly percent returns.
[data.series.bond_fund]
kind = "monthly-returns-pct"

[allocation]
name = "portfolio"
weight = 1.0

[[allocation.children]]
name = "world_equity"
weight = 0.6

[[allocation.children]]
name = "defensive"
weight = 0.4

[[allocation.children.children]]
name = "bond_fund"
weight = 0.75

[[allocation.children.children]]
name = "gold"
weight = 0.25
"#
        .to_string()
    }
}
