//! Monthly price series and price-data providers.
//!
//! The simulator only reads prices; where they come from is decided by a
//! [`PriceProvider`]. Two providers ship with the crate: [`InMemoryProvider`]
//! for programmatic use and [`CsvPriceProvider`], which reads one
//! `<name>.csv` file per instrument from a directory.

use crate::error::{Result, SimulationError};
use crate::types::{month_range, month_start, PricePoint};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Starting index level used when compounding return series into prices.
pub const RETURN_INDEX_BASE: f64 = 1000.0;

/// An ordered, month-indexed price series for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from observations.
    ///
    /// Dates are normalised to the first day of their month and must be
    /// strictly increasing, one observation per month.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        let points: Vec<PricePoint> = points
            .into_iter()
            .map(|p| PricePoint::new(month_start(p.date), p.price))
            .collect();

        if let Some(w) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(SimulationError::DataError(format!(
                "price dates must be strictly increasing by month: {} followed by {}",
                w[0].date, w[1].date
            )));
        }

        Ok(Self { points })
    }

    /// Build a series from `(date, price)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, price)| PricePoint::new(date, price))
                .collect(),
        )
    }

    /// Compound monthly returns into a price index.
    ///
    /// Each return is a fraction (`0.01` for 1%); `NaN` counts as a flat month.
    /// The first observation is `base * (1 + r0)`.
    pub fn from_returns<I>(returns: I, base: f64) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut level = base;
        Self::from_pairs(returns.into_iter().map(|(date, r)| {
            let r = if r.is_nan() { 0.0 } else { r };
            level *= 1.0 + r;
            (date, level)
        }))
    }

    /// Price observed in the month containing `date`.
    pub fn price_on(&self, date: NaiveDate) -> Option<f64> {
        let key = month_start(date);
        self.points
            .binary_search_by(|p| p.date.cmp(&key))
            .ok()
            .map(|idx| self.points[idx].price)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Prices for every month between `start` and `end`, both inclusive.
    pub fn values_between(&self, start: NaiveDate, end: NaiveDate) -> Option<Vec<f64>> {
        month_range(start, end)
            .into_iter()
            .map(|date| self.price_on(date))
            .collect()
    }
}

/// Price series keyed by instrument name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the series for an instrument.
    pub fn insert(&mut self, instrument: impl Into<String>, series: PriceSeries) {
        self.series.insert(instrument.into(), series);
    }

    /// Builder-style [`PriceData::insert`].
    pub fn with_series(mut self, instrument: impl Into<String>, series: PriceSeries) -> Self {
        self.insert(instrument, series);
        self
    }

    pub fn get(&self, instrument: &str) -> Option<&PriceSeries> {
        self.series.get(instrument)
    }

    pub fn contains(&self, instrument: &str) -> bool {
        self.series.contains_key(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Usable price of `instrument` on `date`.
    ///
    /// Fails with [`SimulationError::MissingPrice`] when there is no
    /// observation and with [`SimulationError::InvalidPrice`] when the observed
    /// price is not strictly positive.
    pub fn price(&self, instrument: &str, date: NaiveDate) -> Result<f64> {
        let price = self
            .series
            .get(instrument)
            .and_then(|s| s.price_on(date))
            .ok_or_else(|| SimulationError::MissingPrice {
                instrument: instrument.to_string(),
                date,
            })?;

        if !PricePoint::new(date, price).validate() {
            return Err(SimulationError::InvalidPrice {
                instrument: instrument.to_string(),
                date,
                price,
            });
        }
        Ok(price)
    }

    /// Latest first date and earliest last date across `instruments`.
    pub fn common_range<'a, I>(&self, instruments: I) -> Result<(NaiveDate, NaiveDate)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut start: Option<NaiveDate> = None;
        let mut end: Option<NaiveDate> = None;

        for instrument in instruments {
            let series = self.series.get(instrument).ok_or_else(|| {
                SimulationError::DataError(format!("No data for instrument: {}", instrument))
            })?;
            let (Some(s), Some(e)) = (series.first_date(), series.last_date()) else {
                return Err(SimulationError::DataError(format!(
                    "Empty price series for instrument: {}",
                    instrument
                )));
            };
            start = Some(start.map_or(s, |curr| curr.max(s)));
            end = Some(end.map_or(e, |curr| curr.min(e)));
        }

        match (start, end) {
            (Some(start), Some(end)) if start <= end => Ok((start, end)),
            (Some(start), Some(end)) => Err(SimulationError::DataError(format!(
                "No overlapping data: common range would start {} after it ends {}",
                start, end
            ))),
            _ => Err(SimulationError::NoData),
        }
    }

    /// Price columns over `[start, end]`, one value per month.
    pub fn columns_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<String, Vec<f64>>> {
        self.series
            .iter()
            .map(|(name, series)| {
                let values = series.values_between(start, end).ok_or_else(|| {
                    SimulationError::DataError(format!(
                        "{} has gaps between {} and {}",
                        name, start, end
                    ))
                })?;
                Ok((name.clone(), values))
            })
            .collect()
    }
}

/// Source of monthly price series.
pub trait PriceProvider {
    /// Load the series for every requested instrument.
    ///
    /// A single one-shot read; an instrument that cannot be provided is an
    /// error.
    fn load(&self, instruments: &BTreeSet<String>) -> Result<PriceData>;
}

/// Provider serving series that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    data: PriceData,
}

impl InMemoryProvider {
    pub fn new(data: PriceData) -> Self {
        Self { data }
    }
}

impl PriceProvider for InMemoryProvider {
    fn load(&self, instruments: &BTreeSet<String>) -> Result<PriceData> {
        let mut out = PriceData::new();
        for name in instruments {
            let series = self.data.get(name).ok_or_else(|| {
                SimulationError::DataError(format!("No data for instrument: {}", name))
            })?;
            out.insert(name.clone(), series.clone());
        }
        Ok(out)
    }
}

/// How the value column of a CSV file is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeriesKind {
    /// The value column holds prices or index levels.
    #[default]
    Prices,
    /// The value column holds monthly returns in percent (`1.5` for 1.5%).
    MonthlyReturnsPct,
}

/// CSV source configuration.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Interpretation of the value column.
    pub kind: SeriesKind,
    /// Date format string (e.g. "%Y-%m-%d"). Common formats are tried when `None`.
    pub date_format: Option<String>,
    /// Whether the first row is a header.
    pub has_headers: bool,
    /// Field delimiter.
    pub delimiter: u8,
    /// Zero-based index of the date column.
    pub date_column: usize,
    /// Zero-based index of the value column.
    pub value_column: usize,
    /// Skip unparseable rows instead of failing.
    pub skip_invalid: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            kind: SeriesKind::Prices,
            date_format: None,
            has_headers: true,
            delimiter: b',',
            date_column: 0,
            value_column: 1,
            skip_invalid: true,
        }
    }
}

/// Parse a date string with multiple format attempts.
fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    let s = s.trim();
    if let Some(fmt) = format {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
        // Month-only formats such as "%Y-%m" need a day to parse.
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), &format!("{}-%d", fmt)) {
            return Ok(d);
        }
    }

    let date_formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%b %d, %Y",
    ];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    // "2020-03" and "03/2020" month stamps
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("01/{}", s), "%d/%m/%Y") {
        return Ok(d);
    }

    Err(SimulationError::DataError(format!(
        "Could not parse date: '{}'",
        s
    )))
}

/// Load a monthly series from a CSV file.
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<PriceSeries> {
    let path = path.as_ref();
    info!("Loading data from: {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(config.has_headers)
        .delimiter(config.delimiter)
        .flexible(true)
        .from_path(path)?;

    let mut rows: Vec<(NaiveDate, f64)> = Vec::new();
    let mut skipped = 0;

    for (row_num, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(SimulationError::CsvError(e)),
        };

        let date_field = record.get(config.date_column).unwrap_or("");
        let value_field = record.get(config.value_column).unwrap_or("").trim();

        let date = match parse_date(date_field, config.date_format.as_deref()) {
            Ok(d) => d,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {} due to date parse error: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let value = match (config.kind, value_field) {
            // Missing monthly returns are flat months.
            (SeriesKind::MonthlyReturnsPct, "") => 0.0,
            (_, field) => match field.parse::<f64>() {
                Ok(v) => v,
                Err(e) if config.skip_invalid => {
                    debug!("Skipping row {} due to value parse error: {}", row_num + 1, e);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    return Err(SimulationError::DataError(format!(
                        "Invalid value '{}' at row {}: {}",
                        field,
                        row_num + 1,
                        e
                    )))
                }
            },
        };

        rows.push((month_start(date), value));
    }

    if skipped > 0 {
        warn!("Skipped {} invalid rows in {}", skipped, path.display());
    }

    rows.sort_by_key(|(date, _)| *date);
    let original_len = rows.len();
    rows.dedup_by_key(|(date, _)| *date);
    if rows.len() < original_len {
        warn!(
            "Removed {} duplicate months from {}",
            original_len - rows.len(),
            path.display()
        );
    }

    if rows.is_empty() {
        return Err(SimulationError::NoData);
    }

    let series = match config.kind {
        SeriesKind::Prices => PriceSeries::from_pairs(rows)?,
        SeriesKind::MonthlyReturnsPct => PriceSeries::from_returns(
            rows.into_iter().map(|(d, pct)| (d, pct / 100.0)),
            RETURN_INDEX_BASE,
        )?,
    };

    info!(
        "Loaded {} months from {} to {}",
        series.len(),
        series.first_date().map(|d| d.to_string()).unwrap_or_default(),
        series.last_date().map(|d| d.to_string()).unwrap_or_default()
    );

    Ok(series)
}

/// Provider reading `<dir>/<instrument>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    dir: PathBuf,
    config: DataConfig,
    overrides: BTreeMap<String, DataConfig>,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>, config: DataConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            overrides: BTreeMap::new(),
        }
    }

    /// Use a different CSV configuration for one instrument.
    pub fn with_override(mut self, instrument: impl Into<String>, config: DataConfig) -> Self {
        self.overrides.insert(instrument.into(), config);
        self
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", instrument))
    }
}

impl PriceProvider for CsvPriceProvider {
    fn load(&self, instruments: &BTreeSet<String>) -> Result<PriceData> {
        if !self.dir.is_dir() {
            return Err(SimulationError::DataError(format!(
                "Not a directory: {}",
                self.dir.display()
            )));
        }

        let mut data = PriceData::new();
        for name in instruments {
            let config = self.overrides.get(name).unwrap_or(&self.config);
            let series = load_csv(self.path_for(name), config)?;
            data.insert(name.clone(), series);
        }

        info!(
            "Loaded {} instruments from {}",
            data.len(),
            self.dir.display()
        );
        Ok(data)
    }
}
