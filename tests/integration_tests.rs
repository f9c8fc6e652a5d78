//! Integration tests for the portfolio simulator.

use chrono::NaiveDate;
use portsim::allocation::{flatten, AllocationNode};
use portsim::analytics::{compute_stats, stats_table};
use portsim::config::RunFileConfig;
use portsim::data::{CsvPriceProvider, DataConfig, PriceData, PriceProvider, PriceSeries};
use portsim::error::SimulationError;
use portsim::report::{ResultFormatter, PORTFOLIO_LABEL};
use portsim::simulator::{RebalancePolicy, SimulationConfig, Simulator};
use portsim::types::{month_range, Side};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use tempfile::TempDir;

fn month(y: i32, m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

/// Monthly series starting at `start` with a deterministic wobble around a trend.
fn create_synthetic_series(start: NaiveDate, months: usize, initial: f64, drift: f64) -> PriceSeries {
    let dates = month_range(start, month(2200, 1));
    let mut price = initial;
    PriceSeries::from_pairs(dates.into_iter().take(months).enumerate().map(|(i, d)| {
        let noise = (i as f64 * 0.7).sin() * 0.02 + (i as f64 * 1.3).cos() * 0.01;
        if i > 0 {
            price *= 1.0 + drift + noise;
        }
        (d, price)
    }))
    .unwrap()
}

fn two_leaf_tree(a: f64, b: f64) -> AllocationNode {
    AllocationNode::internal(
        "root",
        1.0,
        vec![AllocationNode::leaf("A", a), AllocationNode::leaf("B", b)],
    )
}

#[test]
fn test_flatten_two_leaves() {
    let flat = flatten(&two_leaf_tree(0.6, 0.4)).unwrap();
    assert_eq!(flat.len(), 2);
    assert_eq!(flat.weight("A"), Some(0.6));
    assert_eq!(flat.weight("B"), Some(0.4));
}

#[test]
fn test_flat_prices_full_year() {
    let flat_series = || {
        let months = month_range(month(2020, 1), month(2021, 1));
        PriceSeries::from_pairs(months.into_iter().map(|d| (d, 100.0))).unwrap()
    };
    let data = PriceData::new()
        .with_series("A", flat_series())
        .with_series("B", flat_series());

    let config = SimulationConfig::new(1_000_000.0, flatten(&two_leaf_tree(0.5, 0.5)).unwrap());
    let result = Simulator::new(config).unwrap().run(&data).unwrap();

    assert_eq!(result.values.len(), 13);
    assert!(result
        .values
        .iter()
        .all(|v| (v.value - 1_000_000.0).abs() < 1e-6));

    let stats = compute_stats(&result.value_series()).unwrap();
    assert_eq!(stats.max_drawdown, 0.0);
    assert!(stats.cagr.abs() < 1e-12);
}

#[test]
fn test_realized_gain_taxed_at_next_year_start() {
    let mut a_prices = vec![100.0; 12];
    a_prices.extend([150.0; 13]);
    let mut b_prices = vec![100.0; 12];
    b_prices.extend([30.0; 13]);
    let dates = month_range(month(2020, 1), month(2022, 1));
    let data = PriceData::new()
        .with_series("A", PriceSeries::from_pairs(dates.iter().copied().zip(a_prices)).unwrap())
        .with_series("B", PriceSeries::from_pairs(dates.iter().copied().zip(b_prices)).unwrap());

    let tax_rate = 0.3;
    let config = SimulationConfig::new(200_000.0, flatten(&two_leaf_tree(0.5, 0.5)).unwrap())
        .with_tax(tax_rate, ["A"]);
    let result = Simulator::new(config).unwrap().run(&data).unwrap();

    let sell = result
        .trades
        .iter()
        .find(|t| t.side == Side::Sell && t.instrument == "A")
        .unwrap();
    assert!((sell.quantity - 400.0).abs() < 1e-9);
    assert!((sell.realized_gain.unwrap() - 20_000.0).abs() < 1e-6);

    let settlement = result.settlements.first().unwrap();
    assert_eq!(settlement.date, month(2022, 1));
    assert!((settlement.tax - 20_000.0 * tax_rate).abs() < 1e-6);
}

#[test]
fn test_missing_month_aborts_run() {
    let a = PriceSeries::from_pairs([
        (month(2020, 1), 10.0),
        (month(2020, 2), 11.0),
        (month(2020, 4), 12.0),
    ])
    .unwrap();
    let b_months = month_range(month(2020, 1), month(2020, 4));
    let b = PriceSeries::from_pairs(b_months.into_iter().map(|d| (d, 5.0))).unwrap();
    let data = PriceData::new().with_series("A", a).with_series("B", b);

    let config = SimulationConfig::new(1_000.0, flatten(&two_leaf_tree(0.5, 0.5)).unwrap());
    match Simulator::new(config).unwrap().run(&data) {
        Err(SimulationError::MissingPrice { instrument, date }) => {
            assert_eq!(instrument, "A");
            assert_eq!(date, month(2020, 3));
        }
        other => panic!("expected a missing price, got {:?}", other),
    }
}

#[test]
fn test_policies_share_the_same_value_path_until_first_rebalance() {
    let data = PriceData::new()
        .with_series("A", create_synthetic_series(month(2015, 1), 60, 100.0, 0.01))
        .with_series("B", create_synthetic_series(month(2015, 1), 60, 50.0, 0.002));
    let weights = flatten(&two_leaf_tree(0.7, 0.3)).unwrap();

    let run = |policy| {
        let config = SimulationConfig::new(10_000.0, weights.clone()).with_rebalance(policy);
        Simulator::new(config).unwrap().run(&data).unwrap()
    };
    let annual = run(RebalancePolicy::Annual);
    let never = run(RebalancePolicy::Never);

    // Identical through January 2016, the first annual rebalance.
    for (a, n) in annual.values.iter().zip(&never.values).take(13) {
        assert!((a.value - n.value).abs() < 1e-6);
    }
    assert_eq!(annual.rebalance_dates.len(), 4);
    assert!(never.rebalance_dates.is_empty());
}

#[test]
fn test_stats_table_for_portfolio_and_constituents() {
    let data = PriceData::new()
        .with_series("A", create_synthetic_series(month(2010, 1), 120, 100.0, 0.008))
        .with_series("B", create_synthetic_series(month(2010, 1), 120, 20.0, 0.003));
    let config = SimulationConfig::new(100_000.0, flatten(&two_leaf_tree(0.6, 0.4)).unwrap())
        .with_tax(0.2, ["A", "B"]);
    let result = Simulator::new(config).unwrap().run(&data).unwrap();

    let mut columns = data.columns_between(result.start_date, result.end_date).unwrap();
    columns.insert(PORTFOLIO_LABEL.to_string(), result.value_series());
    let table = stats_table(&columns);

    assert_eq!(table.len(), 3);
    for (name, stats) in &table {
        let stats = stats.as_ref().unwrap();
        assert_eq!(stats.months, 119, "{}", name);
        assert!(stats.max_drawdown <= 0.0);
        assert!(stats.vol > 0.0);
    }

    let rows: BTreeMap<_, _> = table
        .into_iter()
        .map(|(name, stats)| (name, stats.unwrap()))
        .collect();
    let csv = ResultFormatter::to_csv(&rows);
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn test_run_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("prices");
    fs::create_dir(&data_dir).unwrap();

    let mut stocks = String::from("date,close\n");
    let mut bonds = String::from("month,return_pct\n");
    for (i, d) in month_range(month(2018, 1), month(2020, 12)).iter().enumerate() {
        stocks.push_str(&format!("{},{}\n", d.format("%Y-%m-%d"), 100.0 + i as f64));
        bonds.push_str(&format!("{},{}\n", d.format("%Y-%m"), if i % 2 == 0 { 0.5 } else { -0.2 }));
    }
    fs::write(data_dir.join("stocks.csv"), stocks).unwrap();
    fs::write(data_dir.join("bonds.csv"), bonds).unwrap();

    let run_file = format!(
        r#"
[simulation]
initial_capital = 50000.0

[tax]
rate = 0.2
taxable = ["stocks"]

[data]
directory = "{}"

[data.series.bonds]
kind = "monthly-returns-pct"

[allocation]
name = "root"
weight = 1.0

[[allocation.children]]
name = "stocks"
weight = 0.5

[[allocation.children]]
name = "bonds"
weight = 0.5
"#,
        data_dir.display().to_string().replace('\\', "/")
    );
    let path = dir.path().join("run.toml");
    fs::write(&path, run_file).unwrap();

    let file_config = RunFileConfig::load(&path).unwrap();
    let sim_config = file_config.to_simulation_config().unwrap();
    let provider = file_config.data.provider().unwrap();
    let result = Simulator::new(sim_config).unwrap().run_provider(&provider).unwrap();

    assert_eq!(result.values.len(), 36);
    assert_eq!(result.rebalance_dates, vec![month(2019, 1), month(2020, 1)]);
    // Rising stocks are trimmed every January, so gains from 2019 are taxed in 2020.
    assert!(result.settlements.iter().any(|s| s.date == month(2020, 1)));
    assert!(result.lots.contains_key("stocks"));
    assert!(!result.lots.contains_key("bonds"));
}

#[test]
fn test_csv_provider_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let provider = CsvPriceProvider::new(dir.path(), DataConfig::default());
    let names: BTreeSet<String> = ["absent".to_string()].into_iter().collect();
    assert!(matches!(
        provider.load(&names),
        Err(SimulationError::CsvError(_)) | Err(SimulationError::IoError(_))
    ));
}

#[test]
fn test_json_report_round_trips_through_serde() {
    let data = PriceData::new()
        .with_series("A", create_synthetic_series(month(2020, 1), 24, 10.0, 0.01))
        .with_series("B", create_synthetic_series(month(2020, 1), 24, 10.0, -0.005));
    let config = SimulationConfig::new(1_000.0, flatten(&two_leaf_tree(0.5, 0.5)).unwrap())
        .with_tax(0.1, ["A"]);
    let result = Simulator::new(config).unwrap().run(&data).unwrap();

    let json = ResultFormatter::to_json(&result).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["values"].as_array().unwrap().len(), 24);
    assert!(parsed["lots"]["A"].is_array());
}
