//! Performance benchmarks for the portfolio simulator.
//!
//! Run with: cargo bench

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use portsim::allocation::{flatten, AllocationNode};
use portsim::analytics::{compute_stats, correlation_matrix, stats_table};
use portsim::data::{PriceData, PriceSeries};
use portsim::lots::LotLedger;
use portsim::simulator::{RebalancePolicy, SimulationConfig, Simulator};
use portsim::types::month_range;
use std::collections::BTreeMap;

/// Generate a synthetic monthly price path.
fn generate_prices(months: usize, seed: f64) -> Vec<f64> {
    let mut price = 100.0;
    (0..months)
        .map(|i| {
            let noise = ((i as f64 * 0.7 + seed).sin() * 0.03 + (i as f64 * 1.3).cos() * 0.01) * 0.5;
            price *= 1.0 + 0.005 + noise;
            price
        })
        .collect()
}

fn generate_data(instruments: usize, months: usize) -> PriceData {
    let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
    let dates = month_range(start, NaiveDate::from_ymd_opt(2200, 1, 1).unwrap());
    let mut data = PriceData::new();
    for i in 0..instruments {
        let prices = generate_prices(months, i as f64);
        let series = PriceSeries::from_pairs(dates.iter().copied().zip(prices)).unwrap();
        data.insert(format!("fund{}", i), series);
    }
    data
}

/// Balanced tree of `groups` internal nodes with `per_group` leaves each.
fn generate_tree(groups: usize, per_group: usize) -> AllocationNode {
    let children = (0..groups)
        .map(|g| {
            let leaves = (0..per_group)
                .map(|l| AllocationNode::leaf(format!("fund{}", g * per_group + l), 1.0 / per_group as f64))
                .collect();
            AllocationNode::internal(format!("group{}", g), 1.0 / groups as f64, leaves)
        })
        .collect();
    AllocationNode::internal("root", 1.0, children)
}

/// Benchmark allocation flattening.
fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");

    for (groups, per_group) in [(2, 2), (4, 4), (10, 10)] {
        let tree = generate_tree(groups, per_group);
        group.bench_with_input(
            BenchmarkId::new("leaves", groups * per_group),
            &tree,
            |b, tree| b.iter(|| flatten(black_box(tree))),
        );
    }

    group.finish();
}

/// Benchmark the FIFO ledger.
fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    group.bench_function("buy_100_sell_across_lots", |b| {
        b.iter(|| {
            let mut ledger = LotLedger::new("X");
            for i in 0..100 {
                ledger.buy(10.0, 100.0 + i as f64).unwrap();
            }
            ledger.sell(black_box(555.0)).unwrap()
        })
    });

    group.finish();
}

/// Benchmark full simulations.
fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");

    for months in [120, 360, 1200] {
        let data = generate_data(16, months);
        let allocation = flatten(&generate_tree(4, 4)).unwrap();
        let taxable: Vec<String> = (0..8).map(|i| format!("fund{}", i)).collect();
        let config = SimulationConfig::new(1_000_000.0, allocation)
            .with_tax(0.25, taxable)
            .with_rebalance(RebalancePolicy::Quarterly);
        let simulator = Simulator::new(config).unwrap();

        group.bench_with_input(BenchmarkId::new("months", months), &data, |b, data| {
            b.iter(|| simulator.run(black_box(data)))
        });
    }

    group.finish();
}

/// Benchmark statistics.
fn bench_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats");

    let values = generate_prices(600, 0.0);
    group.bench_function("compute_stats_600", |b| {
        b.iter(|| compute_stats(black_box(&values)))
    });

    let columns: BTreeMap<String, Vec<f64>> = (0..32)
        .map(|i| (format!("fund{}", i), generate_prices(600, i as f64)))
        .collect();
    group.bench_function("stats_table_32x600", |b| {
        b.iter(|| stats_table(black_box(&columns)))
    });
    group.bench_function("correlation_matrix_32x600", |b| {
        b.iter(|| correlation_matrix(black_box(&columns)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_flatten,
    bench_ledger,
    bench_simulation,
    bench_stats
);
criterion_main!(benches);
