//! Terminal, JSON and CSV rendering of simulation results and statistics.

use crate::analytics::StatsRecord;
use crate::error::Result;
use crate::simulator::{SimulationConfig, SimulationResult};
use crate::types::Trade;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{builder::Builder, settings::Style};

/// Row label used for the simulated portfolio in comparison tables.
pub const PORTFOLIO_LABEL: &str = "portfolio";

/// Format results for terminal display and export.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a summary of a simulation run to stdout.
    pub fn print_report(config: &SimulationConfig, result: &SimulationResult) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " SIMULATION RESULTS ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!(
            "  Period:          {} to {}",
            result.start_date.format("%Y-%m"),
            result.end_date.format("%Y-%m")
        );
        println!("  Months:          {}", result.values.len());
        println!("  Rebalance:       {}", config.rebalance);
        println!("  Rebalances:      {}", result.rebalance_dates.len());
        println!();

        let final_value = result.final_value().unwrap_or(config.initial_capital);
        let total_return_pct = (final_value / config.initial_capital - 1.0) * 100.0;
        println!("{}", "Performance".bold().underline());
        println!("  Initial Capital: ${:>14.2}", config.initial_capital);
        println!(
            "  Final Value:     ${:>14.2}  {}",
            final_value,
            Self::format_pct_change(total_return_pct)
        );
        println!();

        println!("{}", "Tax".bold().underline());
        println!("  Tax Rate:        {:>15.2}%", config.tax_rate * 100.0);
        println!("  Settlements:     {:>15}", result.settlements.len());
        println!("  Total Assessed:  ${:>14.2}", result.total_tax());
        println!(
            "  Pending Gains:   ${:>14.2}",
            result.tax.realized_gains_this_period
        );
        println!("  Owed:            ${:>14.2}", result.tax.tax_owed_carried_forward);
        println!();

        println!("{}", "Allocation".bold().underline());
        println!("{}", Self::holdings_table(config, result));
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    /// Format percentage change with color.
    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    fn format_ratio(value: Option<f64>) -> String {
        match value {
            Some(v) if v.is_finite() => format!("{:.2}", v),
            _ => "n/a".to_string(),
        }
    }

    /// Target weight, held shares and taxable flag per instrument.
    pub fn holdings_table(config: &SimulationConfig, result: &SimulationResult) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Instrument", "Weight %", "Shares", "Taxable", "Lots"]);

        for (instrument, weight) in config.allocation.iter() {
            let shares = result.holdings.get(instrument).copied().unwrap_or(0.0);
            let lots = result.lots.get(instrument).map_or(0, Vec::len);
            builder.push_record([
                instrument.to_string(),
                format!("{:.2}", weight * 100.0),
                format!("{:.4}", shares),
                if config.taxable.contains(instrument) { "yes" } else { "no" }.to_string(),
                lots.to_string(),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// One statistics row per series.
    pub fn stats_table(rows: &BTreeMap<String, StatsRecord>) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Series", "Months", "CAGR %", "Vol %", "Sharpe", "Tau", "Calmar", "Max DD %", "Skew",
            "Kurtosis", "Best %", "Worst %",
        ]);

        // The portfolio row goes first when present.
        let ordered = rows
            .get_key_value(PORTFOLIO_LABEL)
            .into_iter()
            .chain(rows.iter().filter(|(name, _)| name.as_str() != PORTFOLIO_LABEL));

        for (name, stats) in ordered {
            builder.push_record([
                name.clone(),
                stats.months.to_string(),
                format!("{:.2}", stats.cagr * 100.0),
                format!("{:.2}", stats.vol * 100.0),
                format!("{:.2}", stats.sharpe),
                Self::format_ratio(stats.tau),
                Self::format_ratio(stats.calmar),
                format!("{:.2}", stats.max_drawdown * 100.0),
                format!("{:.3}", stats.skew),
                format!("{:.3}", stats.kurtosis),
                format!("{:.2}", stats.best_month * 100.0),
                format!("{:.2}", stats.worst_month * 100.0),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print the statistics table.
    pub fn print_stats(rows: &BTreeMap<String, StatsRecord>) {
        println!("{}", Self::stats_table(rows));
    }

    /// Square correlation table.
    pub fn correlation_table(matrix: &BTreeMap<String, BTreeMap<String, f64>>) -> String {
        let mut builder = Builder::new();
        let mut header = vec![String::new()];
        header.extend(matrix.keys().cloned());
        builder.push_record(header);

        for (row, cells) in matrix {
            let mut record = vec![row.clone()];
            record.extend(cells.values().map(|c| Self::format_ratio(Some(*c))));
            builder.push_record(record);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Executed trades, most recent last. `limit = 0` shows everything.
    pub fn trades_table(trades: &[Trade], limit: usize) -> String {
        let shown = if limit > 0 && limit < trades.len() {
            &trades[trades.len() - limit..]
        } else {
            trades
        };

        let mut builder = Builder::new();
        builder.push_record(["Date", "Instrument", "Side", "Qty", "Price", "Value", "Gain"]);
        for trade in shown {
            let gain = match trade.realized_gain {
                Some(g) if g >= 0.0 => format!("+{:.2}", g),
                Some(g) => format!("{:.2}", g),
                None => "-".to_string(),
            };
            builder.push_record([
                trade.date.format("%Y-%m").to_string(),
                trade.instrument.clone(),
                trade.side.to_string(),
                format!("{:.4}", trade.quantity),
                format!("{:.2}", trade.price),
                format!("{:.2}", trade.value()),
                gain,
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Export any result type to pretty JSON.
    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    /// Export one statistics row to a CSV line.
    pub fn to_csv_line(name: &str, stats: &StatsRecord) -> String {
        let opt = |v: Option<f64>| v.map(|x| format!("{:.6}", x)).unwrap_or_default();
        format!(
            "{},{},{:.6},{:.6},{:.6},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            name,
            stats.months,
            stats.cagr,
            stats.vol,
            stats.sharpe,
            opt(stats.tau),
            opt(stats.calmar),
            stats.max_drawdown,
            stats.skew,
            stats.kurtosis,
            stats.raw_skew,
            stats.raw_kurtosis,
            stats.total_return,
            stats.best_month,
            stats.worst_month
        )
    }

    /// Get CSV header.
    pub fn csv_header() -> &'static str {
        "series,months,cagr,vol,sharpe,tau,calmar,max_drawdown,skew,kurtosis,raw_skew,raw_kurtosis,total_return,best_month,worst_month"
    }

    /// Header plus one line per row, portfolio first.
    pub fn to_csv(rows: &BTreeMap<String, StatsRecord>) -> String {
        let mut out = String::from(Self::csv_header());
        out.push('\n');
        let ordered = rows
            .get_key_value(PORTFOLIO_LABEL)
            .into_iter()
            .chain(rows.iter().filter(|(name, _)| name.as_str() != PORTFOLIO_LABEL));
        for (name, stats) in ordered {
            out.push_str(&Self::to_csv_line(name, stats));
            out.push('\n');
        }
        out
    }
}
