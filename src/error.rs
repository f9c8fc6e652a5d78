//! Error types for the portfolio simulator.

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for allocation, simulation and statistics operations.
///
/// Every variant except the ambient I/O ones is fatal for a simulation run:
/// the simulator performs no retries and no silent recovery.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Duplicate leaf '{name}' in allocation tree")]
    DuplicateLeaf { name: String },

    #[error("Invalid price {price} for {instrument} on {date}")]
    InvalidPrice {
        instrument: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("Invalid lot price {price} for {instrument}")]
    InvalidUnitPrice { instrument: String, price: f64 },

    #[error("Missing price for {instrument} on {date}")]
    MissingPrice { instrument: String, date: NaiveDate },

    #[error("Insufficient lots for {instrument}: requested {requested}, available {available}")]
    InsufficientLots {
        instrument: String,
        requested: f64,
        available: f64,
    },

    #[error("Invalid quantity {quantity} for {instrument}")]
    InvalidQuantity { instrument: String, quantity: f64 },

    #[error("Tax owed {owed:.2} exceeds portfolio value {value:.2} on {date}")]
    TaxExceedsValue {
        date: NaiveDate,
        owed: f64,
        value: f64,
    },

    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("No data loaded")]
    NoData,

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, SimulationError>;
