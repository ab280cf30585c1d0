//! Supplier-Quotes: cross-supplier price ledger
//!
//! This crate stores price and stock snapshots collected from many suppliers,
//! keeping exactly one live item per (supplier, product code), and builds a
//! best-offer-first comparison across all suppliers.

pub mod compare;
pub mod config;
pub mod ingest;
pub mod output;
pub mod record;
pub mod storage;

use thiserror::Error;

/// Main error type for Supplier-Quotes operations
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid batch: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),
}

/// Errors raised while validating an inbound batch, before anything is persisted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("supplier name is empty")]
    EmptySupplier,

    #[error("batch for supplier '{0}' carries no items")]
    EmptyBatch(String),

    #[error("item '{code}': {field} must not be negative")]
    Negative { code: String, field: &'static str },

    #[error("item '{code}': {field} is not a finite number")]
    NotFinite { code: String, field: &'static str },

    #[error("{0} is reserved for the never-processed marker")]
    ReservedTimestamp(String),
}

/// Result type alias for Supplier-Quotes operations
pub type Result<T> = std::result::Result<T, QuoteError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use compare::{compare_all, ComparisonReport, ComparisonResponse};
pub use config::Config;
pub use ingest::{ingest, IngestOutcome, RetryPolicy};
pub use record::{BatchEnvelope, ItemRecord, RegionRecord, ValidatedBatch};
pub use storage::{QuoteStore, SqliteStore, StorageError, WriteSerializer};
