//! Storage traits and error types
//!
//! This module defines the trait interface for the quote store and
//! associated error types.

use crate::record::ValidatedBatch;
use crate::storage::{
    IngestReport, ItemRow, OfferSnapshot, RegionRow, StoreStatistics, SupplierSummary,
};
use crate::ValidationError;
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Invalid batch: {0}")]
    Validation(#[from] ValidationError),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true when the failure is lock contention and the whole
    /// operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Busy(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for quote store implementations
///
/// Write operations (`ingest_batch`, `mark_processed`, `reset`) are
/// serialized by the implementation; read operations never wait on writers
/// and observe either the state before or after a write, never a part of it.
pub trait QuoteStore: Send + Sync {
    // ===== Ingestion =====

    /// Persists one supplier batch atomically
    ///
    /// Creates a new lot, upserts every item by (supplier, product code)
    /// and replaces each item's regional details. Nothing is committed if
    /// any step fails.
    fn ingest_batch(&self, batch: &ValidatedBatch) -> StorageResult<IngestReport>;

    // ===== Control State =====

    /// Records the last successful processing time, defaulting to now
    ///
    /// Returns the timestamp that was stored. The epoch itself is the
    /// never-processed sentinel and is rejected.
    fn mark_processed(&self, at: Option<DateTime<Utc>>) -> StorageResult<DateTime<Utc>>;

    /// Empties lots, items and regional details and restores the sentinel
    /// control value, all in one transaction
    fn reset(&self) -> StorageResult<()>;

    /// Reads the last processed time; `None` while the sentinel is stored
    fn read_last_processed(&self) -> StorageResult<Option<DateTime<Utc>>>;

    // ===== Reads =====

    /// Loads every positively priced item with its lot and regions, plus the
    /// control timestamp, from a single read snapshot
    fn load_offer_snapshot(&self) -> StorageResult<OfferSnapshot>;

    /// Looks up the live item for a (supplier, product code) pair
    fn find_item(&self, supplier: &str, product_code: &str) -> StorageResult<Option<ItemRow>>;

    /// Lists the regional details of an item, ordered by region code
    fn regions_for_item(&self, item_id: i64) -> StorageResult<Vec<RegionRow>>;

    // ===== Statistics =====

    /// Counts rows in every table
    fn count_statistics(&self) -> StorageResult<StoreStatistics>;

    /// Summarizes lots and live items per supplier, ordered by supplier name
    fn supplier_summaries(&self) -> StorageResult<Vec<SupplierSummary>>;
}
