//! Storage module for persisting supplier quotes
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Single-writer serialization of every write transaction
//! - Batch ingestion with natural-key upsert and region replace-sync
//! - The singleton control-state marker
//! - Snapshot reads feeding the comparison engine

mod schema;
mod serializer;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, EPOCH_SENTINEL, SCHEMA_VERSION};
pub use serializer::WriteSerializer;
pub use sqlite::{format_timestamp, parse_timestamp, SqliteStore};
pub use traits::{QuoteStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Represents a lot in the database
#[derive(Debug, Clone, PartialEq)]
pub struct LotRecord {
    pub id: i64,
    pub supplier: String,
    pub processed_at: DateTime<Utc>,
    pub total_items: u32,
}

/// Represents the live item row for one (supplier, product code) pair
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: i64,
    pub lot: LotRecord,
    pub product_code: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub unit_price: Option<Decimal>,
    pub qty_requested: u32,
    pub qty_available: f64,
    pub total_value: Option<Decimal>,
    pub purchasable: bool,
    pub status_text: Option<String>,
    pub message: Option<String>,
}

/// Represents one regional detail row
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRow {
    pub region_code: String,
    pub price: Option<Decimal>,
    pub qty_available: f64,
    pub purchasable: bool,
}

/// One priced item joined with its lot and regions
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRow {
    pub item_id: i64,
    pub product_code: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub supplier: String,
    pub unit_price: Decimal,
    pub qty_available: f64,
    pub processed_at: DateTime<Utc>,
    pub regions: Vec<RegionRow>,
}

/// Everything the comparison engine reads, taken from one snapshot
#[derive(Debug, Clone, Default)]
pub struct OfferSnapshot {
    /// Ordered by product code, then most recent lot first
    pub offers: Vec<OfferRow>,
    pub last_processed: Option<DateTime<Utc>>,
}

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub lot_id: i64,
    pub inserted: usize,
    pub updated: usize,
    pub regions_written: usize,
    pub skipped: usize,
}

impl IngestReport {
    /// Number of items written by the batch
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Row counts across the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStatistics {
    pub lots: u64,
    pub items: u64,
    pub priced_items: u64,
    pub regional_details: u64,
    pub suppliers: u64,
    pub distinct_products: u64,
    pub last_processed: Option<DateTime<Utc>>,
}

/// Per-supplier view of lots and live items
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierSummary {
    pub supplier: String,
    pub lots: u64,
    pub live_items: u64,
    pub last_lot_at: Option<DateTime<Utc>>,
}
