//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the QuoteStore trait.
//! All writes go through the injected [`WriteSerializer`]; reads open their
//! own read-only connections so they never queue behind a writer.

use crate::compare::DEFAULT_TIMEZONE;
use crate::config::StorageConfig;
use crate::record::{ValidItem, ValidatedBatch};
use crate::storage::schema::EPOCH_SENTINEL;
use crate::storage::serializer::WriteSerializer;
use crate::storage::traits::{QuoteStore, StorageError, StorageResult};
use crate::storage::{
    IngestReport, ItemRow, LotRecord, OfferRow, OfferSnapshot, RegionRow, StoreStatistics,
    SupplierSummary,
};
use crate::ValidationError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const FIND_ITEM_ID_SQL: &str = "
    SELECT i.id FROM items i
    JOIN lots l ON i.lot_id = l.id
    WHERE l.supplier = ?1 AND i.product_code = ?2
    ORDER BY i.id DESC
    LIMIT 1";

const INSERT_ITEM_SQL: &str = "
    INSERT INTO items
    (lot_id, product_code, name, brand, image_url, unit_price, qty_requested,
     qty_available, total_value, purchasable, status_text, message)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const UPDATE_ITEM_SQL: &str = "
    UPDATE items SET
        lot_id = ?1, name = ?2, brand = ?3, image_url = ?4, unit_price = ?5,
        qty_requested = ?6, qty_available = ?7, total_value = ?8, purchasable = ?9,
        status_text = ?10, message = ?11
    WHERE id = ?12";

const UPSERT_CONTROL_SQL: &str = "
    INSERT INTO control_state (id, last_processed_at, updated_at) VALUES (1, ?1, ?2)
    ON CONFLICT(id) DO UPDATE SET
        last_processed_at = excluded.last_processed_at,
        updated_at = excluded.updated_at";

const OFFER_ROWS_SQL: &str = "
    SELECT i.id, i.product_code, i.name, i.brand, i.image_url, l.supplier,
           i.unit_price, i.qty_available, l.processed_at,
           r.region_code, r.price, r.qty_available, r.purchasable
    FROM items i
    JOIN lots l ON i.lot_id = l.id
    LEFT JOIN regional_details r ON r.item_id = i.id
    WHERE CAST(i.unit_price AS REAL) > 0
    ORDER BY i.product_code ASC, l.processed_at DESC, i.id DESC, r.region_code ASC";

/// SQLite storage backend
pub struct SqliteStore {
    writer: Arc<WriteSerializer>,
    path: PathBuf,
    busy_timeout: Duration,
    legacy_timezone: Tz,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path with its own write serializer
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - Driver-level wait on a locked database
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let writer = WriteSerializer::open(path, busy_timeout)?;
        Ok(Self::with_serializer(path, busy_timeout, Arc::new(writer)))
    }

    /// Opens the store described by the `[storage]` config section
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Self::open(
            Path::new(&config.database_path),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    /// Builds a store around an existing serializer
    ///
    /// The serializer must own a connection to the same database file.
    pub fn with_serializer(path: &Path, busy_timeout: Duration, writer: Arc<WriteSerializer>) -> Self {
        Self {
            writer,
            path: path.to_path_buf(),
            busy_timeout,
            legacy_timezone: DEFAULT_TIMEZONE,
        }
    }

    /// Sets the zone that bare `YYYY-MM-DD HH:MM:SS` timestamps were written in
    pub fn with_legacy_timezone(mut self, timezone: Tz) -> Self {
        self.legacy_timezone = timezone;
        self
    }

    /// Returns the write serializer shared by this store
    pub fn serializer(&self) -> &Arc<WriteSerializer> {
        &self.writer
    }

    /// Returns the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> StorageResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl QuoteStore for SqliteStore {
    // ===== Ingestion =====

    fn ingest_batch(&self, batch: &ValidatedBatch) -> StorageResult<IngestReport> {
        let report = self.writer.run_in_transaction(|tx| write_batch(tx, batch))?;

        tracing::info!(
            "Committed lot {} from {}: {} inserted, {} updated, {} regions, {} skipped",
            report.lot_id,
            batch.supplier,
            report.inserted,
            report.updated,
            report.regions_written,
            report.skipped
        );

        Ok(report)
    }

    // ===== Control State =====

    fn mark_processed(&self, at: Option<DateTime<Utc>>) -> StorageResult<DateTime<Utc>> {
        let stored = format_timestamp(&at.unwrap_or_else(Utc::now));
        if stored == EPOCH_SENTINEL {
            return Err(ValidationError::ReservedTimestamp(stored).into());
        }
        let updated_at = format_timestamp(&Utc::now());

        self.writer.run_in_transaction(|tx| {
            tx.execute(UPSERT_CONTROL_SQL, params![stored, updated_at])?;
            Ok(())
        })?;

        tracing::info!("Marked processing done at {}", stored);
        parse_timestamp(&stored, &self.legacy_timezone)
    }

    fn reset(&self) -> StorageResult<()> {
        let updated_at = format_timestamp(&Utc::now());

        let (lots, items, regions) = self.writer.run_in_transaction(|tx| {
            let regions = tx.execute("DELETE FROM regional_details", [])?;
            let items = tx.execute("DELETE FROM items", [])?;
            let lots = tx.execute("DELETE FROM lots", [])?;
            tx.execute(UPSERT_CONTROL_SQL, params![EPOCH_SENTINEL, updated_at])?;
            Ok((lots, items, regions))
        })?;

        tracing::info!(
            "Reset store: removed {} lots, {} items, {} regional details",
            lots,
            items,
            regions
        );

        Ok(())
    }

    fn read_last_processed(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.open_reader()?;
        read_control(&conn, &self.legacy_timezone)
    }

    // ===== Reads =====

    fn load_offer_snapshot(&self) -> StorageResult<OfferSnapshot> {
        let mut conn = self.open_reader()?;

        // Both reads share one WAL snapshot
        let tx = conn.transaction()?;
        let offers = load_offers(&tx, &self.legacy_timezone)?;
        let last_processed = read_control(&tx, &self.legacy_timezone)?;
        tx.commit()?;

        Ok(OfferSnapshot {
            offers,
            last_processed,
        })
    }

    fn find_item(&self, supplier: &str, product_code: &str) -> StorageResult<Option<ItemRow>> {
        let zone = self.legacy_timezone;
        let conn = self.open_reader()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, l.id, l.supplier, l.processed_at, l.total_items,
                    i.product_code, i.name, i.brand, i.image_url, i.unit_price,
                    i.qty_requested, i.qty_available, i.total_value, i.purchasable,
                    i.status_text, i.message
             FROM items i
             JOIN lots l ON i.lot_id = l.id
             WHERE l.supplier = ?1 AND i.product_code = ?2
             ORDER BY i.id DESC
             LIMIT 1",
        )?;

        let item = stmt
            .query_row(params![supplier, product_code], |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    lot: LotRecord {
                        id: row.get(1)?,
                        supplier: row.get(2)?,
                        processed_at: timestamp_column(row, 3, &zone)?,
                        total_items: row.get(4)?,
                    },
                    product_code: row.get(5)?,
                    name: row.get(6)?,
                    brand: row.get(7)?,
                    image_url: row.get(8)?,
                    unit_price: decimal_column(row, 9)?,
                    qty_requested: row.get(10)?,
                    qty_available: row.get(11)?,
                    total_value: decimal_column(row, 12)?,
                    purchasable: row.get(13)?,
                    status_text: row.get(14)?,
                    message: row.get(15)?,
                })
            })
            .optional()?;

        Ok(item)
    }

    fn regions_for_item(&self, item_id: i64) -> StorageResult<Vec<RegionRow>> {
        let conn = self.open_reader()?;
        let mut stmt = conn.prepare(
            "SELECT region_code, price, qty_available, purchasable
             FROM regional_details WHERE item_id = ?1 ORDER BY region_code",
        )?;

        let regions = stmt
            .query_map(params![item_id], |row| {
                Ok(RegionRow {
                    region_code: row.get(0)?,
                    price: decimal_column(row, 1)?,
                    qty_available: row.get(2)?,
                    purchasable: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(regions)
    }

    // ===== Statistics =====

    fn count_statistics(&self) -> StorageResult<StoreStatistics> {
        let mut conn = self.open_reader()?;
        let tx = conn.transaction()?;

        let stats = StoreStatistics {
            lots: count(&tx, "SELECT COUNT(*) FROM lots")?,
            items: count(&tx, "SELECT COUNT(*) FROM items")?,
            priced_items: count(
                &tx,
                "SELECT COUNT(*) FROM items WHERE CAST(unit_price AS REAL) > 0",
            )?,
            regional_details: count(&tx, "SELECT COUNT(*) FROM regional_details")?,
            suppliers: count(&tx, "SELECT COUNT(DISTINCT supplier) FROM lots")?,
            distinct_products: count(&tx, "SELECT COUNT(DISTINCT product_code) FROM items")?,
            last_processed: read_control(&tx, &self.legacy_timezone)?,
        };
        tx.commit()?;

        Ok(stats)
    }

    fn supplier_summaries(&self) -> StorageResult<Vec<SupplierSummary>> {
        let zone = self.legacy_timezone;
        let conn = self.open_reader()?;
        let mut stmt = conn.prepare(
            "SELECT l.supplier, COUNT(*), MAX(l.processed_at),
                    (SELECT COUNT(*) FROM items i
                     JOIN lots l2 ON i.lot_id = l2.id
                     WHERE l2.supplier = l.supplier)
             FROM lots l
             GROUP BY l.supplier
             ORDER BY l.supplier",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let last_lot_at = match row.get::<_, Option<String>>(2)? {
                    Some(_) => Some(timestamp_column(row, 2, &zone)?),
                    None => None,
                };
                Ok(SupplierSummary {
                    supplier: row.get(0)?,
                    lots: row.get::<_, i64>(1)? as u64,
                    last_lot_at,
                    live_items: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }
}

/// Writes one validated batch inside an open transaction
fn write_batch(tx: &Transaction<'_>, batch: &ValidatedBatch) -> StorageResult<IngestReport> {
    tx.execute(
        "INSERT INTO lots (supplier, processed_at, total_items) VALUES (?1, ?2, ?3)",
        params![
            batch.supplier,
            format_timestamp(&batch.processed_at),
            batch.declared_total
        ],
    )?;
    let lot_id = tx.last_insert_rowid();

    let mut report = IngestReport {
        lot_id,
        inserted: 0,
        updated: 0,
        regions_written: 0,
        skipped: batch.skipped,
    };

    for item in &batch.items {
        let item_id = match find_item_id(tx, &batch.supplier, &item.product_code)? {
            Some(id) => {
                update_item(tx, id, lot_id, item)?;
                report.updated += 1;
                id
            }
            None => {
                let id = insert_item(tx, lot_id, item)?;
                report.inserted += 1;
                id
            }
        };

        report.regions_written += replace_regions(tx, item_id, item)?;

        tracing::debug!(
            "Upserted {}/{} as item {} with {} regions",
            batch.supplier,
            item.product_code,
            item_id,
            item.regions.len()
        );
    }

    Ok(report)
}

/// Natural-key lookup through the owning lot's supplier
fn find_item_id(conn: &Connection, supplier: &str, product_code: &str) -> StorageResult<Option<i64>> {
    let id = conn
        .prepare_cached(FIND_ITEM_ID_SQL)?
        .query_row(params![supplier, product_code], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn insert_item(conn: &Connection, lot_id: i64, item: &ValidItem) -> StorageResult<i64> {
    let id = conn.prepare_cached(INSERT_ITEM_SQL)?.insert(params![
        lot_id,
        item.product_code,
        item.name,
        item.brand,
        item.image_url,
        decimal_text(item.unit_price),
        item.qty_requested,
        item.qty_available,
        decimal_text(item.total_value),
        item.purchasable,
        item.status_text,
        item.message,
    ])?;
    Ok(id)
}

fn update_item(conn: &Connection, item_id: i64, lot_id: i64, item: &ValidItem) -> StorageResult<()> {
    conn.prepare_cached(UPDATE_ITEM_SQL)?.execute(params![
        lot_id,
        item.name,
        item.brand,
        item.image_url,
        decimal_text(item.unit_price),
        item.qty_requested,
        item.qty_available,
        decimal_text(item.total_value),
        item.purchasable,
        item.status_text,
        item.message,
        item_id,
    ])?;
    Ok(())
}

/// Deletes every regional detail of the item, then inserts the current ones
fn replace_regions(conn: &Connection, item_id: i64, item: &ValidItem) -> StorageResult<usize> {
    conn.prepare_cached("DELETE FROM regional_details WHERE item_id = ?1")?
        .execute(params![item_id])?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO regional_details (item_id, region_code, price, qty_available, purchasable)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for region in &item.regions {
        insert.execute(params![
            item_id,
            region.region_code,
            decimal_text(region.price),
            region.qty_available,
            region.purchasable,
        ])?;
    }

    Ok(item.regions.len())
}

/// Loads priced items with their regions, one `OfferRow` per item
fn load_offers(conn: &Connection, zone: &Tz) -> StorageResult<Vec<OfferRow>> {
    let mut stmt = conn.prepare(OFFER_ROWS_SQL)?;
    let mut rows = stmt.query([])?;

    let mut offers: Vec<OfferRow> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    while let Some(row) = rows.next()? {
        let item_id: i64 = row.get(0)?;

        let position = match positions.get(&item_id) {
            Some(&position) => position,
            None => {
                offers.push(OfferRow {
                    item_id,
                    product_code: row.get(1)?,
                    name: row.get(2)?,
                    brand: row.get(3)?,
                    image_url: row.get(4)?,
                    supplier: row.get(5)?,
                    unit_price: decimal_column(row, 6)?.unwrap_or_default(),
                    qty_available: row.get(7)?,
                    processed_at: timestamp_column(row, 8, zone)?,
                    regions: Vec::new(),
                });
                positions.insert(item_id, offers.len() - 1);
                offers.len() - 1
            }
        };

        if let Some(region_code) = row.get::<_, Option<String>>(9)? {
            offers[position].regions.push(RegionRow {
                region_code,
                price: decimal_column(row, 10)?,
                qty_available: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
                purchasable: row.get::<_, Option<bool>>(12)?.unwrap_or(false),
            });
        }
    }

    Ok(offers)
}

/// Reads the control marker, mapping the epoch sentinel to `None`
fn read_control(conn: &Connection, zone: &Tz) -> StorageResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_processed_at FROM control_state WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) if raw.trim() == EPOCH_SENTINEL => Ok(None),
        Some(raw) => Ok(Some(parse_timestamp(&raw, zone)?)),
        None => Ok(None),
    }
}

fn count(conn: &Connection, sql: &str) -> StorageResult<u64> {
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

fn timestamp_column(row: &Row<'_>, idx: usize, zone: &Tz) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw, zone)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads an amount stored as decimal text; numeric cells are converted as well
fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let conversion = |ty: Type, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, ty, e)
    };

    let value = match row.get_ref(idx)? {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(v) => Decimal::from(v),
        ValueRef::Real(v) => Decimal::try_from(v).map_err(|e| conversion(Type::Real, Box::new(e)))?,
        ValueRef::Text(raw) => std::str::from_utf8(raw)
            .map_err(|e| conversion(Type::Text, Box::new(e)))?
            .trim()
            .parse::<Decimal>()
            .map_err(|e| conversion(Type::Text, Box::new(e)))?,
        ValueRef::Blob(_) => return Err(conversion(Type::Blob, "amount stored as blob".into())),
    };

    Ok(Some(value))
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.normalize().to_string())
}

/// Formats a timestamp the way it is stored: fixed-width RFC 3339 in UTC,
/// so text ordering matches time ordering
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
///
/// Accepts RFC 3339 with any offset, and the bare `YYYY-MM-DD HH:MM:SS`
/// form that older rows may carry. Bare values are local time in `zone`.
pub fn parse_timestamp(raw: &str, zone: &Tz) -> StorageResult<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| StorageError::Corrupt(format!("unrecognized timestamp '{}'", raw)))?;

    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| StorageError::Corrupt(format!("'{}' does not exist in {}", raw, zone)))
}
