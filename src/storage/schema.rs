//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the quote ledger.

/// Stored in place of a real timestamp when nothing has been processed yet
pub const EPOCH_SENTINEL: &str = "1970-01-01T00:00:00.000000Z";

/// Current schema version, recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One ingestion batch from one supplier
CREATE TABLE IF NOT EXISTS lots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    supplier TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    total_items INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_lots_supplier ON lots(supplier);

-- Latest known state of one (supplier, product code) pair.
-- The supplier is reached through lot_id, so the natural key is enforced
-- by lookup-before-write rather than a UNIQUE constraint.
-- Amounts are stored as decimal text to keep them exact.
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lot_id INTEGER NOT NULL REFERENCES lots(id),
    product_code TEXT NOT NULL,
    name TEXT,
    brand TEXT,
    image_url TEXT,
    unit_price TEXT,
    qty_requested INTEGER NOT NULL DEFAULT 0,
    qty_available REAL NOT NULL DEFAULT 0,
    total_value TEXT,
    purchasable INTEGER NOT NULL DEFAULT 0,
    status_text TEXT,
    message TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_product_code ON items(product_code);
CREATE INDEX IF NOT EXISTS idx_items_lot ON items(lot_id);

-- Region-scoped price and stock, replaced as a unit on every re-ingestion
CREATE TABLE IF NOT EXISTS regional_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id),
    region_code TEXT NOT NULL,
    price TEXT,
    qty_available REAL NOT NULL DEFAULT 0,
    purchasable INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_regional_details_item ON regional_details(item_id);

-- Singleton marker of the last successful processing run
CREATE TABLE IF NOT EXISTS control_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_processed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

INSERT OR IGNORE INTO control_state (id, last_processed_at, updated_at)
VALUES (1, '1970-01-01T00:00:00.000000Z', '1970-01-01T00:00:00.000000Z');
"#;

/// Initializes the database schema
///
/// Safe to run against an existing database: every statement is idempotent.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
