//! Inbound record types
//!
//! Scraping collaborators hand over one batch per supplier run. This module
//! holds the wire shape of those batches and the validated form the storage
//! layer persists:
//! - `ItemRecord` / `RegionRecord`: loosely-filled records as scraped
//! - `BatchEnvelope`: supplier, timestamp, declared count and items
//! - `ValidatedBatch`: the same batch after boundary checks

mod batch;
mod item;

pub use batch::{read_envelopes, BatchEnvelope, ValidatedBatch};
pub use item::{ItemRecord, RegionRecord, ValidItem, ValidRegion};
