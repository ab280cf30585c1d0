//! Statistics generation from the quote store
//!
//! This module provides functionality for extracting and displaying
//! store statistics from the storage layer.

use crate::compare::format_datetime;
use crate::storage::{QuoteStore, StoreStatistics, SupplierSummary};
use crate::QuoteError;
use chrono_tz::Tz;

/// Store statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteStatistics {
    /// Row counts and the processing marker
    pub totals: StoreStatistics,

    /// Lots and live items per supplier, ordered by supplier name
    pub suppliers: Vec<SupplierSummary>,
}

impl QuoteStatistics {
    /// Share of live items that carry a positive price, in percent
    pub fn priced_ratio(&self) -> f64 {
        if self.totals.items > 0 {
            (self.totals.priced_items as f64 / self.totals.items as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(QuoteStatistics)` - Successfully loaded statistics
/// * `Err(QuoteError)` - Failed to query statistics
pub fn load_statistics(store: &dyn QuoteStore) -> Result<QuoteStatistics, QuoteError> {
    let totals = store.count_statistics()?;
    let suppliers = store.supplier_summaries()?;

    Ok(QuoteStatistics { totals, suppliers })
}

/// Renders statistics as plain text, dates in `tz`
pub fn format_statistics(stats: &QuoteStatistics, tz: &Tz) -> String {
    let mut out = String::new();

    out.push_str("=== Quote Store Statistics ===\n\n");

    out.push_str("Overview:\n");
    out.push_str(&format!("  Lots ingested: {}\n", stats.totals.lots));
    out.push_str(&format!("  Live items: {}\n", stats.totals.items));
    out.push_str(&format!(
        "  Priced items: {} ({:.1}%)\n",
        stats.totals.priced_items,
        stats.priced_ratio()
    ));
    out.push_str(&format!("  Distinct products: {}\n", stats.totals.distinct_products));
    out.push_str(&format!("  Regional details: {}\n", stats.totals.regional_details));
    out.push_str(&format!("  Suppliers: {}\n", stats.totals.suppliers));
    out.push_str(&format!(
        "  Last processed: {}\n\n",
        stats
            .totals
            .last_processed
            .map(|ts| format_datetime(&ts, tz))
            .unwrap_or_else(|| "never".to_string())
    ));

    if !stats.suppliers.is_empty() {
        out.push_str("Suppliers:\n");
        for summary in &stats.suppliers {
            let last_lot = summary
                .last_lot_at
                .map(|ts| format_datetime(&ts, tz))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "  {}: {} items, {} lots, last lot {}\n",
                summary.supplier, summary.live_items, summary.lots, last_lot
            ));
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
/// * `tz` - Zone the dates are shown in
pub fn print_statistics(stats: &QuoteStatistics, tz: &Tz) {
    print!("{}", format_statistics(stats, tz));
}
