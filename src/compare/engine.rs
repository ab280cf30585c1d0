//! Best-offer comparison across suppliers
//!
//! The engine only reads: it takes one snapshot from the store, groups the
//! priced items by product code, keeps one offer per supplier and orders the
//! offers cheapest first.

use crate::compare::format::{format_datetime, format_iso, format_money};
use crate::compare::report::{ComparisonReport, Offer, ProductComparison, RegionOffer};
use crate::config::{parse_timezone, ComparisonConfig};
use crate::storage::{OfferRow, OfferSnapshot, QuoteStore};
use crate::{ConfigResult, Result};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

/// Reference zone used when no configuration is given
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Fortaleza;

/// Rendering options for a comparison
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSettings {
    pub timezone: Tz,
    pub currency_symbol: String,
    pub group_variants: bool,
}

impl ComparisonSettings {
    /// Builds settings from the `[comparison]` config section
    pub fn from_config(config: &ComparisonConfig) -> ConfigResult<Self> {
        Ok(Self {
            timezone: parse_timezone(&config.timezone)?,
            currency_symbol: config.currency_symbol.clone(),
            group_variants: config.group_variants,
        })
    }
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            currency_symbol: "R$".to_string(),
            group_variants: false,
        }
    }
}

/// Compares every priced product across suppliers
///
/// # Arguments
///
/// * `store` - The store to read from
/// * `settings` - Zone and currency used for the rendered fields
///
/// # Returns
///
/// * `Ok(ComparisonReport)` - Products ordered by code, offers best first
/// * `Err(QuoteError)` - The snapshot could not be read
pub fn compare_all(store: &dyn QuoteStore, settings: &ComparisonSettings) -> Result<ComparisonReport> {
    let snapshot = store.load_offer_snapshot()?;

    let report = build_report(snapshot, settings);
    tracing::debug!(
        "Compared {} products ({} offers)",
        report.products.len(),
        report.offer_count()
    );

    Ok(report)
}

/// Builds a report from an already loaded snapshot
pub fn build_report(snapshot: OfferSnapshot, settings: &ComparisonSettings) -> ComparisonReport {
    let mut by_code: BTreeMap<String, Vec<OfferRow>> = BTreeMap::new();
    for row in snapshot.offers {
        by_code.entry(row.product_code.clone()).or_default().push(row);
    }

    let products = by_code
        .into_iter()
        .filter_map(|(code, rows)| compare_product(code, rows, settings))
        .collect();

    let (last_processed_time, last_processed_time_iso) = match &snapshot.last_processed {
        Some(ts) => (
            format_datetime(ts, &settings.timezone),
            format_iso(ts, &settings.timezone),
        ),
        None => (String::new(), String::new()),
    };

    ComparisonReport {
        products,
        last_processed: snapshot.last_processed,
        last_processed_time,
        last_processed_time_iso,
    }
}

/// Builds the comparison for one product code
///
/// Returns `None` when no supplier offers the product at a positive price.
fn compare_product(
    code: String,
    mut rows: Vec<OfferRow>,
    settings: &ComparisonSettings,
) -> Option<ProductComparison> {
    // Most recent lot first, so the first row per supplier is the live one
    rows.sort_by(|a, b| {
        b.processed_at
            .cmp(&a.processed_at)
            .then_with(|| b.item_id.cmp(&a.item_id))
    });

    let mut seen = HashSet::new();
    rows.retain(|row| row.unit_price > Decimal::ZERO && seen.insert(row.supplier.clone()));

    let latest = rows.first()?;
    let name = latest
        .name
        .clone()
        .or_else(|| rows.iter().find_map(|r| r.name.clone()));
    let image = latest
        .image_url
        .clone()
        .or_else(|| rows.iter().find_map(|r| r.image_url.clone()));
    let brand = latest
        .brand
        .clone()
        .or_else(|| rows.iter().find_map(|r| r.brand.clone()));

    let mut offers: Vec<Offer> = rows.iter().map(|row| build_offer(row, settings)).collect();
    offers.sort_by(|a, b| {
        a.price
            .cmp(&b.price)
            .then_with(|| a.supplier.cmp(&b.supplier))
    });

    let best = offers.first()?;

    Some(ProductComparison {
        product_code: code,
        name,
        image,
        brand,
        best_price: best.price,
        best_price_formatted: best.price_formatted.clone(),
        winning_supplier: best.supplier.clone(),
        offers,
    })
}

fn build_offer(row: &OfferRow, settings: &ComparisonSettings) -> Offer {
    let mut regions: Vec<RegionOffer> = row
        .regions
        .iter()
        .map(|region| RegionOffer {
            region_code: region.region_code.clone(),
            price: region.price,
            price_formatted: region
                .price
                .map(|price| format_money(price, &settings.currency_symbol)),
            available_qty: region.qty_available,
            purchasable: region.purchasable,
        })
        .collect();
    regions.sort_by(|a, b| a.region_code.cmp(&b.region_code));
    regions.dedup_by(|a, b| a.region_code == b.region_code);

    Offer {
        supplier: row.supplier.clone(),
        price: row.unit_price,
        price_formatted: format_money(row.unit_price, &settings.currency_symbol),
        available_qty: row.qty_available,
        last_updated_date: format_datetime(&row.processed_at, &settings.timezone),
        last_updated_iso: format_iso(&row.processed_at, &settings.timezone),
        regions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RegionRow;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 19, hour, 0, 0).unwrap()
    }

    fn offer(item_id: i64, code: &str, supplier: &str, price: Decimal, hour: u32) -> OfferRow {
        OfferRow {
            item_id,
            product_code: code.to_string(),
            name: Some(format!("{} from {}", code, supplier)),
            brand: None,
            image_url: None,
            supplier: supplier.to_string(),
            unit_price: price,
            qty_available: 5.0,
            processed_at: at(hour),
            regions: vec![],
        }
    }

    fn snapshot(offers: Vec<OfferRow>) -> OfferSnapshot {
        OfferSnapshot {
            offers,
            last_processed: None,
        }
    }

    #[test]
    fn test_best_offer_wins() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "roles", dec!(10.0), 10),
                offer(2, "A1", "takao", dec!(8.5), 11),
                offer(3, "A1", "dpk", dec!(12.0), 12),
            ]),
            &ComparisonSettings::default(),
        );

        assert_eq!(report.products.len(), 1);
        let product = &report.products[0];
        assert_eq!(product.best_price, dec!(8.5));
        assert_eq!(product.best_price_formatted, "R$ 8,50");
        assert_eq!(product.winning_supplier, "takao");

        let prices: Vec<_> = product.offers.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![dec!(8.5), dec!(10.0), dec!(12.0)]);
    }

    #[test]
    fn test_single_supplier_is_winner() {
        let report = build_report(
            snapshot(vec![offer(1, "A1", "roles", dec!(10.0), 10)]),
            &ComparisonSettings::default(),
        );

        let product = &report.products[0];
        assert_eq!(product.winning_supplier, "roles");
        assert_eq!(product.offers.len(), 1);
    }

    #[test]
    fn test_price_ties_break_on_supplier_name() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "takao", dec!(9.0), 10),
                offer(2, "A1", "dpk", dec!(9.0), 11),
            ]),
            &ComparisonSettings::default(),
        );

        assert_eq!(report.products[0].winning_supplier, "dpk");
    }

    #[test]
    fn test_unpriced_products_are_excluded() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "roles", dec!(0.0), 10),
                offer(2, "A1", "takao", dec!(0.0), 10),
                offer(3, "B2", "roles", dec!(4.0), 10),
            ]),
            &ComparisonSettings::default(),
        );

        let codes: Vec<_> = report.products.iter().map(|p| p.product_code.as_str()).collect();
        assert_eq!(codes, vec!["B2"]);
    }

    #[test]
    fn test_duplicate_supplier_keeps_most_recent() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "roles", dec!(7.0), 9),
                offer(2, "A1", "roles", dec!(11.0), 12),
            ]),
            &ComparisonSettings::default(),
        );

        let product = &report.products[0];
        assert_eq!(product.offers.len(), 1);
        assert_eq!(product.best_price, dec!(11.0));
    }

    #[test]
    fn test_product_name_comes_from_latest_offer() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "roles", dec!(7.0), 9),
                offer(2, "A1", "takao", dec!(9.0), 15),
            ]),
            &ComparisonSettings::default(),
        );

        assert_eq!(report.products[0].name.as_deref(), Some("A1 from takao"));
    }

    #[test]
    fn test_equal_amounts_with_different_scale_tie() {
        let report = build_report(
            snapshot(vec![
                offer(1, "A1", "takao", dec!(0.30), 10),
                offer(2, "A1", "roles", dec!(0.3), 11),
                offer(3, "A1", "dpk", dec!(0.31), 12),
            ]),
            &ComparisonSettings::default(),
        );

        let product = &report.products[0];
        assert_eq!(product.winning_supplier, "roles");
        let suppliers: Vec<_> = product.offers.iter().map(|o| o.supplier.as_str()).collect();
        assert_eq!(suppliers, vec!["roles", "takao", "dpk"]);
    }

    #[test]
    fn test_products_ordered_by_code() {
        let report = build_report(
            snapshot(vec![
                offer(1, "C3", "roles", dec!(1.0), 9),
                offer(2, "A1", "roles", dec!(1.0), 9),
                offer(3, "B2", "roles", dec!(1.0), 9),
            ]),
            &ComparisonSettings::default(),
        );

        let codes: Vec<_> = report.products.iter().map(|p| p.product_code.as_str()).collect();
        assert_eq!(codes, vec!["A1", "B2", "C3"]);
    }

    #[test]
    fn test_regions_sorted_and_deduplicated() {
        let mut row = offer(1, "A1", "roles", dec!(10.0), 9);
        row.regions = vec![
            RegionRow {
                region_code: "SP".to_string(),
                price: Some(dec!(10.0)),
                qty_available: 2.0,
                purchasable: true,
            },
            RegionRow {
                region_code: "CE".to_string(),
                price: None,
                qty_available: 0.0,
                purchasable: false,
            },
            RegionRow {
                region_code: "SP".to_string(),
                price: Some(dec!(10.5)),
                qty_available: 1.0,
                purchasable: true,
            },
        ];

        let report = build_report(snapshot(vec![row]), &ComparisonSettings::default());
        let regions = &report.products[0].offers[0].regions;

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region_code, "CE");
        assert_eq!(regions[0].price_formatted, None);
        assert_eq!(regions[1].region_code, "SP");
        assert_eq!(regions[1].price_formatted.as_deref(), Some("R$ 10,00"));
    }

    #[test]
    fn test_dates_rendered_in_reference_zone() {
        let mut snap = snapshot(vec![offer(1, "A1", "roles", dec!(10.0), 14)]);
        snap.last_processed = Some(at(15));

        let report = build_report(snap, &ComparisonSettings::default());

        assert_eq!(report.last_processed_time, "19/01/2026 12:00:00");
        assert_eq!(report.last_processed_time_iso, "2026-01-19T12:00:00-03:00");
        assert_eq!(
            report.products[0].offers[0].last_updated_date,
            "19/01/2026 11:00:00"
        );
    }

    #[test]
    fn test_settings_from_config() {
        let settings = ComparisonSettings::from_config(&ComparisonConfig {
            timezone: "America/Sao_Paulo".to_string(),
            currency_symbol: "BRL".to_string(),
            group_variants: true,
        })
        .unwrap();

        assert_eq!(settings.timezone, chrono_tz::America::Sao_Paulo);
        assert_eq!(settings.currency_symbol, "BRL");
        assert!(settings.group_variants);
    }
}
