//! Comparison result types and the outbound payload

use crate::compare::variants::{group_variants, ProductFamily};
use crate::QuoteError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One region-scoped price of an offer
///
/// Amounts are serialized as JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOffer {
    pub region_code: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub price_formatted: Option<String>,
    pub available_qty: f64,
    pub purchasable: bool,
}

/// One supplier's offer for a product
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub supplier: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub price_formatted: String,
    pub available_qty: f64,
    pub last_updated_date: String,
    pub last_updated_iso: String,
    pub regions: Vec<RegionOffer>,
}

/// All offers for one product code, best first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductComparison {
    pub product_code: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub brand: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub best_price: Decimal,
    pub best_price_formatted: String,
    pub winning_supplier: String,
    pub offers: Vec<Offer>,
}

/// Result of [`compare_all`](crate::compare::compare_all)
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    /// Ordered by product code
    pub products: Vec<ProductComparison>,
    pub last_processed: Option<DateTime<Utc>>,
    /// Empty when nothing was marked processed yet
    pub last_processed_time: String,
    pub last_processed_time_iso: String,
}

impl ComparisonReport {
    /// Folds the products into parent/variation families
    pub fn families(&self) -> Vec<ProductFamily> {
        group_variants(&self.products)
    }

    /// Total number of offers across all products
    pub fn offer_count(&self) -> usize {
        self.products.iter().map(|p| p.offers.len()).sum()
    }
}

/// The comparison entries, flat or grouped by parent code
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ComparisonEntries {
    Products(Vec<ProductComparison>),
    Families(Vec<ProductFamily>),
}

impl ComparisonEntries {
    pub fn len(&self) -> usize {
        match self {
            Self::Products(products) => products.len(),
            Self::Families(families) => families.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Successful comparison payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPayload {
    pub success: bool,
    pub total_products_analyzed: usize,
    pub last_processed_time: String,
    pub last_processed_time_iso: String,
    pub comparison: ComparisonEntries,
}

/// Failed comparison payload
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonFailure {
    pub success: bool,
    pub error: String,
}

/// What comparison callers receive: the full payload, or an error object,
/// never a partial result
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ComparisonResponse {
    Success(ComparisonPayload),
    Failure(ComparisonFailure),
}

impl ComparisonResponse {
    /// Builds the payload from a report, grouping variants when asked
    pub fn from_report(report: ComparisonReport, group_variants: bool) -> Self {
        let comparison = if group_variants {
            ComparisonEntries::Families(report.families())
        } else {
            ComparisonEntries::Products(report.products)
        };

        Self::Success(ComparisonPayload {
            success: true,
            total_products_analyzed: comparison.len(),
            last_processed_time: report.last_processed_time,
            last_processed_time_iso: report.last_processed_time_iso,
            comparison,
        })
    }

    /// Converts a comparison result into a response
    pub fn from_result(result: Result<ComparisonReport, QuoteError>, group_variants: bool) -> Self {
        match result {
            Ok(report) => Self::from_report(report, group_variants),
            Err(e) => {
                tracing::error!("Comparison failed: {}", e);
                Self::Failure(ComparisonFailure {
                    success: false,
                    error: e.to_string(),
                })
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
