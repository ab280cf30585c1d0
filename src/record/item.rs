//! Per-item records as delivered by scrapers, and their validated form

use crate::ValidationError;
use rust_decimal::Decimal;
use serde::Deserialize;

/// One scraped product offer from a single supplier
///
/// Every field except the product code may be missing: a "not found"
/// placeholder typically only carries the code and a status text. Amounts
/// accept JSON numbers or numeric strings; available quantities may be
/// fractional (`1.0`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub product_code: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub unit_price: Option<Decimal>,
    pub formatted_price: Option<String>,
    pub qty_requested: Option<u32>,
    pub qty_available: Option<f64>,
    pub total_value: Option<Decimal>,
    pub purchasable: Option<bool>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub regions: Option<Vec<RegionRecord>>,
}

/// Region-scoped price and stock for an item
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRecord {
    pub region_code: Option<String>,
    pub price: Option<Decimal>,
    pub formatted_price: Option<String>,
    pub qty_requested: Option<u32>,
    pub qty_available: Option<f64>,
    pub total_value: Option<Decimal>,
    pub purchasable: Option<bool>,
    pub message: Option<String>,
    pub available: Option<bool>,
}

/// An item that passed boundary validation and will be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ValidItem {
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
    pub regions: Vec<ValidRegion>,
}

/// A regional sub-record ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegion {
    pub region_code: String,
    pub price: Option<Decimal>,
    pub qty_available: f64,
    pub purchasable: bool,
}

impl ItemRecord {
    /// Creates a minimal priced record, mostly useful in tests and fixtures
    pub fn priced(code: &str, unit_price: Decimal) -> Self {
        Self {
            product_code: Some(code.to_string()),
            unit_price: Some(unit_price),
            qty_requested: Some(1),
            qty_available: Some(1.0),
            purchasable: Some(true),
            ..Self::default()
        }
    }

    /// Returns the trimmed product code, or `None` when the record has no usable code
    pub fn usable_code(&self) -> Option<&str> {
        self.product_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// Validates this record into its persisted form
    ///
    /// Returns `Ok(None)` for records without a usable code; they are skipped,
    /// not rejected.
    pub fn validate(&self) -> Result<Option<ValidItem>, ValidationError> {
        let Some(code) = self.usable_code() else {
            return Ok(None);
        };

        check_amount(code, "unit price", self.unit_price)?;
        check_amount(code, "total value", self.total_value)?;
        check_quantity(code, "available quantity", self.qty_available)?;

        let qty_requested = self.qty_requested.unwrap_or(0);
        let total_value = self
            .total_value
            .or_else(|| self.unit_price.map(|price| price * Decimal::from(qty_requested)));

        let mut regions = Vec::new();
        for region in self.regions.iter().flatten() {
            if let Some(valid) = region.validate(code)? {
                regions.push(valid);
            }
        }

        Ok(Some(ValidItem {
            product_code: code.to_string(),
            name: non_blank(&self.name),
            brand: non_blank(&self.brand),
            image_url: non_blank(&self.image),
            unit_price: self.unit_price,
            qty_requested,
            qty_available: self.qty_available.unwrap_or(0.0),
            total_value,
            purchasable: self.purchasable.unwrap_or(false),
            status_text: non_blank(&self.status),
            message: non_blank(&self.message),
            regions,
        }))
    }
}

impl RegionRecord {
    /// Validates a region of item `code`; regions without a region code are dropped
    fn validate(&self, code: &str) -> Result<Option<ValidRegion>, ValidationError> {
        let Some(region_code) = self
            .region_code
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        else {
            tracing::warn!("Dropping region without a region code for item {}", code);
            return Ok(None);
        };

        check_amount(code, "regional price", self.price)?;
        check_quantity(code, "regional available quantity", self.qty_available)?;

        Ok(Some(ValidRegion {
            region_code: region_code.to_string(),
            price: self.price,
            qty_available: self.qty_available.unwrap_or(0.0),
            purchasable: self.purchasable.or(self.available).unwrap_or(false),
        }))
    }
}

fn check_amount(code: &str, field: &'static str, value: Option<Decimal>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(ValidationError::Negative {
            code: code.to_string(),
            field,
        }),
        _ => Ok(()),
    }
}

fn check_quantity(code: &str, field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(ValidationError::NotFinite {
            code: code.to_string(),
            field,
        }),
        Some(v) if v < 0.0 => Err(ValidationError::Negative {
            code: code.to_string(),
            field,
        }),
        _ => Ok(()),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
