//! Comparison module for ranking supplier offers
//!
//! This module handles:
//! - Building one best-offer-first entry per product code
//! - Rendering prices as BRL and dates in the reference time zone
//! - Folding variation codes under their parent code
//! - The success/failure payload handed to comparison callers

mod engine;
mod format;
mod report;
mod variants;

pub use engine::{build_report, compare_all, ComparisonSettings, DEFAULT_TIMEZONE};
pub use format::{format_datetime, format_iso, format_money};
pub use report::{
    ComparisonEntries, ComparisonFailure, ComparisonPayload, ComparisonReport, ComparisonResponse,
    Offer, ProductComparison, RegionOffer,
};
pub use variants::{group_variants, parent_code, ProductFamily};
