//! Parent/variation grouping of product codes
//!
//! Suppliers list variations of a product under dotted codes: `14354.3` is a
//! variation of parent `14354`. A family collects the parent entry (when the
//! parent itself is offered) and all of its variations.

use crate::compare::report::ProductComparison;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// A parent code with its variations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFamily {
    pub product_code: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub brand: Option<String>,
    /// True when the parent code itself is offered
    pub has_parent: bool,
    /// The head entry: the parent, or a promoted lone variation
    pub parent: Option<ProductComparison>,
    /// Ordered by best price
    pub variations: Vec<ProductComparison>,
    #[serde(with = "rust_decimal::serde::float")]
    pub best_price: Decimal,
    pub best_price_formatted: String,
    pub winning_supplier: String,
}

/// Returns the part of `code` before the first dot
pub fn parent_code(code: &str) -> &str {
    code.split_once('.').map_or(code, |(parent, _)| parent)
}

/// Groups products into families keyed by parent code
///
/// A family without a parent entry and a single variation promotes that
/// variation to be its head. Families come back ordered by their code.
pub fn group_variants(products: &[ProductComparison]) -> Vec<ProductFamily> {
    let mut buckets: BTreeMap<&str, (Option<&ProductComparison>, Vec<&ProductComparison>)> =
        BTreeMap::new();

    for product in products {
        let parent = parent_code(&product.product_code);
        let bucket = buckets.entry(parent).or_default();
        if parent == product.product_code {
            bucket.0 = Some(product);
        } else {
            bucket.1.push(product);
        }
    }

    let mut families: Vec<ProductFamily> = buckets
        .into_iter()
        .filter_map(|(code, (parent, variations))| build_family(code, parent, variations))
        .collect();

    families.sort_by(|a, b| a.product_code.cmp(&b.product_code));
    families
}

fn build_family<'a>(
    code: &'a str,
    parent: Option<&'a ProductComparison>,
    variations: Vec<&'a ProductComparison>,
) -> Option<ProductFamily> {
    let has_parent = parent.is_some();

    let (code, head, mut variations) = if parent.is_none() && variations.len() == 1 {
        let lone = variations[0];
        (lone.product_code.as_str(), Some(lone), Vec::new())
    } else {
        (code, parent, variations)
    };

    let members: Vec<&ProductComparison> =
        head.into_iter().chain(variations.iter().copied()).collect();
    let best = members
        .iter()
        .copied()
        .filter(|p| p.best_price > Decimal::ZERO)
        .min_by_key(|p| p.best_price)?;

    let family = ProductFamily {
        product_code: code.to_string(),
        name: members.iter().find_map(|p| p.name.clone()),
        image: members.iter().find_map(|p| p.image.clone()),
        brand: members.iter().find_map(|p| p.brand.clone()),
        has_parent,
        parent: head.cloned(),
        variations: Vec::new(),
        best_price: best.best_price,
        best_price_formatted: best.best_price_formatted.clone(),
        winning_supplier: best.winning_supplier.clone(),
    };

    variations.sort_by_key(|p| p.best_price);

    Some(ProductFamily {
        variations: variations.into_iter().cloned().collect(),
        ..family
    })
}
