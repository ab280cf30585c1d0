//! Markdown comparison report
//!
//! This module renders a comparison as a human-readable markdown document,
//! one table per product with offers cheapest first.

use crate::compare::{ComparisonReport, ProductComparison};
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report for a comparison
///
/// # Arguments
///
/// * `report` - The comparison to render
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(report: &ComparisonReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a comparison as markdown
pub fn format_markdown_report(report: &ComparisonReport) -> String {
    let mut md = String::new();

    md.push_str("# Supplier Price Comparison\n\n");

    md.push_str(&format!("- **Products compared**: {}\n", report.products.len()));
    md.push_str(&format!("- **Offers**: {}\n", report.offer_count()));
    if report.last_processed_time.is_empty() {
        md.push_str("- **Last processed**: never\n\n");
    } else {
        md.push_str(&format!(
            "- **Last processed**: {}\n\n",
            report.last_processed_time
        ));
    }

    if report.products.is_empty() {
        md.push_str("No priced offers found.\n");
        return md;
    }

    for product in &report.products {
        push_product(&mut md, product);
    }

    md
}

fn push_product(md: &mut String, product: &ProductComparison) {
    match &product.name {
        Some(name) => md.push_str(&format!(
            "## {} - {}\n\n",
            product.product_code,
            escape_cell(name)
        )),
        None => md.push_str(&format!("## {}\n\n", product.product_code)),
    }

    if let Some(brand) = &product.brand {
        md.push_str(&format!("- **Brand**: {}\n", escape_cell(brand)));
    }
    md.push_str(&format!(
        "- **Best price**: {} ({})\n\n",
        product.best_price_formatted, product.winning_supplier
    ));

    md.push_str("| Supplier | Price | Available | Updated | Regions |\n");
    md.push_str("|----------|-------|-----------|---------|---------|\n");

    for offer in &product.offers {
        let regions = offer
            .regions
            .iter()
            .map(|r| match &r.price_formatted {
                Some(price) => format!("{} {}", r.region_code, price),
                None => r.region_code.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            escape_cell(&offer.supplier),
            offer.price_formatted,
            offer.available_qty,
            offer.last_updated_date,
            if regions.is_empty() { "-".to_string() } else { regions }
        ));
    }
    md.push('\n');
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
