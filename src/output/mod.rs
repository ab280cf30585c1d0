//! Output module for statistics and reports
//!
//! This module handles:
//! - Loading and printing store statistics
//! - Rendering the comparison as a markdown report
//! - Serializing the comparison payload as JSON

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{format_statistics, load_statistics, print_statistics, QuoteStatistics};

use crate::compare::ComparisonResponse;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Serializes a comparison response as JSON
///
/// # Arguments
///
/// * `response` - The response to serialize
/// * `pretty` - Indent the output
pub fn render_response(response: &ComparisonResponse, pretty: bool) -> OutputResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    Ok(json)
}
