//! Configuration module for Supplier-Quotes
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use supplier_quotes::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("quotes.toml")).unwrap();
//! println!("Database: {}", config.storage.database_path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ComparisonConfig, Config, IngestConfig, OutputConfig, StorageConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::parse_timezone;
