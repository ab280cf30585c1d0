use serde::Deserialize;

/// Main configuration structure for Supplier-Quotes
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Embedded database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// How long the driver waits on a locked database before failing (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Comparison rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ComparisonConfig {
    /// IANA name of the zone every rendered date is converted to
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Prefix placed before every formatted amount
    #[serde(rename = "currency-symbol", default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Fold dotted variation codes under their parent code
    #[serde(rename = "group-variants", default)]
    pub group_variants: bool,
}

/// Ingestion retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Total attempts per batch when the store reports contention
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts (milliseconds), multiplied by the attempt number
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the markdown comparison report
    #[serde(rename = "report-path", default = "default_report_path")]
    pub report_path: String,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            currency_symbol: default_currency_symbol(),
            group_variants: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    30_000
}

fn default_timezone() -> String {
    "America/Fortaleza".to_string()
}

fn default_currency_symbol() -> String {
    "R$".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_report_path() -> String {
    "./comparison.md".to_string()
}
