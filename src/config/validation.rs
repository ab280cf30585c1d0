use crate::config::types::{ComparisonConfig, Config, IngestConfig, StorageConfig};
use crate::ConfigError;
use chrono_tz::Tz;

const MAX_BUSY_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const MAX_INGEST_ATTEMPTS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_comparison_config(&config.comparison)?;
    validate_ingest_config(&config.ingest)?;

    if config.output.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Parses an IANA zone name such as `America/Fortaleza`
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(name.to_string()))
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.busy_timeout_ms < 1 || config.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(ConfigError::Validation(format!(
            "busy_timeout_ms must be between 1 and {}, got {}",
            MAX_BUSY_TIMEOUT_MS, config.busy_timeout_ms
        )));
    }

    Ok(())
}

fn validate_comparison_config(config: &ComparisonConfig) -> Result<(), ConfigError> {
    parse_timezone(&config.timezone)?;

    if config.currency_symbol.chars().any(char::is_control) {
        return Err(ConfigError::Validation(format!(
            "currency_symbol contains control characters: {:?}",
            config.currency_symbol
        )));
    }

    Ok(())
}

fn validate_ingest_config(config: &IngestConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > MAX_INGEST_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and {}, got {}",
            MAX_INGEST_ATTEMPTS, config.max_attempts
        )));
    }

    Ok(())
}
