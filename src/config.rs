//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where events, snapshots and read models live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Tuning knobs of the command and projection pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// A snapshot is written whenever an append crosses a multiple of this
    pub snapshot_interval: i64,

    /// Attempts per command before a concurrency conflict is surfaced
    pub max_retries: u32,

    /// Base delay between attempts; grows linearly with the attempt number
    pub retry_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            snapshot_interval: 100,
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,

    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    pub engine: EngineSettings,

    /// Interval of the background projection catch-up
    pub projection_interval: Duration,

    /// Environment (development, production)
    pub environment: String,

    /// Emit JSON log lines
    pub log_json: bool,

    /// GEDCOM file imported at startup
    pub gedcom_import_path: Option<PathBuf>,

    /// Destination of a GEDCOM export at startup
    pub gedcom_export_path: Option<PathBuf>,
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "postgres" | "postgresql" => StorageBackend::Postgres,
            _ => return Err(ConfigError::InvalidValue("STORAGE_BACKEND")),
        };

        let database_url = optional_var("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", "10")?;

        let snapshot_interval: i64 = parse_var("SNAPSHOT_INTERVAL", "100")?;
        if snapshot_interval < 1 {
            return Err(ConfigError::InvalidValue("SNAPSHOT_INTERVAL"));
        }

        let max_retries: u32 = parse_var("COMMAND_MAX_RETRIES", "3")?;
        if max_retries < 1 {
            return Err(ConfigError::InvalidValue("COMMAND_MAX_RETRIES"));
        }

        let projection_secs: u64 = parse_var("PROJECTION_INTERVAL_SECS", "5")?;
        if projection_secs == 0 {
            return Err(ConfigError::InvalidValue("PROJECTION_INTERVAL_SECS"));
        }

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_json = optional_var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            storage_backend,
            database_url,
            database_max_connections,
            engine: EngineSettings {
                snapshot_interval,
                max_retries,
                ..EngineSettings::default()
            },
            projection_interval: Duration::from_secs(projection_secs),
            environment,
            log_json,
            gedcom_import_path: optional_var("GEDCOM_IMPORT_PATH").map(PathBuf::from),
            gedcom_export_path: optional_var("GEDCOM_EXPORT_PATH").map(PathBuf::from),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.snapshot_interval, 100);
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::MissingEnv("DATABASE_URL").to_string(),
            "Missing environment variable: DATABASE_URL"
        );
    }
}
