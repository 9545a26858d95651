//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::SourcingMode;
use thiserror::Error;

/// A configuration variable that is set but cannot be used.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; when unset the in-memory backend is used
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `DB_LOCK_TIMEOUT_MS`: how long a row lock may be waited for (default: `5000`)
/// - `SOURCING_MODE`: `declared` or `auto_split` (default: `declared`)
/// - `IMAGE_URL_TTL_SECS`: lifetime of presigned image URLs (default: `900`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_lock_timeout: Duration,
    pub sourcing_mode: SourcingMode,
    pub image_url_ttl: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&lookup, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            db_lock_timeout: parse(&lookup, "DB_LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.db_lock_timeout),
            sourcing_mode: parse(&lookup, "SOURCING_MODE")?.unwrap_or(defaults.sourcing_mode),
            image_url_ttl: parse(&lookup, "IMAGE_URL_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.image_url_ttl),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_max_connections: 10,
            db_lock_timeout: Duration::from_millis(5000),
            sourcing_mode: SourcingMode::Declared,
            image_url_ttl: Duration::from_secs(900),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.sourcing_mode, SourcingMode::Declared);
        assert_eq!(config.db_lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/app"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_LOCK_TIMEOUT_MS", "250"),
            ("SOURCING_MODE", "auto_split"),
            ("IMAGE_URL_TTL_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.db_lock_timeout, Duration::from_millis(250));
        assert_eq!(config.sourcing_mode, SourcingMode::AutoSplit);
        assert_eq!(config.image_url_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_database_url_means_in_memory() {
        let config = load(&[("DATABASE_URL", "")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = load(&[("SOURCING_MODE", "greedy")]).unwrap_err();
        assert_eq!(err.var, "SOURCING_MODE");
        assert_eq!(err.value, "greedy");

        let err = load(&[("PORT", "http")]).unwrap_err();
        assert_eq!(err.var, "PORT");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
