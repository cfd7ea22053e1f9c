//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8080)
//! - `BASE_URL` - Public URL (default: <http://localhost:8080>); `https://` enables secure cookies
//! - `DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `DB_QUERY_TIMEOUT_MS` - Deadline for each data operation (default: 5000)
//! - `AUTH_TOKEN_TTL_HOURS` - Lifetime of login tokens (default: 24)
//! - `SHUTDOWN_TIMEOUT_SECS` - Grace period for in-flight requests (default: 30)
//! - `RUN_MIGRATIONS` - Apply embedded migrations at startup (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub db_max_connections: u32,
    pub db_query_timeout: Duration,
    pub auth_token_ttl: TimeDelta,
    pub shutdown_timeout: Duration,
    pub run_migrations: bool,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_query_timeout", &self.db_query_timeout)
            .field("auth_token_ttl", &self.auth_token_ttl)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("run_migrations", &self.run_migrations)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = SecretString::from(env.required("DATABASE_URL")?);
        let host = env.parsed("HOST", "0.0.0.0")?;
        let port = env.parsed("PORT", "8080")?;
        let base_url = env.or_default("BASE_URL", "http://localhost:8080");

        let db_max_connections: u32 = env.parsed("DB_MAX_CONNECTIONS", "10")?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let timeout_ms: u64 = env.parsed("DB_QUERY_TIMEOUT_MS", "5000")?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "DB_QUERY_TIMEOUT_MS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let ttl_hours: i64 = env.parsed("AUTH_TOKEN_TTL_HOURS", "24")?;
        let auth_token_ttl = TimeDelta::try_hours(ttl_hours)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "AUTH_TOKEN_TTL_HOURS".to_string(),
                    "must be a positive number of hours".to_string(),
                )
            })?;

        let shutdown_secs: u64 = env.parsed("SHUTDOWN_TIMEOUT_SECS", "30")?;
        let run_migrations = env.parsed("RUN_MIGRATIONS", "true")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            db_max_connections,
            db_query_timeout: Duration::from_millis(timeout_ms),
            auth_token_ttl,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
            run_migrations,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get a required environment variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional environment variable. Empty counts as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get an environment variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse an environment variable, falling back to `default`.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/autohaul")]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.db_query_timeout, Duration::from_millis(5000));
        assert_eq!(config.auth_token_ttl, TimeDelta::hours(24));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.run_migrations);
        assert!(!config.is_secure());
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "DATABASE_URL"));

        let err = load(&[("DATABASE_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/autohaul"),
            ("HOST", "127.0.0.1"),
            ("PORT", "3000"),
            ("BASE_URL", "https://api.autohaul.test"),
            ("DB_QUERY_TIMEOUT_MS", "250"),
            ("RUN_MIGRATIONS", "false"),
            ("SENTRY_ENVIRONMENT", "staging"),
        ])
        .unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.db_query_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);
        assert!(config.is_secure());
        assert_eq!(config.sentry_environment.as_deref(), Some("staging"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("PORT", "eighty"),
            ("HOST", "localhost:80"),
            ("DB_MAX_CONNECTIONS", "0"),
            ("DB_QUERY_TIMEOUT_MS", "0"),
            ("AUTH_TOKEN_TTL_HOURS", "-1"),
            ("RUN_MIGRATIONS", "maybe"),
        ] {
            let err = load(&[("DATABASE_URL", "postgres://db/autohaul"), (key, value)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == key),
                "{key}={value}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("DATABASE_URL", "postgres://user:hunter2@db/autohaul"),
            ("SENTRY_DSN", "https://key@sentry.test/1"),
        ])
        .unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("key@sentry"));
    }
}
