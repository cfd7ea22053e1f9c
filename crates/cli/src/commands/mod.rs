//! CLI command implementations.

pub mod migrate;
pub mod org;
pub mod tokens;

use autohaul_server::config::{ConfigError, ServerConfig};
use autohaul_server::db;
use autohaul_server::services::auth::AuthService;
use sqlx::PgPool;

/// Connection and settings shared by every command.
pub struct Context {
    pub config: ServerConfig,
    pub pool: PgPool,
}

/// Errors raised before a command starts.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Context {
    /// Load configuration from the environment and connect.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError` if `DATABASE_URL` is missing or unreachable.
    pub async fn connect() -> Result<Self, ConnectError> {
        let config = ServerConfig::from_env()?;

        tracing::info!("Connecting to database...");
        // One-shot commands need no more than a couple of connections
        let pool = db::create_pool(&config.database_url, 2).await?;

        Ok(Self { config, pool })
    }

    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            &self.pool,
            self.config.auth_token_ttl,
            self.config.db_query_timeout,
        )
    }
}
