//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::db::scoped::ScopedStore;
use crate::services::auth::AuthService;
use crate::services::tenant::TenantResolver;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    resolver: TenantResolver,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: ServerConfig, pool: PgPool) -> Self {
        let resolver = TenantResolver::new(pool.clone(), config.db_query_timeout);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                resolver,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the token resolver.
    #[must_use]
    pub fn resolver(&self) -> &TenantResolver {
        &self.inner.resolver
    }

    /// Tenant-scoped data access bounded by the configured query timeout.
    #[must_use]
    pub fn store(&self) -> ScopedStore<'_> {
        ScopedStore::new(&self.inner.pool, self.inner.config.db_query_timeout)
    }

    /// Authentication and user management.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            &self.inner.pool,
            self.inner.config.auth_token_ttl,
            self.inner.config.db_query_timeout,
        )
    }
}
