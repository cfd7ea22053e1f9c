//! Embedded, versioned schema migrations.
//!
//! Scripts live in `crates/server/migrations/` as
//! `NNNNNN_description.up.sql` / `NNNNNN_description.down.sql` pairs and are
//! compiled into the binary, so a deployed server provisions and upgrades its
//! own schema on startup with no external tooling.
//!
//! # State
//!
//! Progress is tracked in a single-row `schema_migrations` table holding
//! `(version, dirty)`. Each script runs in its own transaction. Before a
//! script starts, the target version is recorded with `dirty = true` outside
//! that transaction; the flag is cleared in the same transaction as the
//! script. A failed script therefore leaves the database dirty, and every
//! later `apply` refuses to run until an operator repairs the schema and calls
//! [`Migrator::force`].
//!
//! # Concurrency
//!
//! All runners serialize on a Postgres advisory lock keyed by the current
//! schema. A fleet of identical binaries starting together converges: the
//! first applies the pending scripts, the rest find nothing pending.
//!
//! The migration runs on a connection detached from the pool, so a cancelled
//! run closes the socket and releases the session lock instead of returning a
//! locked connection to the pool.

use sqlx::{Connection, PgConnection, PgPool};
use thiserror::Error;

/// First half of the advisory lock key. The second half is
/// `hashtext(current_schema())`.
const LOCK_NAMESPACE: i32 = 0x6175_746f; // "auto"

/// Errors raised by the migration runner.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A previous run failed mid-script; the schema shape is unknown.
    #[error(
        "database is dirty at migration version {version}; repair the schema and force a version"
    )]
    Dirty { version: i64 },

    /// Rollback was requested at version 0.
    #[error("no applied migration to roll back")]
    NothingToRollback,

    /// The database references a version this binary does not embed.
    #[error("migration version {0} is not embedded in this binary")]
    UnknownVersion(i64),

    /// The migration set itself is malformed (bad file name, ordering).
    #[error("invalid migration set: {0}")]
    InvalidSet(String),

    /// A script failed. The database is left dirty at `version`.
    #[error("migration {version} ({name}) failed: {source}")]
    Script {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Any other database failure (connection, lock, bookkeeping).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One forward/backward script pair.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// File stem shared by both scripts, e.g. `000002_create_customers_and_carriers`.
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

impl Migration {
    /// Version parsed from the leading digits of the file stem.
    #[must_use]
    pub fn version(&self) -> Option<i64> {
        let (digits, rest) = self.name.split_once('_')?;
        if digits.is_empty() || rest.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Human-readable description from the file stem.
    #[must_use]
    pub fn description(&self) -> String {
        self.name
            .split_once('_')
            .map_or(self.name, |(_, rest)| rest)
            .replace('_', " ")
    }
}

macro_rules! embedded_migration {
    ($stem:literal) => {
        Migration {
            name: $stem,
            up: include_str!(concat!("../../migrations/", $stem, ".up.sql")),
            down: include_str!(concat!("../../migrations/", $stem, ".down.sql")),
        }
    };
}

/// Scripts compiled into this binary, in version order.
pub static EMBEDDED: &[Migration] = &[
    embedded_migration!("000001_create_organizations_and_users"),
    embedded_migration!("000002_create_customers_and_carriers"),
    embedded_migration!("000003_create_shipments_and_vehicles"),
];

#[derive(Debug, Clone, Copy)]
struct Versioned {
    version: i64,
    migration: Migration,
}

/// Applies an ordered set of migrations to a database.
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Versioned>,
}

impl Migrator {
    /// Runner over the scripts embedded in this binary.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidSet` if an embedded file name is malformed.
    pub fn embedded() -> Result<Self, MigrationError> {
        Self::new(EMBEDDED.to_vec())
    }

    /// Runner over an arbitrary migration set.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidSet` if a name carries no positive
    /// version or the versions are not strictly ascending.
    pub fn new(migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        let mut resolved: Vec<Versioned> = Vec::with_capacity(migrations.len());
        for migration in migrations {
            let version = migration.version().filter(|v| *v > 0).ok_or_else(|| {
                MigrationError::InvalidSet(format!(
                    "`{}` does not start with a positive version number",
                    migration.name
                ))
            })?;
            if let Some(previous) = resolved.last()
                && previous.version >= version
            {
                return Err(MigrationError::InvalidSet(format!(
                    "`{}` is out of order after `{}`",
                    migration.name, previous.migration.name
                )));
            }
            resolved.push(Versioned { version, migration });
        }
        Ok(Self {
            migrations: resolved,
        })
    }

    /// Highest version known to this runner (0 for an empty set).
    #[must_use]
    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Apply every pending forward script in ascending order.
    ///
    /// Returns the version the database is at afterwards. Running with
    /// nothing pending is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Dirty` without touching the schema if a
    /// previous run failed, `MigrationError::Script` if a script fails (the
    /// database is then dirty), or `MigrationError::Database` for
    /// connection and bookkeeping failures.
    pub async fn apply(&self, pool: &PgPool) -> Result<i64, MigrationError> {
        let mut conn = pool.acquire().await?.detach();
        lock(&mut conn).await?;
        let result = self.apply_locked(&mut conn).await;
        release(conn).await;
        result
    }

    /// Run the down script of the current version and step back to the
    /// previous embedded version (or 0).
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::NothingToRollback` at version 0,
    /// `MigrationError::Dirty` if the database is dirty,
    /// `MigrationError::UnknownVersion` if the current version is not
    /// embedded, or `MigrationError::Script` if the down script fails.
    pub async fn rollback_one(&self, pool: &PgPool) -> Result<i64, MigrationError> {
        let mut conn = pool.acquire().await?.detach();
        lock(&mut conn).await?;
        let result = self.rollback_locked(&mut conn).await;
        release(conn).await;
        result
    }

    /// Record `version` as applied and clear the dirty flag without running
    /// any script. Used to recover after repairing a dirty database by hand.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::UnknownVersion` if `version` is neither 0
    /// nor embedded.
    pub async fn force(&self, pool: &PgPool, version: i64) -> Result<(), MigrationError> {
        if version != 0 && !self.migrations.iter().any(|m| m.version == version) {
            return Err(MigrationError::UnknownVersion(version));
        }
        let mut conn = pool.acquire().await?.detach();
        lock(&mut conn).await?;
        let result = async {
            ensure_table(&mut conn).await?;
            write_state(&mut conn, version, false).await?;
            tracing::warn!(version, "forced migration version");
            Ok(())
        }
        .await;
        release(conn).await;
        result
    }

    async fn apply_locked(&self, conn: &mut PgConnection) -> Result<i64, MigrationError> {
        ensure_table(conn).await?;
        let (current, dirty) = read_state(conn).await?;
        if dirty {
            tracing::error!(version = current, "refusing to migrate a dirty database");
            return Err(MigrationError::Dirty { version: current });
        }
        if current > self.latest_version() {
            tracing::warn!(
                current,
                latest = self.latest_version(),
                "database schema is newer than this binary"
            );
        }

        let mut version = current;
        for m in self.migrations.iter().filter(|m| m.version > current) {
            tracing::info!(
                version = m.version,
                description = %m.migration.description(),
                "applying migration"
            );
            run_script(conn, m, m.migration.up, m.version).await?;
            version = m.version;
        }

        if version == current {
            tracing::debug!(version, "schema is up to date");
        } else {
            tracing::info!(from = current, to = version, "migrations applied");
        }
        Ok(version)
    }

    async fn rollback_locked(&self, conn: &mut PgConnection) -> Result<i64, MigrationError> {
        ensure_table(conn).await?;
        let (current, dirty) = read_state(conn).await?;
        if dirty {
            return Err(MigrationError::Dirty { version: current });
        }
        if current == 0 {
            return Err(MigrationError::NothingToRollback);
        }
        let position = self
            .migrations
            .iter()
            .position(|m| m.version == current)
            .ok_or(MigrationError::UnknownVersion(current))?;
        let target = match position.checked_sub(1) {
            Some(previous) => self.migrations.get(previous).map_or(0, |m| m.version),
            None => 0,
        };
        let Some(m) = self.migrations.get(position) else {
            return Err(MigrationError::UnknownVersion(current));
        };

        tracing::info!(
            version = m.version,
            description = %m.migration.description(),
            target,
            "rolling back migration"
        );
        run_script(conn, m, m.migration.down, target).await?;
        Ok(target)
    }
}

/// Current `(version, dirty)` of the database. `(0, false)` when nothing has
/// ever been applied.
///
/// # Errors
///
/// Returns `MigrationError::Database` if the state cannot be read.
pub async fn current_version(pool: &PgPool) -> Result<(i64, bool), MigrationError> {
    let mut conn = pool.acquire().await?;
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('schema_migrations') IS NOT NULL")
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Ok((0, false));
    }
    read_state(&mut conn).await
}

/// Mark `script_version` dirty, then run `script` and record `final_version`
/// clean in one transaction.
async fn run_script(
    conn: &mut PgConnection,
    m: &Versioned,
    script: &'static str,
    final_version: i64,
) -> Result<(), MigrationError> {
    write_state(conn, m.version, true).await?;

    let mut tx = conn.begin().await?;
    if let Err(source) = sqlx::raw_sql(script).execute(&mut *tx).await {
        tracing::error!(
            version = m.version,
            name = m.migration.name,
            error = %source,
            "migration script failed; database left dirty"
        );
        // Dropping `tx` rolls the script back; the dirty marker stays.
        return Err(MigrationError::Script {
            version: m.version,
            name: m.migration.name,
            source,
        });
    }
    write_state(&mut tx, final_version, false).await?;
    tx.commit().await?;
    Ok(())
}

async fn lock(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_lock($1, hashtext(current_schema()))")
        .bind(LOCK_NAMESPACE)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Unlock and close. Closing alone would release the lock; unlocking first
/// keeps the server log clean of aborted-session noise.
async fn release(mut conn: PgConnection) {
    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1, hashtext(current_schema()))")
        .bind(LOCK_NAMESPACE)
        .execute(&mut conn)
        .await
    {
        tracing::warn!(error = %e, "failed to release migration lock");
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close migration connection");
    }
}

async fn ensure_table(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            id       BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
            version  BIGINT NOT NULL,
            dirty    BOOLEAN NOT NULL
        )
        ",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn read_state(conn: &mut PgConnection) -> Result<(i64, bool), MigrationError> {
    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT version, dirty FROM schema_migrations WHERE id")
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.unwrap_or((0, false)))
}

async fn write_state(conn: &mut PgConnection, version: i64, dirty: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO schema_migrations (id, version, dirty)
        VALUES (TRUE, $1, $2)
        ON CONFLICT (id) DO UPDATE SET version = EXCLUDED.version, dirty = EXCLUDED.dirty
        ",
    )
    .bind(version)
    .bind(dirty)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
