//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! autohaul migrate up          # apply everything pending
//! autohaul migrate down        # undo the newest applied migration
//! autohaul migrate version     # print version and dirty flag
//! autohaul migrate force 2     # record version 2 and clear dirty
//! ```
//!
//! Scripts live in `crates/server/migrations/` and are embedded in the
//! binary, so the CLI always runs the same set as the server it ships with.
//! A failed script leaves the schema marked dirty; inspect the database,
//! repair it by hand, then `force` the version that is actually in place.

use autohaul_server::db::migrations::{MigrationError, Migrator, current_version};

use super::Context;

/// Apply all pending migrations.
pub async fn up(ctx: &Context) -> Result<(), MigrationError> {
    let migrator = Migrator::embedded()?;
    let version = migrator.apply(&ctx.pool).await?;
    tracing::info!(
        version,
        latest = migrator.latest_version(),
        "Migrations complete"
    );
    Ok(())
}

/// Roll back the most recently applied migration.
pub async fn down(ctx: &Context) -> Result<(), MigrationError> {
    let version = Migrator::embedded()?.rollback_one(&ctx.pool).await?;
    tracing::info!(version, "Rolled back one migration");
    Ok(())
}

/// Print the current schema version.
pub async fn version(ctx: &Context) -> Result<(), MigrationError> {
    let (version, dirty) = current_version(&ctx.pool).await?;
    let latest = Migrator::embedded()?.latest_version();

    #[allow(clippy::print_stdout)]
    {
        println!("version: {version}");
        println!("latest:  {latest}");
        println!("dirty:   {dirty}");
    }

    if dirty {
        tracing::warn!(version, "schema is dirty; repair it and run `migrate force`");
    }
    Ok(())
}

/// Record `version` as applied and clear the dirty flag.
pub async fn force(ctx: &Context, version: i64) -> Result<(), MigrationError> {
    Migrator::embedded()?.force(&ctx.pool, version).await?;
    tracing::warn!(version, "Schema version forced");
    Ok(())
}
