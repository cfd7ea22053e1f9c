//! Login token maintenance.

use autohaul_server::services::auth::AuthError;

use super::Context;

/// Delete expired login tokens. Safe to run from cron.
pub async fn purge(ctx: &Context) -> Result<(), AuthError> {
    let purged = ctx.auth().purge_expired_tokens().await?;
    tracing::info!(purged, "Expired tokens purged");
    Ok(())
}
