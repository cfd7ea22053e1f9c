//! Organization and user onboarding commands.
//!
//! # Usage
//!
//! ```bash
//! # Create an organization with its owner (password from AUTOHAUL_PASSWORD)
//! autohaul org create -n "Acme Transport" -s acme \
//!     --owner-email owner@acme.test --owner-name "Ada Owner"
//!
//! # Add a dispatcher
//! autohaul user create -s acme -e dispatch@acme.test -n Dana -r dispatcher
//!
//! # Suspend a tenant; its users can no longer log in or use tokens
//! autohaul org deactivate acme
//! ```

use autohaul_core::UserRole;
use autohaul_server::db::RepositoryError;
use autohaul_server::db::organizations::OrganizationRepository;
use autohaul_server::services::auth::{AuthError, OrganizationSignup, RegisterUser};

use super::Context;

/// Create an organization and its owner in one transaction.
pub async fn create(
    ctx: &Context,
    name: String,
    slug: String,
    owner_email: String,
    owner_name: String,
    password: String,
) -> Result<(), AuthError> {
    tracing::info!("Creating organization: {} ({})", name, slug);

    let (organization, owner) = ctx
        .auth()
        .create_organization_with_owner(OrganizationSignup {
            name,
            slug,
            owner: RegisterUser {
                email: owner_email,
                name: owner_name,
                password,
                role: UserRole::Owner,
            },
        })
        .await?;

    tracing::info!(
        "Organization created successfully! ID: {}, Slug: {}, Owner: {}",
        organization.id,
        organization.slug,
        owner.email
    );
    Ok(())
}

/// Add a user to an existing organization.
pub async fn add_user(
    ctx: &Context,
    slug: &str,
    email: String,
    name: String,
    role: UserRole,
    password: String,
) -> Result<(), AuthError> {
    let user = ctx
        .auth()
        .add_user_to_organization(
            slug,
            RegisterUser {
                email,
                name,
                password,
                role,
            },
        )
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}

/// List all organizations.
pub async fn list(ctx: &Context) -> Result<(), RepositoryError> {
    let organizations = OrganizationRepository::new(&ctx.pool).list().await?;

    #[allow(clippy::print_stdout)]
    {
        for org in &organizations {
            let state = if org.is_active { "active" } else { "inactive" };
            println!("{}\t{}\t{}\t{}", org.id, org.slug, state, org.name);
        }
    }
    Ok(())
}

/// Activate or deactivate an organization.
pub async fn set_active(ctx: &Context, slug: &str, active: bool) -> Result<(), RepositoryError> {
    let organization = OrganizationRepository::new(&ctx.pool)
        .set_active(slug, active)
        .await?;

    if active {
        tracing::info!(organization_id = %organization.id, slug, "Organization activated");
    } else {
        tracing::warn!(
            organization_id = %organization.id,
            slug,
            "Organization deactivated; its users are locked out"
        );
    }
    Ok(())
}
