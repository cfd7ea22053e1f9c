//! Autohaul CLI - Database migrations and tenant onboarding.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! autohaul migrate up
//!
//! # Roll back the most recent migration
//! autohaul migrate down
//!
//! # Create an organization and its owner
//! AUTOHAUL_PASSWORD=... autohaul org create -n "Acme Transport" -s acme \
//!     --owner-email owner@acme.test --owner-name "Ada Owner"
//!
//! # Add a user to an existing organization
//! AUTOHAUL_PASSWORD=... autohaul user create -s acme -e dispatch@acme.test -n Dana -r dispatcher
//! ```
//!
//! # Commands
//!
//! - `migrate` - Apply, roll back, inspect or force the schema version
//! - `org` - Create, list, activate or deactivate organizations
//! - `user create` - Add a user to an organization
//! - `tokens purge` - Delete expired login tokens
//!
//! All commands read `DATABASE_URL` (and a `.env` file if present).

#![cfg_attr(not(test), forbid(unsafe_code))]

use autohaul_core::UserRole;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "autohaul")]
#[command(author, version, about = "Autohaul CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Manage organizations
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage login tokens
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migration
    Down,
    /// Show the current schema version
    Version,
    /// Set the recorded version without running scripts (clears dirty)
    Force {
        /// Version to record
        version: i64,
    },
}

#[derive(Subcommand)]
enum OrgAction {
    /// Create an organization together with its owner
    Create {
        /// Organization display name
        #[arg(short, long)]
        name: String,

        /// Unique slug (lowercase letters, digits, hyphens)
        #[arg(short, long)]
        slug: String,

        /// Owner email address
        #[arg(long)]
        owner_email: String,

        /// Owner display name
        #[arg(long)]
        owner_name: String,

        /// Owner password
        #[arg(long, env = "AUTOHAUL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List organizations
    List,
    /// Block every user of an organization from logging in
    Deactivate {
        /// Organization slug
        slug: String,
    },
    /// Re-enable a deactivated organization
    Activate {
        /// Organization slug
        slug: String,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a user to an organization
    Create {
        /// Organization slug
        #[arg(short, long)]
        slug: String,

        /// User email address
        #[arg(short, long)]
        email: String,

        /// User display name
        #[arg(short, long)]
        name: String,

        /// User role (`owner`, `admin`, `dispatcher`, `viewer`)
        #[arg(short, long, default_value = "dispatcher")]
        role: UserRole,

        /// User password
        #[arg(long, env = "AUTOHAUL_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum TokensAction {
    /// Delete expired login tokens
    Purge,
}

#[tokio::main]
async fn main() {
    // Load .env before parsing so `env = ...` arguments see it
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autohaul_cli=info,autohaul_server=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = commands::Context::connect().await?;

    match cli.command {
        Commands::Migrate { action } => match action {
            MigrateAction::Up => commands::migrate::up(&ctx).await?,
            MigrateAction::Down => commands::migrate::down(&ctx).await?,
            MigrateAction::Version => commands::migrate::version(&ctx).await?,
            MigrateAction::Force { version } => commands::migrate::force(&ctx, version).await?,
        },
        Commands::Org { action } => match action {
            OrgAction::Create {
                name,
                slug,
                owner_email,
                owner_name,
                password,
            } => {
                commands::org::create(&ctx, name, slug, owner_email, owner_name, password).await?;
            }
            OrgAction::List => commands::org::list(&ctx).await?,
            OrgAction::Deactivate { slug } => commands::org::set_active(&ctx, &slug, false).await?,
            OrgAction::Activate { slug } => commands::org::set_active(&ctx, &slug, true).await?,
        },
        Commands::User { action } => match action {
            UserAction::Create {
                slug,
                email,
                name,
                role,
                password,
            } => {
                commands::org::add_user(&ctx, &slug, email, name, role, password).await?;
            }
        },
        Commands::Tokens { action } => match action {
            TokensAction::Purge => commands::tokens::purge(&ctx).await?,
        },
    }
    Ok(())
}
