//! Carbridge CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run document store migrations
//! cb-cli migrate
//!
//! # Mint a short-lived admin token for support work
//! cb-cli token admin -s 64f1c2a9e4b0a1b2c3d4e5c1 -r manager --ttl-hours 2
//!
//! # Mint a customer token
//! cb-cli token customer -s 64f1c2a9e4b0a1b2c3d4e5c1 -e owner@example.com
//!
//! # Look up a vehicle or customer across its collections
//! cb-cli resolve vehicle 64f1c2a9e4b0a1b2c3d4e5a1 --source CarListing
//! cb-cli resolve customer 64f1c2a9e4b0a1b2c3d4e5c1 --email owner@example.com
//!
//! # Rebuild a vehicle's shipping projection from its log
//! cb-cli projection rebuild 64f1c2a9e4b0a1b2c3d4e5a1
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `token` - Mint signed tokens
//! - `resolve` - Resolve entities and print the merged view
//! - `projection` - Repair shipping projections

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cb-cli")]
#[command(author, version, about = "Carbridge CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Mint a signed token with the current secret
    Token {
        #[command(subcommand)]
        kind: TokenKind,
    },
    /// Resolve an entity across its collections
    Resolve {
        #[command(subcommand)]
        entity: ResolveTarget,
    },
    /// Shipping projection maintenance
    Projection {
        #[command(subcommand)]
        action: ProjectionAction,
    },
}

#[derive(Subcommand)]
enum TokenKind {
    /// Admin console token
    Admin {
        /// Admin id
        #[arg(short, long)]
        subject: String,

        /// Admin role (`super_admin`, `admin`, `manager`, `staff`)
        #[arg(short, long, default_value = "staff")]
        role: String,

        /// Email claim
        #[arg(short, long)]
        email: Option<String>,

        /// Lifetime in hours
        #[arg(long, default_value_t = 8)]
        ttl_hours: i64,
    },
    /// Customer portal token
    Customer {
        /// Customer id
        #[arg(short, long)]
        subject: String,

        /// Email claim
        #[arg(short, long)]
        email: Option<String>,

        /// Lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[derive(Subcommand)]
enum ResolveTarget {
    /// Resolve a vehicle
    Vehicle {
        /// Vehicle id in any stored form
        id: String,

        /// Collection the vehicle is expected in; a mismatch is logged
        #[arg(long)]
        source: Option<String>,
    },
    /// Resolve a customer
    Customer {
        /// Customer id in any stored form
        id: String,

        /// Email to fall back to
        #[arg(short, long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectionAction {
    /// Rebuild timeline and shipping fields from the shipping log
    Rebuild {
        /// Vehicle id in any stored form
        vehicle: String,

        /// Collection the vehicle is expected in; a mismatch is logged
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Token { kind } => {
            let token = match kind {
                TokenKind::Admin {
                    subject,
                    role,
                    email,
                    ttl_hours,
                } => commands::token::admin(&subject, &role, email.as_deref(), ttl_hours)?,
                TokenKind::Customer {
                    subject,
                    email,
                    ttl_hours,
                } => commands::token::customer(&subject, email.as_deref(), ttl_hours)?,
            };
            #[allow(clippy::print_stdout)]
            {
                println!("{token}");
            }
        }
        Commands::Resolve { entity } => match entity {
            ResolveTarget::Vehicle { id, source } => {
                commands::resolve::vehicle(&id, source.as_deref()).await?;
            }
            ResolveTarget::Customer { id, email } => {
                commands::resolve::customer(&id, email.as_deref()).await?;
            }
        },
        Commands::Projection { action } => match action {
            ProjectionAction::Rebuild { vehicle, source } => {
                commands::projection::rebuild(&vehicle, source.as_deref()).await?;
            }
        },
    }
    Ok(())
}
