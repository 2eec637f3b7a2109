//! Token minting.
//!
//! Tokens are signed with `JWT_SECRET`, the same secret the server verifies
//! against first.
//!
//! # Usage
//!
//! ```bash
//! cb-cli token admin -s <admin-id> -r manager --ttl-hours 2
//! cb-cli token customer -s <customer-id> -e owner@example.com
//! ```

use carbridge_core::AdminRole;
use carbridge_reconcile::AuthError;
use carbridge_reconcile::auth::{TokenClaims, mint};
use chrono::Duration;
use secrecy::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid role: {0}. Valid roles: super_admin, admin, manager, staff")]
    InvalidRole(String),

    #[error("Invalid ttl: {0} hours")]
    InvalidTtl(i64),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

fn signing_secret() -> Result<SecretString, TokenError> {
    dotenvy::dotenv().ok();
    std::env::var("JWT_SECRET")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
        .ok_or(TokenError::MissingEnvVar("JWT_SECRET"))
}

fn ttl(hours: i64) -> Result<Duration, TokenError> {
    if hours <= 0 || hours > 24 * 30 {
        return Err(TokenError::InvalidTtl(hours));
    }
    Ok(Duration::hours(hours))
}

/// Claims for an admin token.
fn admin_claims(
    subject: &str,
    role: &str,
    email: Option<&str>,
    ttl_hours: i64,
) -> Result<TokenClaims, TokenError> {
    let role: AdminRole = role
        .parse()
        .map_err(|_| TokenError::InvalidRole(role.to_owned()))?;
    let claims = TokenClaims::admin(subject, role, ttl(ttl_hours)?);
    Ok(match email {
        Some(email) => claims.with_email(email),
        None => claims,
    })
}

fn customer_claims(
    subject: &str,
    email: Option<&str>,
    ttl_hours: i64,
) -> Result<TokenClaims, TokenError> {
    let claims = TokenClaims::customer(subject, ttl(ttl_hours)?);
    Ok(match email {
        Some(email) => claims.with_email(email),
        None => claims,
    })
}

/// Mint an admin token.
pub fn admin(
    subject: &str,
    role: &str,
    email: Option<&str>,
    ttl_hours: i64,
) -> Result<String, TokenError> {
    let claims = admin_claims(subject, role, email, ttl_hours)?;
    tracing::info!(subject, role, ttl_hours, "Minting admin token");
    Ok(mint(&claims, &signing_secret()?)?)
}

/// Mint a customer token.
pub fn customer(subject: &str, email: Option<&str>, ttl_hours: i64) -> Result<String, TokenError> {
    let claims = customer_claims(subject, email, ttl_hours)?;
    tracing::info!(subject, ttl_hours, "Minting customer token");
    Ok(mint(&claims, &signing_secret()?)?)
}
