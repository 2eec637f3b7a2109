//! Authentication extractors.
//!
//! Tokens arrive either as `Authorization: Bearer <jwt>` or in a cookie. The
//! admin console sets `adminToken`, the customer portal `customerToken`, and
//! the first generation of both used a plain `token` cookie. The header wins
//! when both are present.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    extract::CookieJar,
    headers::{Authorization, authorization::Bearer},
};

use carbridge_core::PrincipalKind;
use carbridge_reconcile::Principal;

use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

/// Cookie set by the admin console.
pub const ADMIN_COOKIE: &str = "adminToken";
/// Cookie set by the customer portal.
pub const CUSTOMER_COOKIE: &str = "customerToken";
/// Cookie used by the first generation of both front ends.
pub const LEGACY_COOKIE: &str = "token";

/// Cookies to read for a principal kind, in order.
const fn cookie_names(kind: PrincipalKind) -> [&'static str; 2] {
    match kind {
        PrincipalKind::Admin => [ADMIN_COOKIE, LEGACY_COOKIE],
        PrincipalKind::Customer => [CUSTOMER_COOKIE, LEGACY_COOKIE],
    }
}

/// Find the raw credential in the request.
async fn credential(parts: &mut Parts, kind: PrincipalKind) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, &()).await
    {
        return Some(bearer.token().to_string());
    }

    let jar = CookieJar::from_headers(&parts.headers);
    cookie_names(kind)
        .into_iter()
        .find_map(|name| jar.get(name).map(|c| c.value().to_string()))
}

async fn authenticate(
    parts: &mut Parts,
    state: &AppState,
    kind: PrincipalKind,
) -> Result<Principal, AppError> {
    let token = credential(parts, kind).await;
    let principal = state
        .reconciler()
        .verify_token(token.as_deref(), kind)
        .inspect_err(|e| tracing::debug!(kind = %kind, error = %e, "Authentication failed"))?;

    tracing::Span::current().record("principal_id", principal.subject_id.as_str());
    set_sentry_user(&principal.subject_id, principal.email.as_deref());
    Ok(principal)
}

/// Extractor that requires an admin token.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAdmin(admin): RequireAdmin) -> String {
///     format!("Hello, {}!", admin.subject_id)
/// }
/// ```
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, PrincipalKind::Admin).await.map(Self)
    }
}

/// Extractor that requires a customer token.
pub struct RequireCustomer(pub Principal);

impl FromRequestParts<AppState> for RequireCustomer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, PrincipalKind::Customer)
            .await
            .map(Self)
    }
}
