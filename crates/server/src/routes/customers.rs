//! Admin customer lookup.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use carbridge_reconcile::{Customer, EntityReference, Found};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::routes::with_source;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    /// Email to fall back to when the id matches nothing.
    pub email: Option<String>,
    pub source: Option<String>,
}

/// `GET /api/admin/customers/{id}?email=`
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<Found<Customer>>> {
    let mut reference =
        with_source(EntityReference::customer(id.clone()), query.source.as_deref())?;
    if let Some(email) = query.email {
        reference = reference.with_email(email);
    }

    state
        .reconciler()
        .resolve_customer(&reference)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(format!("customer {id}")))
}
