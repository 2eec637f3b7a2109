//! Admin inquiry replies.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::Value;

use carbridge_core::Role;
use carbridge_reconcile::inquiry::{ReplyInput, ReplyOutcome};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub message: String,
}

/// `POST /api/admin/inquiries/{id}/replies`
pub async fn reply(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ReplyOutcome>> {
    let author_role = match admin.role {
        Role::Admin(role) => role.to_string(),
        Role::Customer => "customer".to_string(),
    };
    let input = ReplyInput {
        message: body.message,
        author: admin.email.unwrap_or(admin.subject_id),
        author_role,
    };

    let outcome = state
        .reconciler()
        .reply_to_inquiry(&Value::String(id), &input)
        .await?;
    Ok(Json(outcome))
}
