//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; clients get a JSON body with a
//! message that never includes store internals.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use carbridge_reconcile::inquiry::InquiryError;
use carbridge_reconcile::{AuthError, ResolveError, ShipmentError, StoreError};

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Credential missing, invalid or for the wrong principal.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Store failure while resolving an entity.
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Shipment update failed.
    #[error("Shipment error: {0}")]
    Shipment(#[from] ShipmentError),

    /// Inquiry reply failed.
    #[error("Inquiry error: {0}")]
    Inquiry(#[from] InquiryError),

    /// Direct store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Status for a store failure. Transient failures are 503 so clients retry.
const fn store_status(err: &StoreError) -> StatusCode {
    if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => match err {
                AuthError::WrongPrincipalKind { .. } => StatusCode::FORBIDDEN,
                AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            },
            Self::Resolve(ResolveError::Store(err))
            | Self::Store(err)
            | Self::Shipment(ShipmentError::Store(err) | ShipmentError::Resolve(ResolveError::Store(err)))
            | Self::Inquiry(InquiryError::Store(err) | InquiryError::Resolve(ResolveError::Store(err))) => {
                store_status(err)
            }
            Self::Shipment(ShipmentError::VehicleNotFound { .. })
            | Self::Inquiry(InquiryError::NotFound(_))
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Inquiry(InquiryError::EmptyMessage | InquiryError::MessageTooLong)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Message safe to show to clients.
    fn client_message(&self) -> String {
        match self {
            Self::Auth(AuthError::WrongPrincipalKind { .. }) | Self::Forbidden(_) => {
                "Forbidden".to_string()
            }
            Self::Auth(AuthError::Expired) => "Session expired, please sign in again".to_string(),
            Self::Auth(AuthError::Signing(_)) => "Internal server error".to_string(),
            Self::Auth(_) => "Unauthorized".to_string(),
            Self::Shipment(ShipmentError::VehicleNotFound { .. }) => "Vehicle not found".to_string(),
            Self::Inquiry(InquiryError::NotFound(_)) => "Inquiry not found".to_string(),
            Self::Inquiry(err @ (InquiryError::EmptyMessage | InquiryError::MessageTooLong)) => {
                err.to_string()
            }
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(msg) => msg.clone(),
            Self::Resolve(_) | Self::Store(_) | Self::Shipment(_) | Self::Inquiry(_) => {
                if self.status() == StatusCode::SERVICE_UNAVAILABLE {
                    "Service temporarily unavailable".to_string()
                } else {
                    "Internal server error".to_string()
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a verified principal.
pub fn set_sentry_user(user_id: &str, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}
