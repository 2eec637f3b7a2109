//! Outbound notifications.
//!
//! The reconciliation layer only hands an enriched view and an event name to a
//! [`Notifier`]; delivery (email, chat, push) belongs to the implementation.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::enrich::{Customer, Vehicle};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Event handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Short machine name, e.g. `inquiry.reply`.
    pub event: String,
    /// Human readable description.
    pub description: String,
    pub customer: Customer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
}

impl Notification {
    /// Address to deliver to, if the customer has one.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.customer.email.as_option().map(String::as_str)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Deliver a notification.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if the notification could not be delivered.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only logs. Used when no delivery channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let vehicle = notification.vehicle.as_ref().and_then(Vehicle::title);
        info!(
            event = %notification.event,
            recipient = notification.recipient().unwrap_or("<none>"),
            vehicle = vehicle.as_deref().unwrap_or("<none>"),
            "{}",
            notification.description
        );
        Ok(())
    }
}
