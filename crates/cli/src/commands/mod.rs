//! CLI subcommands.

pub mod migrate;
pub mod projection;
pub mod resolve;
pub mod token;

use carbridge_reconcile::{
    ConfigError, ReconcileConfig, Reconciler, ResolveError, SetupError, ShipmentError,
};
use thiserror::Error;

/// Errors from commands that need a configured reconciler.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Shipment error: {0}")]
    Shipment(#[from] ShipmentError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Build a reconciler from the environment.
pub async fn reconciler() -> Result<Reconciler, CommandError> {
    let config = ReconcileConfig::from_env()?;
    tracing::info!(backend = ?config.backend, "Connecting to document store...");
    Ok(Reconciler::from_config(&config).await?)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json(value: &impl serde::Serialize) -> Result<(), CommandError> {
    let text = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{text}");
    }
    Ok(())
}
