//! Carbridge Core - Shared types library.
//!
//! This crate provides common types used across all Carbridge components:
//! - `reconcile` - Entity resolution and shipment reconciliation layer
//! - `server` - HTTP surface for the admin console and customer portal
//! - `cli` - Command-line tools for migrations and operator repair
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Object identifiers, emails, prices, and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
