//! Carbridge Reconcile - entity resolution and shipment reconciliation.
//!
//! The platform's records were written by several generations of services, so
//! one logical vehicle or customer may live in any of a handful of
//! collections, under drifting field names and identifier shapes. This crate
//! turns loose references into authoritative records and keeps the vehicle
//! shipping projection consistent with its append-only log.
//!
//! # Modules
//!
//! - [`store`] - Document store trait with memory, `PostgreSQL` and guarded backends
//! - [`identifier`] - Expansion of raw references into query forms
//! - [`entity`] - Entity kinds, collection priorities and field alias tables
//! - [`resolver`] - Cross-collection lookup with email fallback
//! - [`enrich`] - Merging fragments with authoritative records
//! - [`shipment`] - Shipping log, projection fold and timeline upsert
//! - [`auth`] - Bearer token verification over a rotating secret ring
//! - [`inquiry`] - Inquiry replies
//! - [`notify`] - Notification seam
//! - [`service`] - The [`Reconciler`] facade used by the server and CLI
//! - [`config`] - Environment configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod enrich;
pub mod entity;
pub mod identifier;
pub mod inquiry;
pub mod notify;
pub mod resolver;
pub mod service;
pub mod shipment;
pub mod store;

pub use auth::{AuthError, Principal, SecretRing, TokenVerifier};
pub use config::{AuthConfig, ConfigError, ReconcileConfig, StoreBackend};
pub use enrich::{Customer, Vehicle, enrich_customer, enrich_vehicle};
pub use entity::{EntityKind, Field};
pub use resolver::{CollectionResolver, EntityReference, Resolution, ResolveError, Resolved};
pub use service::{Found, Reconciler, SetupError, ShippingView};
pub use shipment::{
    PartialReconciliation, RebuildOutcome, ShipmentError, ShipmentOutcome, StatusUpdate,
};
pub use store::{DocumentStore, GuardedStore, MemoryStore, RetryPolicy, StoreError};
