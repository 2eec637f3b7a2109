//! Core types for Carbridge.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod object_id;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use object_id::{ObjectId, ObjectIdError};
pub use price::{CurrencyCode, Price};
pub use status::*;
