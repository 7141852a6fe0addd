//! Core types for fads.
//!
//! This module provides type-safe wrappers for the storefront domain.

pub mod actor;
pub mod email;
pub mod id;
pub mod line_key;
pub mod price;
pub mod quantity;
pub mod variant;

pub use actor::{AccountKind, Actor, ActorKind};
pub use email::{Email, EmailError};
pub use id::*;
pub use line_key::{LINE_KEY_SEPARATOR, LineKey, derive_key};
pub use price::{Price, PriceError};
pub use quantity::Quantity;
pub use variant::{Variant, VariantError};
