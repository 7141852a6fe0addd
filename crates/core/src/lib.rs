//! Fads Core - Shared types and pure cart transitions.
//!
//! This crate provides the types used across all fads components:
//! - `storefront` - Client core (session, cart store, cart sync, route guard)
//! - `cli` - Command-line tools for operators
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. Everything here can be tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, prices, quantities, variants,
//!   line keys and the [`Actor`] union
//! - [`cart`] - The cart value, its reducer and the guest/remote merge
//! - [`error`] - Validation errors raised by cart mutations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod error;
pub mod types;

pub use cart::{Cart, CartAction, CartLine, merge};
pub use error::ValidationError;
pub use types::*;
