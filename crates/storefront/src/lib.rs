//! FADS storefront client core.
//!
//! Who the user is ([`session`]), what they may open ([`guard`],
//! [`middleware`]), and a cart that stays consistent across login and logout
//! ([`cart`], [`sync`]). [`Storefront`] ties them together.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod middleware;
pub mod session;
pub mod storage;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, CartApi, SessionApi};
pub use cart::{CartSnapshot, CartStore, ChangeOrigin, SyncHold, SyncStatus};
pub use config::StorefrontConfig;
pub use context::{Storefront, StorefrontOptions};
pub use error::{Result, StorefrontError};
pub use events::StorefrontEvent;
pub use guard::{Decision, RouteGuard, RoutePolicy};
pub use session::{AuthError, Phase, Session, SessionStore};
