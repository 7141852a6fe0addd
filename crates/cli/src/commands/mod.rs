//! CLI command implementations.

pub mod cart;
pub mod output;
pub mod route;
pub mod session;

use fads_core::ValidationError;
use fads_storefront::StorefrontError;
use fads_storefront::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Storefront(#[from] StorefrontError),

    /// A cart change was rejected; the saved cart is unchanged.
    #[error("Rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Guest cart storage error: {0}")]
    Storage(#[from] StorageError),

    /// `FADS_PASSWORD` is not set.
    #[error("Missing environment variable: FADS_PASSWORD")]
    MissingPassword,

    #[error("Invalid price: {0:?}")]
    InvalidPrice(String),
}
