//! Validation errors for cart mutations.
//!
//! A mutation that fails validation is rejected before it reaches the
//! reducer's output: the cart is left exactly as it was.

use thiserror::Error;

use crate::types::{IdError, PriceError, VariantError};

/// A cart mutation was rejected because its input is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantity below one where a positive quantity is required.
    #[error("quantity must be at least 1 (got {0})")]
    QuantityTooSmall(i64),

    /// Quantity above the per-line bound.
    #[error("quantity must be at most {max} (got {got})")]
    QuantityTooLarge {
        /// Requested quantity.
        got: i64,
        /// Maximum allowed quantity.
        max: u32,
    },

    /// Missing or malformed product id.
    #[error("invalid product id: {0}")]
    ProductId(#[from] IdError),

    /// Malformed variant attributes.
    #[error("invalid variant: {0}")]
    Variant(#[from] VariantError),

    /// Malformed unit price.
    #[error("invalid price: {0}")]
    Price(#[from] PriceError),

    /// A line key that cannot have been produced by key derivation.
    #[error("invalid line key: {0:?}")]
    LineKey(String),

    /// A line whose key does not match its product and variant.
    #[error("line key {key:?} does not match its product and variant")]
    KeyMismatch {
        /// The stored key.
        key: String,
    },

    /// Two lines with the same key.
    #[error("duplicate line key {0:?}")]
    DuplicateLine(String),
}
