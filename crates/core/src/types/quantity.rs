//! Cart line quantity.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Quantity of a cart line: at least 1, at most [`Quantity::MAX`].
///
/// A line with quantity zero does not exist; callers asking for zero or less
/// remove the line instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// Largest quantity a single line can hold.
    pub const MAX: u32 = 9_999;

    /// A quantity of one.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::QuantityTooSmall` for zero and
    /// `ValidationError::QuantityTooLarge` above [`Quantity::MAX`].
    pub fn new(n: u32) -> Result<Self, ValidationError> {
        Self::from_requested(i64::from(n))
    }

    /// Validate a quantity requested by a caller (which may be negative).
    ///
    /// # Errors
    ///
    /// Same as [`Quantity::new`].
    pub fn from_requested(n: i64) -> Result<Self, ValidationError> {
        if n > i64::from(Self::MAX) {
            return Err(ValidationError::QuantityTooLarge {
                got: n,
                max: Self::MAX,
            });
        }
        u32::try_from(n)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(ValidationError::QuantityTooSmall(n))
    }

    /// The quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Add two quantities, failing past [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::QuantityTooLarge` if the sum exceeds the bound.
    pub fn checked_add(self, other: Self) -> Result<Self, ValidationError> {
        Self::from_requested(i64::from(self.get()) + i64::from(other.get()))
    }

    /// Add two quantities, clamping at [`Quantity::MAX`].
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        self.checked_add(other).unwrap_or(Self::max_value())
    }

    fn max_value() -> Self {
        Self(NonZeroU32::new(Self::MAX).unwrap_or(NonZeroU32::MIN))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = ValidationError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
