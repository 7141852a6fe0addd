//! Product variant attributes chosen by the shopper.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Variant`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    /// An attribute is longer than [`Variant::MAX_ATTRIBUTE_LENGTH`].
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Attribute name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
    /// An attribute contains a control character.
    #[error("{field} cannot contain control characters")]
    ControlCharacter {
        /// Attribute name.
        field: &'static str,
    },
}

/// Optional size and color of a cart line.
///
/// An absent attribute and an empty one are the same value, so
/// `{size: ""}` and `{}` compare (and key) equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVariant")]
pub struct Variant {
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
}

#[derive(Deserialize)]
struct RawVariant {
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

impl TryFrom<RawVariant> for Variant {
    type Error = VariantError;

    fn try_from(raw: RawVariant) -> Result<Self, Self::Error> {
        Self::new(raw.size.as_deref(), raw.color.as_deref())
    }
}

impl Variant {
    /// Longest accepted attribute value.
    pub const MAX_ATTRIBUTE_LENGTH: usize = 64;

    /// Create a variant from optional size and color.
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute is too long or contains control
    /// characters.
    pub fn new(size: Option<&str>, color: Option<&str>) -> Result<Self, VariantError> {
        Ok(Self {
            size: attribute("size", size)?,
            color: attribute("color", color)?,
        })
    }

    /// A variant with no attributes.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            size: None,
            color: None,
        }
    }

    /// The chosen size, if any.
    #[must_use]
    pub fn size(&self) -> Option<&str> {
        self.size.as_deref()
    }

    /// The chosen color, if any.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
}

fn attribute(field: &'static str, value: Option<&str>) -> Result<Option<String>, VariantError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > Variant::MAX_ATTRIBUTE_LENGTH {
        return Err(VariantError::TooLong {
            field,
            max: Variant::MAX_ATTRIBUTE_LENGTH,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(VariantError::ControlCharacter { field });
    }
    Ok(Some(value.to_owned()))
}
