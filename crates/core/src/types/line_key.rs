//! Cart line identity.
//!
//! # Format
//!
//! ```text
//! escape(product_id) "|" escape(size) "|" escape(color)
//! ```
//!
//! `escape` replaces `%` with `%25` and `|` with `%7C`; absent attributes are
//! empty fields. The key always has exactly three fields, so a size can never
//! be mistaken for a color and no identifier can smuggle in a separator.
//!
//! | product | size | color | key |
//! |---|---|---|---|
//! | `A` | `M` | - | `A\|M\|` |
//! | `A` | - | `M` | `A\|\|M` |
//! | `A\|M` | - | - | `A%7CM\|\|` |

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{ProductId, Variant};
use crate::error::ValidationError;

/// Separator between the three fields of a [`LineKey`].
pub const LINE_KEY_SEPARATOR: char = '|';

/// Deterministic identity of a cart line.
///
/// Two lines share a key exactly when they have the same product and the same
/// variant attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineKey(String);

impl LineKey {
    /// Derive the key of a product/variant pair.
    #[must_use]
    pub fn derive(product_id: &ProductId, variant: &Variant) -> Self {
        let mut key = String::with_capacity(product_id.as_str().len() + 8);
        key.push_str(&escape(product_id.as_str()));
        key.push(LINE_KEY_SEPARATOR);
        key.push_str(&escape(variant.size().unwrap_or_default()));
        key.push(LINE_KEY_SEPARATOR);
        key.push_str(&escape(variant.color().unwrap_or_default()));
        Self(key)
    }

    /// Parse a key received from a caller.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::LineKey` unless the value has exactly three
    /// fields and a non-empty product field.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let mut fields = s.split(LINE_KEY_SEPARATOR);
        let product = fields.next().unwrap_or_default();
        if product.is_empty() || fields.count() != 2 {
            return Err(ValidationError::LineKey(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Derive the key of a product/variant pair.
///
/// Free-function form of [`LineKey::derive`].
#[must_use]
pub fn derive_key(product_id: &ProductId, variant: &Variant) -> LineKey {
    LineKey::derive(product_id, variant)
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains(['%', LINE_KEY_SEPARATOR]) {
        Cow::Owned(field.replace('%', "%25").replace(LINE_KEY_SEPARATOR, "%7C"))
    } else {
        Cow::Borrowed(field)
    }
}

impl TryFrom<String> for LineKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<LineKey> for String {
    fn from(key: LineKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn variant(size: Option<&str>, color: Option<&str>) -> Variant {
        Variant::new(size, color).unwrap()
    }

    #[test]
    fn test_same_pair_same_key() {
        let a = derive_key(&pid("A"), &variant(Some("M"), Some("red")));
        let b = derive_key(&pid("A"), &variant(Some("M"), Some("red")));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "A|M|red");
    }

    #[test]
    fn test_absent_and_empty_attributes_share_a_key() {
        assert_eq!(
            derive_key(&pid("A"), &Variant::none()),
            derive_key(&pid("A"), &variant(Some(""), Some("")))
        );
    }

    #[test]
    fn test_any_difference_changes_the_key() {
        let keys = [
            derive_key(&pid("A"), &Variant::none()),
            derive_key(&pid("B"), &Variant::none()),
            derive_key(&pid("A"), &variant(Some("M"), None)),
            derive_key(&pid("A"), &variant(Some("L"), None)),
            derive_key(&pid("A"), &variant(None, Some("M"))),
            derive_key(&pid("A"), &variant(Some("M"), Some("red"))),
            derive_key(&pid("A"), &variant(Some("red"), Some("M"))),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_separator_in_fields_cannot_forge_keys() {
        // "A|M" with no size must not collide with "A" in size "M".
        let forged = derive_key(&pid("A|M"), &Variant::none());
        let genuine = derive_key(&pid("A"), &variant(Some("M"), None));
        assert_ne!(forged, genuine);
        assert_eq!(forged.as_str(), "A%7CM||");

        // An escaped-looking identifier stays distinct from the escape output.
        let literal = derive_key(&pid("A%7CM"), &Variant::none());
        assert_ne!(literal, forged);
    }

    #[test]
    fn test_parse_requires_three_fields() {
        assert!(LineKey::parse("A|M|red").is_ok());
        assert!(LineKey::parse("A||").is_ok());
        assert!(LineKey::parse("A|M").is_err());
        assert!(LineKey::parse("|M|red").is_err());
        assert!(LineKey::parse("A|M|red|x").is_err());
    }
}
