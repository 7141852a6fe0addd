//! Newtype IDs for type-safe entity references.
//!
//! Identifiers come from the backend as opaque strings (document ids, slugs).
//! Use the `define_id!` macro to create wrappers that cannot be mixed up and
//! that refuse blank values at the boundary.

/// Longest identifier accepted from the backend or from user input.
pub const MAX_ID_LENGTH: usize = 128;

/// Errors that can occur when parsing an identifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier is empty or whitespace only.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the identifier type.
        kind: &'static str,
    },
    /// The identifier is too long.
    #[error("{kind} must be at most {max} characters")]
    TooLong {
        /// Name of the identifier type.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` as a plain string (validated on the way in)
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - `parse()`, `as_str()`, `into_inner()`
/// - `Display`, `FromStr`, `AsRef<str>` and `TryFrom<String>`
///
/// # Example
///
/// ```rust
/// # use fads_core::define_id;
/// define_id!(OrderId);
/// define_id!(ReviewId);
///
/// let order = OrderId::parse("ord_1").unwrap();
/// assert_eq!(order.as_str(), "ord_1");
/// assert!(ReviewId::parse("   ").is_err());
///
/// // These are different types, so this won't compile:
/// // let _: ReviewId = order;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an identifier, rejecting blank or oversized values.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty, whitespace only, or longer
            /// than `MAX_ID_LENGTH`.
            pub fn parse(id: impl Into<String>) -> Result<Self, $crate::types::id::IdError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err($crate::types::id::IdError::Empty {
                        kind: stringify!($name),
                    });
                }
                if id.len() > $crate::types::id::MAX_ID_LENGTH {
                    return Err($crate::types::id::IdError::TooLong {
                        kind: stringify!($name),
                        max: $crate::types::id::MAX_ID_LENGTH,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::types::id::IdError;

            fn try_from(id: String) -> Result<Self, Self::Error> {
                Self::parse(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(ProductId);
define_id!(UserId);
