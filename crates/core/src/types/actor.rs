//! The current identity of the client session.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::{Email, UserId};

/// Who is using the storefront right now.
///
/// Exactly one `Actor` is current at a time. It is replaced wholesale on every
/// transition, never edited field by field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// Anonymous visitor.
    #[default]
    Guest,
    /// Signed-in shopper.
    Customer {
        /// Backend user id.
        id: UserId,
        /// Account email.
        email: Email,
    },
    /// Signed-in back-office administrator.
    Admin {
        /// Backend user id.
        id: UserId,
        /// Account email.
        email: Email,
    },
}

impl Actor {
    /// Build an authenticated actor of the given account kind.
    #[must_use]
    pub fn authenticated(kind: AccountKind, id: UserId, email: Email) -> Self {
        match kind {
            AccountKind::Customer => Self::Customer { id, email },
            AccountKind::Admin => Self::Admin { id, email },
        }
    }

    /// The discriminant of this actor.
    #[must_use]
    pub const fn kind(&self) -> ActorKind {
        match self {
            Self::Guest => ActorKind::Guest,
            Self::Customer { .. } => ActorKind::Customer,
            Self::Admin { .. } => ActorKind::Admin,
        }
    }

    /// Whether this actor has signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.kind().is_authenticated()
    }

    /// The user id of a signed-in actor.
    #[must_use]
    pub const fn id(&self) -> Option<&UserId> {
        match self {
            Self::Guest => None,
            Self::Customer { id, .. } | Self::Admin { id, .. } => Some(id),
        }
    }

    /// The email of a signed-in actor.
    #[must_use]
    pub const fn email(&self) -> Option<&Email> {
        match self {
            Self::Guest => None,
            Self::Customer { email, .. } | Self::Admin { email, .. } => Some(email),
        }
    }
}

/// The kind of an [`Actor`], without its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Guest,
    Customer,
    Admin,
}

impl ActorKind {
    /// Whether this kind has signed in.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        !matches!(self, Self::Guest)
    }

    /// Stable lowercase name, used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of account one can sign in as.
///
/// Selects the session-service endpoints (`/auth/*` or `/admin/*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Customer,
    Admin,
}

impl AccountKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl From<AccountKind> for ActorKind {
    fn from(kind: AccountKind) -> Self {
        match kind {
            AccountKind::Customer => Self::Customer,
            AccountKind::Admin => Self::Admin,
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_is_default_and_anonymous() {
        let actor = Actor::default();
        assert_eq!(actor.kind(), ActorKind::Guest);
        assert!(!actor.is_authenticated());
        assert!(actor.id().is_none());
    }

    #[test]
    fn test_authenticated_constructor() {
        let admin = Actor::authenticated(
            AccountKind::Admin,
            UserId::parse("u1").unwrap(),
            Email::parse("ops@fads.shop").unwrap(),
        );
        assert_eq!(admin.kind(), ActorKind::Admin);
        assert_eq!(admin.email().map(Email::as_str), Some("ops@fads.shop"));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(Actor::Customer {
            id: UserId::parse("42").unwrap(),
            email: Email::parse("ada@fads.shop").unwrap(),
        })
        .unwrap();
        assert_eq!(json["kind"], "customer");
        assert_eq!(json["id"], "42");
    }
}
