//! The route policy table and the pure decision function.

use std::fmt;

use fads_core::{Actor, ActorKind};
use url::form_urlencoded;

/// Who may open a protected prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any signed-in actor (customer or admin).
    SignedIn,
    /// Administrators only.
    Admin,
}

/// Why a navigation was redirected. Carried as the `reason` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    NotLoggedIn,
    NotAdmin,
}

impl RedirectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotLoggedIn => "not-logged-in",
            Self::NotAdmin => "not-admin",
        }
    }
}

impl fmt::Display for RedirectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect {
        /// Sign-in page with the reason query, e.g. `/account/signin?reason=not-logged-in`.
        target: String,
        reason: RedirectReason,
    },
}

impl Decision {
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Redirect target, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Redirect { target, .. } => Some(target),
        }
    }

    fn redirect(sign_in: &str, reason: RedirectReason) -> Self {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("reason", reason.as_str())
            .finish();
        Self::Redirect {
            target: format!("{sign_in}?{query}"),
            reason,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Redirect { target, .. } => write!(f, "redirect {target}"),
        }
    }
}

/// One protected prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub prefix: String,
    pub requirement: Requirement,
    /// Where guests are sent.
    pub sign_in: String,
}

impl PolicyEntry {
    pub fn new(prefix: impl Into<String>, requirement: Requirement, sign_in: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            requirement,
            sign_in: sign_in.into(),
        }
    }
}

/// Static route protection table.
///
/// Prefixes match whole path segments: `/admin` covers `/admin` and
/// `/admin/products`, not `/administrator`. Query strings, fragments, repeated
/// or trailing slashes and dot segments are normalised away before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    entries: Vec<PolicyEntry>,
    exempt: Vec<String>,
    /// Where signed-in non-admins are sent from admin-only prefixes.
    customer_sign_in: String,
}

impl Default for RoutePolicy {
    /// The storefront table.
    ///
    /// | prefix | requirement | guests go to |
    /// |---|---|---|
    /// | `/admin` | admin | `/admin/login` |
    /// | `/dashboard` | signed in | `/account/signin` |
    /// | `/account` | signed in | `/account/signin` |
    ///
    /// `/admin/login`, `/account/signin` and `/account/signup` are exempt.
    fn default() -> Self {
        Self::new(
            vec![
                PolicyEntry::new("/admin", Requirement::Admin, "/admin/login"),
                PolicyEntry::new("/dashboard", Requirement::SignedIn, "/account/signin"),
                PolicyEntry::new("/account", Requirement::SignedIn, "/account/signin"),
            ],
            vec![
                "/admin/login".to_string(),
                "/account/signin".to_string(),
                "/account/signup".to_string(),
            ],
            "/account/signin",
        )
    }
}

impl RoutePolicy {
    /// Build a table. Entries are tried in order; the first match wins.
    pub fn new(
        entries: Vec<PolicyEntry>,
        exempt: Vec<String>,
        customer_sign_in: impl Into<String>,
    ) -> Self {
        Self {
            entries,
            exempt,
            customer_sign_in: customer_sign_in.into(),
        }
    }

    /// Decide whether `actor` may open `path`.
    #[must_use]
    pub fn decide(&self, path: &str, actor: &Actor) -> Decision {
        self.decide_for(path, actor.kind())
    }

    /// Decide for an actor kind.
    #[must_use]
    pub fn decide_for(&self, path: &str, kind: ActorKind) -> Decision {
        let Some(entry) = self.entry_for(path) else {
            return Decision::Allow;
        };

        match (entry.requirement, kind) {
            (_, ActorKind::Guest) => Decision::redirect(&entry.sign_in, RedirectReason::NotLoggedIn),
            (Requirement::Admin, ActorKind::Customer) => {
                Decision::redirect(&self.customer_sign_in, RedirectReason::NotAdmin)
            }
            (Requirement::Admin, ActorKind::Admin)
            | (Requirement::SignedIn, ActorKind::Customer | ActorKind::Admin) => Decision::Allow,
        }
    }

    /// The entry protecting `path`, or `None` if it is public or exempt.
    #[must_use]
    pub fn entry_for(&self, path: &str) -> Option<&PolicyEntry> {
        let segments = segments(path);
        if self
            .exempt
            .iter()
            .any(|prefix| starts_with_segments(&segments, prefix))
        {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| starts_with_segments(&segments, &entry.prefix))
    }
}

/// Path segments with query, fragment, empty and dot segments resolved.
fn segments(path: &str) -> Vec<&str> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let mut out = Vec::new();
    for segment in path.get(..end).unwrap_or(path).split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out
}

fn starts_with_segments(path: &[&str], prefix: &str) -> bool {
    let prefix = segments(prefix);
    path.starts_with(&prefix)
}
