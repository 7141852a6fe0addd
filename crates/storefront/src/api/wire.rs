//! JSON shapes of the session and cart services.

use chrono::{DateTime, Utc};
use fads_core::{
    AccountKind, Actor, Cart, CartLine, Email, LineKey, Price, ProductId, Quantity, UserId, Variant,
};
use serde::{Deserialize, Serialize};

use super::ApiError;

/// An identifier the backend may send as a string or a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Account role as reported by the session service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Customer,
    Admin,
}

impl From<Role> for AccountKind {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Admin => Self::Admin,
        }
    }
}

/// The `user` object of `/auth/me`, `/admin/me` and the login endpoints.
#[derive(Debug, Deserialize)]
pub struct SessionUser {
    id: WireId,
    email: String,
    #[serde(default)]
    role: Option<Role>,
}

impl SessionUser {
    /// Convert to an [`Actor`]. A missing role falls back to the account kind
    /// of the endpoint that answered.
    pub(crate) fn into_actor(self, scope: AccountKind) -> Result<Actor, ApiError> {
        let id = UserId::parse(self.id.into_string())
            .map_err(|e| ApiError::Decode(format!("user id: {e}")))?;
        let email =
            Email::parse(&self.email).map_err(|e| ApiError::Decode(format!("user email: {e}")))?;
        let kind = self.role.map_or(scope, AccountKind::from);
        Ok(Actor::authenticated(kind, id, email))
    }
}

/// Body of a session check: the bare user object or `{user}`.
///
/// `Bare` is tried first: every field of `Wrapped` is optional, so it would
/// match a bare user too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionPayload {
    Bare(SessionUser),
    Wrapped { user: Option<SessionUser> },
}

impl SessionPayload {
    pub(crate) fn into_actor(self, scope: AccountKind) -> Result<Actor, ApiError> {
        match self {
            Self::Wrapped { user: None } => Ok(Actor::Guest),
            Self::Bare(user) | Self::Wrapped { user: Some(user) } => user.into_actor(scope),
        }
    }
}

/// Error body: `{error}` or `{message}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn reason(self) -> Option<String> {
        self.error
            .or(self.message)
            .filter(|reason| !reason.trim().is_empty())
    }
}

/// One line of `GET /cart`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteLine {
    product_id: WireId,
    #[serde(default)]
    variant: Variant,
    quantity: u32,
    unit_price: Price,
    #[serde(default)]
    added_at: Option<DateTime<Utc>>,
}

/// Body of `GET /cart`: `{data: [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CartPayload {
    Wrapped { data: Vec<RemoteLine> },
    Bare(Vec<RemoteLine>),
}

impl CartPayload {
    /// Convert to a [`Cart`].
    ///
    /// Lines with quantity zero are skipped; a line without `addedAt` is
    /// treated as the oldest possible snapshot.
    pub(crate) fn into_cart(self) -> Result<Cart, ApiError> {
        let (Self::Wrapped { data: lines } | Self::Bare(lines)) = self;
        let mut converted = Vec::with_capacity(lines.len());
        for line in lines.into_iter().filter(|l| l.quantity > 0) {
            let product_id = ProductId::parse(line.product_id.into_string())
                .map_err(|e| ApiError::Decode(format!("cart line: {e}")))?;
            let quantity =
                Quantity::new(line.quantity).map_err(|e| ApiError::Decode(format!("cart line: {e}")))?;
            converted.push(CartLine::new(
                product_id,
                line.variant,
                quantity,
                line.unit_price,
                line.added_at.unwrap_or(DateTime::UNIX_EPOCH),
            ));
        }
        Ok(Cart::from_lines(converted))
    }
}

/// Body of `POST /cart`. A quantity of zero deletes the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUpsert {
    pub product_id: ProductId,
    pub variant: Variant,
    pub quantity: u32,
    pub unit_price: Price,
    pub added_at: DateTime<Utc>,
}

impl LineUpsert {
    /// Upsert setting the line to its current quantity.
    #[must_use]
    pub fn set(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id().clone(),
            variant: line.variant().clone(),
            quantity: line.quantity().get(),
            unit_price: line.unit_price(),
            added_at: line.added_at(),
        }
    }

    /// Key of the line this upsert writes.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::derive(&self.product_id, &self.variant)
    }

    /// Upsert deleting the line.
    #[must_use]
    pub fn delete(line: &CartLine) -> Self {
        Self {
            quantity: 0,
            ..Self::set(line)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fads_core::ActorKind;
    use serde_json::json;

    use super::*;

    fn session(value: serde_json::Value, scope: AccountKind) -> Result<Actor, ApiError> {
        serde_json::from_value::<SessionPayload>(value)
            .unwrap()
            .into_actor(scope)
    }

    #[test]
    fn test_role_decides_actor_kind() {
        let admin = session(
            json!({"user": {"id": 7, "email": "ops@fads.shop", "role": "admin"}}),
            AccountKind::Customer,
        )
        .unwrap();
        assert_eq!(admin.kind(), ActorKind::Admin);
        assert_eq!(admin.id().unwrap().as_str(), "7");

        let customer = session(
            json!({"user": {"id": "u1", "email": "ada@fads.shop", "role": "user"}}),
            AccountKind::Customer,
        )
        .unwrap();
        assert_eq!(customer.kind(), ActorKind::Customer);
    }

    #[test]
    fn test_missing_role_uses_scope() {
        let actor = session(
            json!({"id": "u1", "email": "ops@fads.shop"}),
            AccountKind::Admin,
        )
        .unwrap();
        assert_eq!(actor.kind(), ActorKind::Admin);
    }

    #[test]
    fn test_null_user_is_guest() {
        assert_eq!(
            session(json!({"user": null}), AccountKind::Customer).unwrap(),
            Actor::Guest
        );
    }

    #[test]
    fn test_unknown_role_is_malformed() {
        assert!(serde_json::from_value::<SessionPayload>(json!({
            "user": {"id": 1, "email": "x@fads.shop", "role": "superuser"}
        }))
        .is_err());
    }

    #[test]
    fn test_bad_email_is_decode_error() {
        let err = session(
            json!({"user": {"id": 1, "email": "nope"}}),
            AccountKind::Customer,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_cart_payload_shapes() {
        let line = json!({
            "productId": "A",
            "variant": {"size": "M"},
            "quantity": 2,
            "unitPrice": "10.00"
        });
        for body in [json!({"data": [line.clone()]}), json!([line])] {
            let cart = serde_json::from_value::<CartPayload>(body)
                .unwrap()
                .into_cart()
                .unwrap();
            assert_eq!(cart.item_count(), 2);
            assert_eq!(cart.lines()[0].key().as_str(), "A|M|");
            assert_eq!(cart.lines()[0].added_at(), DateTime::UNIX_EPOCH);
        }
    }

    #[test]
    fn test_cart_payload_skips_zero_quantity() {
        let cart = serde_json::from_value::<CartPayload>(json!([
            {"productId": 12, "quantity": 0, "unitPrice": "1"},
            {"productId": 13, "quantity": 1, "unitPrice": "1"}
        ]))
        .unwrap()
        .into_cart()
        .unwrap();
        assert_eq!(cart.count(), 1);
        assert_eq!(cart.lines()[0].product_id().as_str(), "13");
    }

    #[test]
    fn test_error_body_reason() {
        let body: ErrorBody = serde_json::from_value(json!({"error": "Invalid credentials"})).unwrap();
        assert_eq!(body.reason().as_deref(), Some("Invalid credentials"));
        let body: ErrorBody = serde_json::from_value(json!({"message": " "})).unwrap();
        assert_eq!(body.reason(), None);
    }

    #[test]
    fn test_upsert_body() {
        let line = CartLine::new(
            ProductId::parse("A").unwrap(),
            Variant::new(Some("M"), None).unwrap(),
            Quantity::new(3).unwrap(),
            Price::whole(10),
            DateTime::UNIX_EPOCH,
        );
        let body = serde_json::to_value(LineUpsert::delete(&line)).unwrap();
        assert_eq!(body["productId"], "A");
        assert_eq!(body["variant"]["size"], "M");
        assert_eq!(body["quantity"], 0);
    }
}
