//! The cart value and its reducer.
//!
//! A [`Cart`] is an immutable value. Every change is expressed as a
//! [`CartAction`] and applied with [`Cart::reduce`], which returns the next
//! cart or a [`ValidationError`] without touching the current one. Totals and
//! counts are recomputed from the lines on every read.

mod merge;

pub use merge::merge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{LineKey, Price, ProductId, Quantity, Variant};

/// Current version of the serialized cart envelope.
pub const CART_FORMAT_VERSION: u32 = 1;

/// One line of a cart: a product, its variant, and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    line_key: LineKey,
    product_id: ProductId,
    #[serde(default)]
    variant: Variant,
    quantity: Quantity,
    unit_price: Price,
    added_at: DateTime<Utc>,
}

impl CartLine {
    /// Create a line, deriving its key from the product and variant.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        variant: Variant,
        quantity: Quantity,
        unit_price: Price,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            line_key: LineKey::derive(&product_id, &variant),
            product_id,
            variant,
            quantity,
            unit_price,
            added_at,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &LineKey {
        &self.line_key
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    #[must_use]
    pub const fn variant(&self) -> &Variant {
        &self.variant
    }

    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Unit price captured when the line was added.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        self.unit_price
    }

    /// When the unit price was captured.
    #[must_use]
    pub const fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// A change to a [`Cart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Add `quantity` of a product variant, aggregating into an existing line.
    Add {
        product_id: ProductId,
        variant: Variant,
        quantity: i64,
        unit_price: Price,
        at: DateTime<Utc>,
    },
    /// Set a line's quantity; zero or less removes the line.
    Update { key: LineKey, quantity: i64 },
    /// Remove a line if present.
    Remove { key: LineKey },
    /// Remove every line.
    Clear,
    /// Swap in a whole cart loaded from storage or the server.
    Replace(Cart),
}

/// An ordered collection of lines, unique by [`LineKey`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "CartEnvelope", into = "CartEnvelope")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from lines that may repeat a key.
    ///
    /// Repeated keys are aggregated into the first occurrence, clamping at
    /// [`Quantity::MAX`]; used for carts coming back from the server.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::default();
        for line in lines {
            match cart.position(&line.line_key) {
                Some(i) => {
                    if let Some(existing) = cart.lines.get_mut(i) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => cart.lines.push(line),
            }
        }
        cart
    }

    /// Apply an action, returning the next cart.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the action's input is invalid or an
    /// aggregated quantity would exceed [`Quantity::MAX`]. `self` is never
    /// modified.
    pub fn reduce(&self, action: CartAction) -> Result<Self, ValidationError> {
        match action {
            CartAction::Add {
                product_id,
                variant,
                quantity,
                unit_price,
                at,
            } => {
                let quantity = Quantity::from_requested(quantity)?;
                let line = CartLine::new(product_id, variant, quantity, unit_price, at);
                self.add(line)
            }
            CartAction::Update { key, quantity } if quantity <= 0 => Ok(self.without(&key)),
            CartAction::Update { key, quantity } => {
                let quantity = Quantity::from_requested(quantity)?;
                let mut next = self.clone();
                if let Some(line) = next.lines.iter_mut().find(|l| l.line_key == key) {
                    line.quantity = quantity;
                }
                Ok(next)
            }
            CartAction::Remove { key } => Ok(self.without(&key)),
            CartAction::Clear => Ok(Self::default()),
            CartAction::Replace(cart) => Ok(cart),
        }
    }

    fn add(&self, line: CartLine) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        match next.lines.iter_mut().find(|l| l.line_key == line.line_key) {
            Some(existing) => existing.quantity = existing.quantity.checked_add(line.quantity)?,
            None => next.lines.push(line),
        }
        Ok(next)
    }

    fn without(&self, key: &LineKey) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .filter(|l| &l.line_key != key)
                .cloned()
                .collect(),
        }
    }

    fn position(&self, key: &LineKey) -> Option<usize> {
        self.lines.iter().position(|l| &l.line_key == key)
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Look up a line by key.
    #[must_use]
    pub fn get(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.line_key == key)
    }

    /// Sum of unit price times quantity over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of quantities (the cart badge number).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |acc, l| acc.saturating_add(l.quantity.get()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The quantity this cart holds beyond `baseline`, line by line.
    ///
    /// Lines whose quantity does not exceed the baseline's are dropped; lines
    /// the baseline lacks are kept whole.
    #[must_use]
    pub fn subtract(&self, baseline: &Self) -> Self {
        let lines = self
            .lines
            .iter()
            .filter_map(|line| {
                let Some(base) = baseline.get(&line.line_key) else {
                    return Some(line.clone());
                };
                let extra = line.quantity.get().checked_sub(base.quantity.get())?;
                let quantity = Quantity::new(extra).ok()?;
                Some(CartLine {
                    quantity,
                    ..line.clone()
                })
            })
            .collect();
        Self { lines }
    }
}

/// Serialized form of a cart (the guest snapshot format).
#[derive(Serialize, Deserialize)]
struct CartEnvelope {
    #[serde(default = "default_version")]
    version: u32,
    lines: Vec<CartLine>,
}

const fn default_version() -> u32 {
    CART_FORMAT_VERSION
}

impl TryFrom<CartEnvelope> for Cart {
    type Error = ValidationError;

    fn try_from(envelope: CartEnvelope) -> Result<Self, Self::Error> {
        let mut cart = Self::default();
        for line in envelope.lines {
            if LineKey::derive(&line.product_id, &line.variant) != line.line_key {
                return Err(ValidationError::KeyMismatch {
                    key: line.line_key.into(),
                });
            }
            if cart.position(&line.line_key).is_some() {
                return Err(ValidationError::DuplicateLine(line.line_key.into()));
            }
            cart.lines.push(line);
        }
        Ok(cart)
    }
}

impl From<Cart> for CartEnvelope {
    fn from(cart: Cart) -> Self {
        Self {
            version: CART_FORMAT_VERSION,
            lines: cart.lines,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn add(product: &str, size: Option<&str>, quantity: i64, price: u32) -> CartAction {
        CartAction::Add {
            product_id: ProductId::parse(product).unwrap(),
            variant: Variant::new(size, None).unwrap(),
            quantity,
            unit_price: Price::whole(price),
            at: at(),
        }
    }

    fn key(product: &str, size: Option<&str>) -> LineKey {
        LineKey::derive(
            &ProductId::parse(product).unwrap(),
            &Variant::new(size, None).unwrap(),
        )
    }

    #[test]
    fn test_subtract_keeps_only_the_excess() {
        let baseline = Cart::default()
            .reduce(add("A", None, 2, 1000))
            .unwrap()
            .reduce(add("B", None, 1, 500))
            .unwrap();
        let current = baseline
            .reduce(add("A", None, 3, 1000))
            .unwrap()
            .reduce(add("C", None, 1, 700))
            .unwrap()
            .reduce(CartAction::Update {
                key: key("B", None),
                quantity: 1,
            })
            .unwrap();

        let extra = current.subtract(&baseline);
        assert_eq!(extra.count(), 2);
        assert_eq!(extra.get(&key("A", None)).unwrap().quantity().get(), 3);
        assert_eq!(extra.get(&key("C", None)).unwrap().quantity().get(), 1);
        assert!(extra.get(&key("B", None)).is_none());
        assert!(baseline.subtract(&current).is_empty());
    }

    #[test]
    fn test_same_variant_aggregates() {
        let cart = Cart::default()
            .reduce(add("A", Some("M"), 1, 1000))
            .unwrap()
            .reduce(add("A", Some("M"), 1, 1000))
            .unwrap();

        assert_eq!(cart.count(), 1);
        assert_eq!(cart.lines()[0].quantity().get(), 2);
        assert_eq!(cart.total(), Price::whole(2000));
    }

    #[test]
    fn test_quantities_sum_across_many_adds() {
        let cart = [3, 1, 4, 1, 5]
            .into_iter()
            .fold(Cart::default(), |cart, q| {
                cart.reduce(add("A", None, q, 10)).unwrap()
            });
        assert_eq!(cart.count(), 1);
        assert_eq!(cart.item_count(), 14);
    }

    #[test]
    fn test_different_variant_gets_its_own_line() {
        let cart = Cart::default()
            .reduce(add("A", Some("M"), 1, 1000))
            .unwrap()
            .reduce(add("A", Some("L"), 1, 1000))
            .unwrap();

        assert_eq!(cart.count(), 2);
        assert_eq!(cart.lines()[0].key(), &key("A", Some("M")));
        assert_eq!(cart.lines()[1].key(), &key("A", Some("L")));
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let cart = Cart::default().reduce(add("A", None, 1, 5)).unwrap();
        assert_eq!(
            cart.reduce(add("A", None, 0, 5)),
            Err(ValidationError::QuantityTooSmall(0))
        );
        assert_eq!(
            cart.reduce(add("B", None, -2, 5)),
            Err(ValidationError::QuantityTooSmall(-2))
        );
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_aggregation_past_the_bound_is_rejected() {
        let cart = Cart::default()
            .reduce(add("A", None, i64::from(Quantity::MAX), 1))
            .unwrap();
        assert!(matches!(
            cart.reduce(add("A", None, 1, 1)),
            Err(ValidationError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_update_to_zero_removes_line() {
        let cart = Cart::default()
            .reduce(add("A", Some("M"), 1, 1000))
            .unwrap()
            .reduce(add("B", None, 1, 500))
            .unwrap();

        let next = cart
            .reduce(CartAction::Update {
                key: key("A", Some("M")),
                quantity: 0,
            })
            .unwrap();

        assert_eq!(next.count(), cart.count() - 1);
        assert!(next.get(&key("A", Some("M"))).is_none());
    }

    #[test]
    fn test_update_sets_quantity_directly() {
        let cart = Cart::default()
            .reduce(add("A", None, 5, 2))
            .unwrap()
            .reduce(CartAction::Update {
                key: key("A", None),
                quantity: 2,
            })
            .unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.total(), Price::whole(4));
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let cart = Cart::default().reduce(add("A", None, 1, 1)).unwrap();
        let next = cart
            .reduce(CartAction::Remove {
                key: key("Z", None),
            })
            .unwrap();
        assert_eq!(next, cart);
    }

    #[test]
    fn test_clear_and_replace() {
        let cart = Cart::default().reduce(add("A", None, 1, 1)).unwrap();
        assert!(cart.reduce(CartAction::Clear).unwrap().is_empty());

        let other = Cart::default().reduce(add("B", None, 2, 1)).unwrap();
        assert_eq!(cart.reduce(CartAction::Replace(other.clone())).unwrap(), other);
    }

    #[test]
    fn test_from_lines_aggregates_duplicates() {
        let line = |q| {
            CartLine::new(
                ProductId::parse("A").unwrap(),
                Variant::none(),
                Quantity::new(q).unwrap(),
                Price::whole(1),
                at(),
            )
        };
        let cart = Cart::from_lines([line(2), line(3)]);
        assert_eq!(cart.count(), 1);
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn test_deserialize_rejects_tampered_key() {
        let cart = Cart::default().reduce(add("A", Some("M"), 1, 1)).unwrap();
        let mut json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["version"], CART_FORMAT_VERSION);
        json["lines"][0]["lineKey"] = "A|L|".into();

        let err = serde_json::from_value::<Cart>(json).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
