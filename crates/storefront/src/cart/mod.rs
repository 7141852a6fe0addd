//! The in-memory cart.
//!
//! [`CartStore`] owns the current [`Cart`] and applies every change through
//! [`Cart::reduce`]. Successful changes are published as a [`CartSnapshot`]
//! on a `watch` channel; persistence is a separate subscriber
//! ([`CartPersister`]) so the store itself never does I/O.

mod persist;

pub use persist::{CartPersister, PersisterHandle, SyncStatus, backoff_delay};
pub(crate) use persist::diff;

use std::sync::Arc;

use chrono::Utc;
use fads_core::{Cart, CartAction, LineKey, Price, ProductId, ValidationError, Variant, merge};
use tokio::sync::watch;

/// Why the cart changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A shopper action; persisted for the current actor.
    Mutation,
    /// Loaded from storage or the server; already persisted.
    Load,
    /// Installed locally while the server still holds `remote`; the
    /// difference is pending. With `settles_guest`, the guest snapshot is
    /// dropped once the difference is written.
    Diverged { remote: Cart, settles_guest: bool },
}

/// A published cart value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub cart: Cart,
    /// Increments on every published change.
    pub revision: u64,
    pub origin: ChangeOrigin,
}

/// Reducer-driven cart. Clones share the same cart.
#[derive(Debug, Clone)]
pub struct CartStore {
    state: Arc<watch::Sender<CartSnapshot>>,
    /// Set while a session transition rebuilds the cart.
    hold: Arc<watch::Sender<bool>>,
}

/// Keeps remote writes back until dropped.
#[derive(Debug)]
pub struct SyncHold {
    hold: Arc<watch::Sender<bool>>,
}

impl Drop for SyncHold {
    fn drop(&mut self) {
        self.hold.send_replace(false);
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(CartSnapshot {
            cart: Cart::default(),
            revision: 0,
            origin: ChangeOrigin::Load,
        });
        let (hold, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            hold: Arc::new(hold),
        }
    }

    /// Apply an action and publish the result.
    ///
    /// A mutation that leaves the cart unchanged publishes nothing. Loads are
    /// always published so the persister can rebase on them.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the reducer rejects the action; nothing
    /// is published and the cart is unchanged.
    pub fn dispatch(&self, action: CartAction) -> Result<(), ValidationError> {
        let origin = match action {
            CartAction::Replace(_) => ChangeOrigin::Load,
            _ => ChangeOrigin::Mutation,
        };
        self.apply(action, origin)
    }

    fn apply(&self, action: CartAction, origin: ChangeOrigin) -> Result<(), ValidationError> {
        let mut result = Ok(());
        self.state.send_if_modified(|snapshot| match snapshot.cart.reduce(action) {
            Ok(next) if next == snapshot.cart && origin == ChangeOrigin::Mutation => false,
            Ok(next) => {
                snapshot.cart = next;
                snapshot.revision += 1;
                snapshot.origin = origin;
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }

    /// Add `quantity` of a product variant, returning the line's key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank product id, `quantity < 1`, or
    /// an aggregated quantity above the per-line bound.
    pub fn add_line(
        &self,
        product_id: &str,
        variant: Variant,
        quantity: i64,
        unit_price: Price,
    ) -> Result<LineKey, ValidationError> {
        let product_id = ProductId::parse(product_id)?;
        let key = LineKey::derive(&product_id, &variant);
        self.dispatch(CartAction::Add {
            product_id,
            variant,
            quantity,
            unit_price,
            at: Utc::now(),
        })?;
        tracing::debug!(line_key = %key, quantity, "Cart line added");
        Ok(key)
    }

    /// Set a line's quantity; `quantity <= 0` removes it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if `quantity` exceeds the per-line bound.
    pub fn update_quantity(&self, key: &LineKey, quantity: i64) -> Result<(), ValidationError> {
        self.dispatch(CartAction::Update {
            key: key.clone(),
            quantity,
        })
    }

    /// Remove a line; absent keys are ignored.
    pub fn remove_line(&self, key: &LineKey) {
        if let Err(e) = self.dispatch(CartAction::Remove { key: key.clone() }) {
            tracing::error!(line_key = %key, error = %e, "Cart line removal rejected");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.dispatch(CartAction::Clear) {
            tracing::error!(error = %e, "Cart clear rejected");
        }
    }

    /// Replace the cart with one that is already persisted.
    pub fn install(&self, cart: Cart) {
        self.publish(cart, ChangeOrigin::Load);
    }

    /// Replace the cart while the server still holds `remote`.
    pub fn install_diverged(&self, cart: Cart, remote: Cart) {
        self.publish(
            cart,
            ChangeOrigin::Diverged {
                remote,
                settles_guest: false,
            },
        );
    }

    /// Replace the cart with `cart`, keeping what was added since the cart
    /// read `before`. Returns those late additions.
    ///
    /// The result is a load if nothing was added and `cart` is what the
    /// server holds, otherwise it diverges from `remote`. Lines removed or
    /// lowered since `before` are not carried over.
    pub(crate) fn rebase(&self, before: &Cart, cart: Cart, remote: Cart, settles_guest: bool) -> Cart {
        let mut late = Cart::default();
        self.state.send_modify(|snapshot| {
            late = snapshot.cart.subtract(before);
            let next = if late.is_empty() { cart } else { merge(&cart, &late) };
            snapshot.origin = if late.is_empty() && next == remote {
                ChangeOrigin::Load
            } else {
                ChangeOrigin::Diverged {
                    remote,
                    settles_guest,
                }
            };
            snapshot.cart = next;
            snapshot.revision += 1;
        });
        late
    }

    fn publish(&self, cart: Cart, origin: ChangeOrigin) {
        self.state.send_modify(|snapshot| {
            snapshot.cart = cart;
            snapshot.revision += 1;
            snapshot.origin = origin;
        });
    }

    /// Hold remote writes back until the returned guard drops. Mutations
    /// made meanwhile stay in the cart and are written after release.
    #[must_use]
    pub fn hold_sync(&self) -> SyncHold {
        self.hold.send_replace(true);
        SyncHold {
            hold: Arc::clone(&self.hold),
        }
    }

    #[must_use]
    pub fn subscribe_hold(&self) -> watch::Receiver<bool> {
        self.hold.subscribe()
    }

    /// Empty the cart without persisting anything.
    pub fn reset(&self) {
        self.install(Cart::default());
    }

    /// The current cart value.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.state.borrow().cart.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn total(&self) -> Price {
        self.state.borrow().cart.total()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.borrow().cart.count()
    }

    /// Summed quantity.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.state.borrow().cart.item_count()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.state.subscribe()
    }
}
