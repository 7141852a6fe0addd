//! Guest/remote cart reconciliation at session boundaries.
//!
//! | transition | action |
//! |---|---|
//! | guest → customer/admin | merge the guest snapshot into the remote cart |
//! | customer/admin → guest | keep the cart locally as the guest snapshot |
//! | customer ↔ admin | reload the remote cart, nothing is merged |
//!
//! Remote fetches are tagged with the session epoch they were issued in and
//! discarded if the session moved on before they resolved.

use std::sync::Arc;

use fads_core::{Actor, ActorKind, Cart, LineKey, merge};
use tokio::sync::watch;
use tracing::instrument;

use crate::api::{ApiError, CartApi};
use crate::cart::{CartSnapshot, CartStore, ChangeOrigin, diff};
use crate::error::StorefrontError;
use crate::events::{EventBus, StorefrontEvent};
use crate::session::Session;
use crate::storage::GuestCartRepository;

/// Which side of the guest/remote boundary a transition crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Signed in from a guest session.
    Login,
    /// Back to guest.
    Logout,
    /// Different signed-in account or role.
    Switch,
    /// Same actor.
    Unchanged,
}

impl Boundary {
    /// Classify a transition between two actors.
    #[must_use]
    pub fn classify(from: &Actor, to: &Actor) -> Self {
        match (from.kind(), to.kind()) {
            (ActorKind::Guest, ActorKind::Guest) => Self::Unchanged,
            (ActorKind::Guest, ActorKind::Customer | ActorKind::Admin) => Self::Login,
            (ActorKind::Customer | ActorKind::Admin, ActorKind::Guest) => Self::Logout,
            (ActorKind::Customer | ActorKind::Admin, ActorKind::Customer | ActorKind::Admin) => {
                if from == to {
                    Self::Unchanged
                } else {
                    Self::Switch
                }
            }
        }
    }
}

/// Moves the cart across session boundaries.
pub struct CartSync<A> {
    api: Arc<A>,
    cart: CartStore,
    guest: GuestCartRepository,
    session: watch::Receiver<Session>,
    /// What the server holds, as last confirmed by the persister.
    synced: watch::Receiver<Cart>,
    events: EventBus,
}

impl<A: CartApi> CartSync<A> {
    pub fn new(
        api: Arc<A>,
        cart: CartStore,
        guest: GuestCartRepository,
        session: watch::Receiver<Session>,
        synced: watch::Receiver<Cart>,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            cart,
            guest,
            session,
            synced,
            events,
        }
    }

    /// Run the step for a committed transition from `from` to the current
    /// session.
    ///
    /// # Errors
    ///
    /// See [`CartSync::on_login`], [`CartSync::on_logout`] and
    /// [`CartSync::load_remote`].
    pub async fn on_transition(&self, from: &Actor) -> Result<Boundary, StorefrontError> {
        let (to, epoch) = {
            let session = self.session.borrow();
            (session.actor.clone(), session.epoch)
        };
        let boundary = Boundary::classify(from, &to);
        match boundary {
            Boundary::Login => {
                self.capture_guest_cart()?;
                self.on_login(epoch).await?;
            }
            Boundary::Logout => self.on_logout()?,
            Boundary::Switch => self.load_remote(epoch).await?,
            Boundary::Unchanged => {}
        }
        Ok(boundary)
    }

    /// Merge the guest snapshot into the remote cart.
    ///
    /// Only what the guest added counts: lines carried over from an earlier
    /// signed-in cart are already on the server. Remote writes are held for
    /// the duration, and lines added to the cart meanwhile are kept on top of
    /// the result.
    ///
    /// On success the merged cart is installed and the guest snapshot is
    /// cleared. If the push fails part way, the lines already written are
    /// recorded as carried, the merged cart is installed, and the rest is
    /// left to the persister, which clears the snapshot once it lands.
    ///
    /// # Errors
    ///
    /// - `StaleResponse` if the session changed while the remote cart loaded
    /// - `SessionExpired` if the cart service answered 401
    /// - `Network` if the remote cart could not be loaded; the guest cart is
    ///   shown locally and its snapshot kept
    /// - `Storage` if the guest snapshot cannot be read
    #[instrument(skip(self))]
    pub async fn on_login(&self, epoch: u64) -> Result<(), StorefrontError> {
        let _hold = self.cart.hold_sync();
        let before = self.cart.cart();
        let snapshot = self.guest.load()?;
        let carried = self.guest.load_carried()?;
        let guest = snapshot.subtract(&carried);

        let remote = match self.fetch_remote(epoch).await {
            Ok(remote) => remote,
            Err(StorefrontError::Network(e)) => {
                tracing::warn!(error = %e, "Remote cart unavailable, keeping guest cart locally");
                self.cart.rebase(&before, snapshot.clone(), snapshot, false);
                return Err(StorefrontError::Network(e));
            }
            Err(e) => return Err(e),
        };

        if guest.is_empty() {
            self.cart.rebase(&before, remote.clone(), remote, false);
            self.guest.clear()?;
            return Ok(());
        }

        let merged = merge(&guest, &remote);
        let writes = diff(&remote, &merged);
        let mut written = Vec::with_capacity(writes.len());
        let mut expired = false;
        for write in &writes {
            match self.api.upsert_line(write).await {
                Ok(()) => written.push(write.key()),
                Err(ApiError::Unauthorized { .. }) => {
                    expired = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Merged cart push failed, leaving it to the persister");
                    break;
                }
            }
        }

        let pushed = written.len() == writes.len();
        if pushed {
            self.guest.clear()?;
        } else {
            self.record_written(&snapshot, &carried, &written)?;
        }
        if expired {
            return Err(StorefrontError::SessionExpired);
        }
        self.ensure_current(epoch)?;

        tracing::info!(
            guest_lines = guest.count(),
            remote_lines = remote.count(),
            merged_lines = merged.count(),
            pushed,
            "Guest cart merged"
        );
        self.events.emit(StorefrontEvent::CartMerged {
            lines: merged.count(),
            pushed,
        });

        let late = if pushed {
            self.cart.rebase(&before, merged.clone(), merged, false)
        } else {
            self.cart.rebase(&before, merged, remote, true)
        };
        if !late.is_empty() {
            tracing::debug!(lines = late.count(), "Kept cart changes made during login");
        }
        Ok(())
    }

    /// Mark the guest lines already written to the server as carried, so a
    /// later login does not add them a second time.
    fn record_written(
        &self,
        snapshot: &Cart,
        carried: &Cart,
        written: &[LineKey],
    ) -> Result<(), StorefrontError> {
        if written.is_empty() {
            return Ok(());
        }
        let lines = carried
            .lines()
            .iter()
            .filter(|line| !written.contains(line.key()))
            .chain(
                snapshot
                    .lines()
                    .iter()
                    .filter(|line| written.contains(line.key())),
            )
            .cloned();
        self.guest.save_carried(snapshot, &Cart::from_lines(lines))?;
        Ok(())
    }

    /// Save the cart as the guest snapshot and keep showing it as the guest
    /// cart, no longer backed by the server.
    ///
    /// The lines the server already holds are recorded as carried, so
    /// changes that never reached the server are merged at the next login.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the snapshot cannot be written. The cart stays in
    /// memory either way.
    pub fn on_logout(&self) -> Result<(), StorefrontError> {
        let CartSnapshot { cart, origin, .. } = self.cart.snapshot();
        let carried = match origin {
            ChangeOrigin::Load => cart.clone(),
            ChangeOrigin::Diverged { remote, .. } => remote,
            ChangeOrigin::Mutation => self.synced.borrow().clone(),
        };
        self.guest.save_carried(&cart, &carried)?;
        tracing::info!(lines = cart.count(), "Cart saved as guest snapshot");
        self.cart.install(cart);
        Ok(())
    }

    /// Write the in-memory guest cart to the snapshot so mutations the
    /// persister has not saved yet are part of the merge. A store that never
    /// held a cart (no bootstrap yet) leaves the snapshot alone.
    fn capture_guest_cart(&self) -> Result<(), StorefrontError> {
        let snapshot = self.cart.snapshot();
        if snapshot.revision > 0 {
            self.guest.save(&snapshot.cart)?;
        }
        Ok(())
    }

    /// Replace the cart with the remote one, keeping lines added while it
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns `StaleResponse`, `SessionExpired` or `Network`; the cart is
    /// unchanged in every case.
    #[instrument(skip(self))]
    pub async fn load_remote(&self, epoch: u64) -> Result<(), StorefrontError> {
        let _hold = self.cart.hold_sync();
        let before = self.cart.cart();
        let remote = self.fetch_remote(epoch).await?;
        self.cart.rebase(&before, remote.clone(), remote, false);
        Ok(())
    }

    /// Replace the cart with the guest snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the snapshot cannot be read.
    pub fn load_guest(&self) -> Result<(), StorefrontError> {
        self.cart.install(self.guest.load()?);
        Ok(())
    }

    async fn fetch_remote(&self, epoch: u64) -> Result<Cart, StorefrontError> {
        let remote = self.api.fetch_cart().await?;
        self.ensure_current(epoch)?;
        Ok(remote)
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), StorefrontError> {
        let current = self.session.borrow().epoch;
        if current == epoch {
            Ok(())
        } else {
            tracing::debug!(issued = epoch, current, "Discarding stale cart response");
            Err(StorefrontError::StaleResponse)
        }
    }
}
