//! Background persistence of cart changes.
//!
//! The persister watches the cart and the session:
//!
//! - As a guest, every mutation is written to the `guest_cart` snapshot.
//! - When signed in, mutations are debounced, diffed against what the server
//!   is known to hold, and written as one upsert per changed line. Failures
//!   retry with capped exponential backoff and jitter; once the attempt
//!   budget is spent the status turns `Degraded` until the next mutation.
//!
//! While a session transition holds the store ([`super::CartStore::hold_sync`])
//! nothing is written to the server; held-back changes are written once the
//! hold is released.
//!
//! A single task does all of this, so at most one write is in flight.

use std::sync::Arc;
use std::time::Duration;

use fads_core::Cart;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{CartSnapshot, CartStore, ChangeOrigin};
use crate::api::{ApiError, CartApi, LineUpsert};
use crate::config::SyncConfig;
use crate::error::StorefrontError;
use crate::events::{EventBus, StorefrontEvent};
use crate::session::Session;
use crate::storage::GuestCartRepository;

/// Remote sync state of the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing waiting to be written.
    Idle,
    /// Changes are waiting for the debounce window or being written.
    Pending,
    /// Writes failed; the cart is local-only and sync is pending.
    Degraded,
}

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base` up to `max`, then picks uniformly from the upper half
/// so clients that failed together do not retry together.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1_u32 << attempt.saturating_sub(1).min(16);
    let capped = base.saturating_mul(factor).min(max);
    let ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(ms / 2..=ms))
}

/// Upserts that turn `synced` into `current`.
pub(crate) fn diff(synced: &Cart, current: &Cart) -> Vec<LineUpsert> {
    let mut writes: Vec<LineUpsert> = current
        .lines()
        .iter()
        .filter(|line| synced.get(line.key()) != Some(*line))
        .map(LineUpsert::set)
        .collect();
    writes.extend(
        synced
            .lines()
            .iter()
            .filter(|line| current.get(line.key()).is_none())
            .map(LineUpsert::delete),
    );
    writes
}

/// Handle to a running persister. Dropping it stops the task.
#[derive(Debug)]
pub struct PersisterHandle {
    task: JoinHandle<()>,
    status: watch::Receiver<SyncStatus>,
    synced: watch::Receiver<Cart>,
}

impl PersisterHandle {
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// The cart the server is known to hold while signed in.
    #[must_use]
    pub fn subscribe_synced(&self) -> watch::Receiver<Cart> {
        self.synced.clone()
    }
}

impl Drop for PersisterHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The persistence subscriber of a [`super::CartStore`].
pub struct CartPersister<A> {
    api: Arc<A>,
    guest: GuestCartRepository,
    cart: watch::Receiver<CartSnapshot>,
    session: watch::Receiver<Session>,
    status: watch::Sender<SyncStatus>,
    events: EventBus,
    settings: SyncConfig,
    /// What the server is known to hold.
    synced: watch::Sender<Cart>,
    hold: watch::Receiver<bool>,
    /// Changes arrived while the store was held.
    held_back: bool,
    /// The pending difference completes a login merge.
    settles_guest: bool,
}

impl<A: CartApi> CartPersister<A> {
    /// Start persisting changes published by `store`.
    ///
    /// The cart value at spawn time is taken as already persisted.
    pub fn spawn(
        api: Arc<A>,
        guest: GuestCartRepository,
        store: &CartStore,
        session: watch::Receiver<Session>,
        events: EventBus,
        settings: SyncConfig,
    ) -> PersisterHandle {
        let mut cart = store.subscribe();
        let (synced, synced_rx) = watch::channel(cart.borrow_and_update().cart.clone());
        let (status, status_rx) = watch::channel(SyncStatus::Idle);
        let persister = Self {
            api,
            guest,
            cart,
            session,
            status,
            events,
            settings,
            synced,
            hold: store.subscribe_hold(),
            held_back: false,
            settles_guest: false,
        };
        PersisterHandle {
            task: tokio::spawn(persister.run()),
            status: status_rx,
            synced: synced_rx,
        }
    }

    async fn run(mut self) {
        loop {
            let dirty = tokio::select! {
                changed = self.cart.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.observe()
                }
                changed = self.hold.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.released()
                }
            };
            if !dirty {
                continue;
            }
            if *self.hold.borrow() {
                self.held_back = true;
                continue;
            }
            if !self.session.borrow().actor.is_authenticated() {
                self.write_guest();
                continue;
            }
            self.status.send_replace(SyncStatus::Pending);
            if !self.debounce().await {
                break;
            }
            self.flush().await;
        }
        tracing::debug!("Cart persister stopped");
    }

    /// Take the latest snapshot. Returns whether it carries unsaved changes.
    fn observe(&mut self) -> bool {
        let snapshot = self.cart.borrow_and_update();
        match &snapshot.origin {
            ChangeOrigin::Mutation => true,
            ChangeOrigin::Load => {
                self.synced.send_replace(snapshot.cart.clone());
                self.status.send_replace(SyncStatus::Idle);
                self.settles_guest = false;
                false
            }
            ChangeOrigin::Diverged {
                remote,
                settles_guest,
            } => {
                self.synced.send_replace(remote.clone());
                self.settles_guest = *settles_guest;
                true
            }
        }
    }

    /// React to a hold change. Returns whether changes held back while the
    /// store was held are now waiting to be written.
    fn released(&mut self) -> bool {
        if *self.hold.borrow_and_update() {
            return false;
        }
        if self.cart.has_changed().unwrap_or(false) && self.observe() {
            self.held_back = true;
        }
        std::mem::take(&mut self.held_back)
    }

    /// Wait until the cart has been quiet for the debounce window.
    /// Returns `false` if the store is gone.
    async fn debounce(&mut self) -> bool {
        loop {
            tokio::select! {
                changed = self.cart.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    self.observe();
                }
                changed = self.hold.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if *self.hold.borrow_and_update() {
                        // Written after the hold is released.
                        self.held_back = true;
                        return true;
                    }
                }
                () = tokio::time::sleep(self.settings.debounce) => return true,
            }
        }
    }

    async fn flush(&mut self) {
        let epoch = self.session.borrow().epoch;
        let mut attempt = 0;

        loop {
            {
                let session = self.session.borrow();
                if session.epoch != epoch || !session.actor.is_authenticated() {
                    // The transition's cart sync owns the cart now.
                    self.status.send_replace(SyncStatus::Idle);
                    return;
                }
            }
            if *self.hold.borrow() {
                self.held_back = true;
                return;
            }

            let target = self.cart.borrow().cart.clone();
            let writes = diff(&self.synced.borrow(), &target);
            if writes.is_empty() {
                self.status.send_replace(SyncStatus::Idle);
                return;
            }

            attempt += 1;
            match self.push(&writes).await {
                Ok(()) => {
                    tracing::info!(writes = writes.len(), attempt, "Cart synced");
                    self.synced.send_replace(target);
                    self.status.send_replace(SyncStatus::Idle);
                    if std::mem::take(&mut self.settles_guest) {
                        self.settle_guest();
                    }
                    self.events.emit(StorefrontEvent::CartSynced {
                        writes: writes.len(),
                    });
                    return;
                }
                Err(ApiError::Unauthorized { reason }) => {
                    tracing::warn!(epoch, reason = %reason, "Cart write unauthorized");
                    self.status.send_replace(SyncStatus::Degraded);
                    self.events.emit(StorefrontEvent::SessionExpired { epoch });
                    return;
                }
                Err(error) => {
                    let degraded =
                        !error.is_retryable() || attempt >= self.settings.max_attempts;
                    tracing::warn!(error = %error, attempt, degraded, "Cart write failed");
                    self.events.emit(StorefrontEvent::CartSyncFailed {
                        error: error.clone(),
                        attempt,
                        degraded,
                    });
                    if degraded {
                        self.status.send_replace(SyncStatus::Degraded);
                        StorefrontError::Network(error).report();
                        return;
                    }
                    let delay = backoff_delay(
                        attempt,
                        self.settings.backoff_base,
                        self.settings.backoff_max,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Send every write in order. Upserts are absolute, so a partially
    /// applied batch is safe to resend.
    async fn push(&self, writes: &[LineUpsert]) -> Result<(), ApiError> {
        for write in writes {
            self.api.upsert_line(write).await?;
        }
        Ok(())
    }

    /// The merged guest lines are on the server; drop the snapshot.
    fn settle_guest(&self) {
        match self.guest.clear() {
            Ok(()) => tracing::debug!("Guest snapshot settled"),
            Err(e) => {
                self.events.emit(StorefrontEvent::GuestSnapshotFailed {
                    reason: e.to_string(),
                });
                StorefrontError::Storage(e).report();
            }
        }
    }

    fn write_guest(&self) {
        let cart = self.cart.borrow().cart.clone();
        match self.guest.save(&cart) {
            Ok(()) => tracing::debug!(lines = cart.count(), "Guest cart saved"),
            Err(e) => {
                self.events.emit(StorefrontEvent::GuestSnapshotFailed {
                    reason: e.to_string(),
                });
                StorefrontError::Storage(e).report();
            }
        }
    }
}
