//! Error and status channel.
//!
//! Components report failures and notable transitions here instead of
//! returning them to a caller that may already be gone (the cart persister
//! runs in the background). Every event is also logged where it is raised.

use fads_core::ActorKind;
use tokio::sync::broadcast;

use crate::api::ApiError;

const EVENT_CAPACITY: usize = 64;

/// Something the UI layer may want to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorefrontEvent {
    /// A session transition was committed.
    SessionChanged {
        from: ActorKind,
        to: ActorKind,
        epoch: u64,
    },
    /// An authenticated call answered 401 during `epoch`.
    SessionExpired { epoch: u64 },
    /// A remote cart write failed.
    CartSyncFailed {
        error: ApiError,
        attempt: u32,
        /// The attempt budget is spent; the cart is local-only until the next
        /// mutation.
        degraded: bool,
    },
    /// Pending cart changes reached the server.
    CartSynced { writes: usize },
    /// The guest cart snapshot could not be written.
    GuestSnapshotFailed { reason: String },
    /// A guest cart was merged into the remote cart at login.
    CartMerged { lines: usize, pushed: bool },
}

/// Broadcast sender for [`StorefrontEvent`]s. Clones share the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StorefrontEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: StorefrontEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorefrontEvent> {
        self.tx.subscribe()
    }
}
