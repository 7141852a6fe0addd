//! The process-wide storefront context.
//!
//! [`Storefront`] owns the session store, the cart store and its persister,
//! the cart sync and both route guards. Every actor transition goes through
//! it so the transition and its cart sync step run as one unit, queued
//! behind any transition already in progress.

use std::sync::{Arc, Weak};

use fads_core::{AccountKind, Actor};
use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::api::{ApiClient, CartApi, SessionApi};
use crate::cart::{CartPersister, CartStore, PersisterHandle, SyncStatus};
use crate::config::{StorefrontConfig, SyncConfig};
use crate::error::{Result, StorefrontError};
use crate::events::{EventBus, StorefrontEvent};
use crate::guard::{RouteGuard, RoutePolicy};
use crate::middleware::EdgeGuard;
use crate::session::{Session, SessionStore};
use crate::storage::{FileStore, GuestCartRepository, KeyValueStore};
use crate::sync::CartSync;

/// Tunables of a [`Storefront`] that do not depend on the backend.
#[derive(Debug, Clone)]
pub struct StorefrontOptions {
    pub sync: SyncConfig,
    pub policy: RoutePolicy,
    pub token_cookie: String,
}

impl Default for StorefrontOptions {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            policy: RoutePolicy::default(),
            token_cookie: crate::config::DEFAULT_TOKEN_COOKIE.to_string(),
        }
    }
}

impl StorefrontOptions {
    #[must_use]
    pub fn from_config(config: &StorefrontConfig) -> Self {
        Self {
            sync: config.sync,
            token_cookie: config.token_cookie.clone(),
            ..Self::default()
        }
    }
}

/// Storefront client state. Cheaply cloneable via `Arc`.
pub struct Storefront<A = ApiClient> {
    inner: Arc<StorefrontInner<A>>,
}

struct StorefrontInner<A> {
    sessions: SessionStore<A>,
    cart: CartStore,
    sync: CartSync<A>,
    guard: RouteGuard,
    edge: EdgeGuard,
    events: EventBus,
    /// Held for the duration of every actor transition and its cart sync.
    transitions: Mutex<()>,
    persister: PersisterHandle,
    expiry: JoinHandle<()>,
}

impl<A> Drop for StorefrontInner<A> {
    fn drop(&mut self) {
        self.expiry.abort();
    }
}

impl<A> Clone for Storefront<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for Storefront<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("sessions", &self.inner.sessions)
            .field("cart", &self.inner.cart)
            .finish_non_exhaustive()
    }
}

impl Storefront<ApiClient> {
    /// Build a context talking to the configured services, with the guest
    /// cart kept under `config.storage_dir`.
    ///
    /// Must be called inside a tokio runtime. The session is `Resolving`
    /// until [`Storefront::bootstrap`] runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the storage
    /// directory cannot be created.
    pub fn init(config: &StorefrontConfig) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        let store = FileStore::open(&config.storage_dir)?;
        tracing::info!(
            api_url = %config.api_url,
            storage_dir = %config.storage_dir.display(),
            "Storefront initialized"
        );
        Ok(Self::with_parts(
            Arc::new(api),
            store,
            StorefrontOptions::from_config(config),
        ))
    }
}

impl<A: SessionApi + CartApi> Storefront<A> {
    /// Build a context from its parts. Must be called inside a tokio runtime.
    pub fn with_parts(api: Arc<A>, store: impl KeyValueStore, options: StorefrontOptions) -> Self {
        let events = EventBus::new();
        let guest = GuestCartRepository::new(store);
        let sessions = SessionStore::new(Arc::clone(&api), events.clone());
        let cart = CartStore::new();
        let policy = Arc::new(options.policy);

        let persister = CartPersister::spawn(
            Arc::clone(&api),
            guest.clone(),
            &cart,
            sessions.subscribe(),
            events.clone(),
            options.sync,
        );
        let sync = CartSync::new(
            api,
            cart.clone(),
            guest,
            sessions.subscribe(),
            persister.subscribe_synced(),
            events.clone(),
        );
        let guard = RouteGuard::new(Arc::clone(&policy), sessions.subscribe());
        let edge = EdgeGuard::new(policy, options.token_cookie);

        let inner = Arc::new_cyclic(|weak: &Weak<StorefrontInner<A>>| {
            let expiry = tokio::spawn(watch_expiry(weak.clone(), events.subscribe()));
            StorefrontInner {
                sessions,
                cart,
                sync,
                guard,
                edge,
                events,
                transitions: Mutex::new(()),
                persister,
                expiry,
            }
        });
        Self { inner }
    }

    /// Resolve the actor, then load the cart it owns: the guest snapshot for
    /// a guest, the remote cart (with any guest additions merged in) when
    /// signed in.
    ///
    /// A call made while another transition runs does not resolve again; it
    /// waits for the running one and returns its actor.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Actor {
        let Ok(_transition) = self.inner.transitions.try_lock() else {
            drop(self.inner.transitions.lock().await);
            return self.inner.sessions.actor();
        };

        let actor = self.inner.sessions.bootstrap().await;
        let epoch = self.inner.sessions.epoch();
        let loaded = if actor.is_authenticated() {
            self.inner.sync.on_login(epoch).await
        } else {
            self.inner.sync.load_guest()
        };
        if let Err(e) = loaded {
            self.sync_failed(e, epoch);
        }
        actor
    }

    /// Sign in, then merge the guest cart into the account's cart.
    ///
    /// # Errors
    ///
    /// - `Auth` if the login was refused; nothing changed
    /// - `SessionExpired` if the session was rejected right after login
    ///
    /// Other cart sync failures are reported and do not fail the login.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
        kind: AccountKind,
    ) -> Result<Actor> {
        let _transition = self.inner.transitions.lock().await;
        let from = self.inner.sessions.actor();
        let actor = self.inner.sessions.login(email, password, kind).await?;
        self.sync_after(&from).await?;
        Ok(actor)
    }

    /// Sign out and keep the cart as the guest cart.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let _transition = self.inner.transitions.lock().await;
        let from = self.inner.sessions.actor();
        self.inner.sessions.logout().await;
        self.settle_transition(&from).await;
    }

    /// Drop the session locally without a network call, as after a 401.
    pub async fn expire(&self) {
        let _transition = self.inner.transitions.lock().await;
        let from = self.inner.sessions.actor();
        self.inner.sessions.expire();
        self.settle_transition(&from).await;
    }

    async fn expire_epoch(&self, epoch: u64) {
        let _transition = self.inner.transitions.lock().await;
        let from = self.inner.sessions.actor();
        if self.inner.sessions.expire_if(epoch) {
            self.settle_transition(&from).await;
        }
    }

    /// Back to the initial state: `Resolving` guest with an empty cart.
    /// Persisted guest data is kept; call [`Storefront::bootstrap`] again.
    pub async fn reset(&self) {
        let _transition = self.inner.transitions.lock().await;
        self.inner.sessions.reset();
        self.inner.cart.reset();
        tracing::info!("Storefront reset");
    }

    /// Run the cart sync step for the transition from `from`.
    async fn sync_after(&self, from: &Actor) -> Result<()> {
        let epoch = self.inner.sessions.epoch();
        match self.inner.sync.on_transition(from).await {
            Ok(boundary) => {
                tracing::debug!(?boundary, epoch, "Cart sync complete");
                Ok(())
            }
            Err(StorefrontError::SessionExpired) => {
                self.sync_failed(StorefrontError::SessionExpired, epoch);
                Err(StorefrontError::SessionExpired)
            }
            Err(e) => {
                self.sync_failed(e, epoch);
                Ok(())
            }
        }
    }

    /// Run the cart sync step for a transition that cannot fail the caller.
    async fn settle_transition(&self, from: &Actor) {
        if let Err(e) = self.sync_after(from).await {
            tracing::debug!(error = %e, "Cart sync ended the session");
        }
    }

    fn sync_failed(&self, error: StorefrontError, epoch: u64) {
        match error {
            // The cart still holds what it held before the sync; keep it.
            StorefrontError::SessionExpired => {
                self.inner.sessions.expire_if(epoch);
            }
            StorefrontError::StaleResponse => {
                tracing::debug!(epoch, "Cart sync superseded by a newer session");
            }
            other => {
                tracing::warn!(error = %other, epoch, "Cart sync failed");
                other.report();
            }
        }
    }
}

impl<A> Storefront<A> {
    #[must_use]
    pub fn sessions(&self) -> &SessionStore<A> {
        &self.inner.sessions
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard {
        &self.inner.guard
    }

    /// State for the pre-render filter.
    #[must_use]
    pub fn edge_guard(&self) -> EdgeGuard {
        self.inner.edge.clone()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StorefrontEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.persister.status()
    }

    #[must_use]
    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.persister.subscribe_status()
    }
}

impl<A: SessionApi> Storefront<A> {
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.sessions.current()
    }

    #[must_use]
    pub fn actor(&self) -> Actor {
        self.inner.sessions.actor()
    }
}

/// Turn `SessionExpired` events into a transition to `Guest`.
async fn watch_expiry<A: SessionApi + CartApi>(
    context: Weak<StorefrontInner<A>>,
    mut events: broadcast::Receiver<StorefrontEvent>,
) {
    loop {
        match events.recv().await {
            Ok(StorefrontEvent::SessionExpired { epoch }) => {
                let Some(inner) = context.upgrade() else {
                    break;
                };
                Storefront { inner }.expire_epoch(epoch).await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Expiry watcher lagged behind events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;
    use fads_core::{ActorKind, Cart, CartLine, Email, Price, ProductId, Quantity, UserId, Variant};

    use super::*;
    use crate::api::ApiError;
    use crate::session::Phase;
    use crate::storage::MemoryStore;
    use crate::testing::FakeBackend;

    fn cart(lines: &[(&str, u32)]) -> Cart {
        Cart::from_lines(lines.iter().map(|(p, q)| {
            CartLine::new(
                ProductId::parse(*p).unwrap(),
                Variant::none(),
                Quantity::new(*q).unwrap(),
                Price::whole(1000),
                DateTime::UNIX_EPOCH,
            )
        }))
    }

    fn quantities(cart: &Cart) -> Vec<(String, u32)> {
        cart.lines()
            .iter()
            .map(|l| (l.product_id().to_string(), l.quantity().get()))
            .collect()
    }

    fn storefront(backend: &FakeBackend, store: &MemoryStore) -> Storefront<FakeBackend> {
        Storefront::with_parts(
            Arc::new(backend.clone()),
            store.clone(),
            StorefrontOptions::default(),
        )
    }

    fn password() -> SecretString {
        SecretString::from("hunter22")
    }

    #[tokio::test]
    async fn test_bootstrap_as_guest_loads_snapshot() {
        let backend = FakeBackend::new();
        let store = MemoryStore::new();
        GuestCartRepository::new(store.clone())
            .save(&cart(&[("A", 2)]))
            .unwrap();

        let storefront = storefront(&backend, &store);
        assert_eq!(storefront.session().phase, Phase::Resolving);

        assert_eq!(storefront.bootstrap().await, Actor::Guest);
        assert_eq!(storefront.session().phase, Phase::Resolved);
        assert_eq!(storefront.cart().item_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_bootstraps_collapse() {
        let backend = FakeBackend::new();
        backend.set_session_delay(Duration::from_millis(50));
        let storefront = storefront(&backend, &MemoryStore::new());

        let (a, b) = tokio::join!(storefront.bootstrap(), storefront.bootstrap());
        assert_eq!(a, b);
        assert_eq!(backend.session_checks(), 1);
    }

    #[tokio::test]
    async fn test_login_merges_guest_cart() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        let store = MemoryStore::new();
        let storefront = storefront(&backend, &store);
        storefront.bootstrap().await;

        storefront
            .cart()
            .add_line("A", Variant::none(), 2, Price::whole(1000))
            .unwrap();
        GuestCartRepository::new(store.clone())
            .save(&storefront.cart().cart())
            .unwrap();
        backend.set_remote_cart(cart(&[("A", 1), ("B", 1)]));

        let actor = storefront
            .login("ada@fads.shop", password(), AccountKind::Customer)
            .await
            .unwrap();
        assert_eq!(actor.kind(), ActorKind::Customer);

        let expected = vec![("A".to_string(), 3), ("B".to_string(), 1)];
        assert_eq!(quantities(&storefront.cart().cart()), expected);
        assert_eq!(quantities(&backend.remote_cart()), expected);
        assert!(GuestCartRepository::new(store).load().unwrap().is_empty());
        assert!(storefront.guard().decide_current("/dashboard").is_allow());
    }

    #[tokio::test]
    async fn test_refused_login_changes_nothing() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        let storefront = storefront(&backend, &MemoryStore::new());
        storefront.bootstrap().await;
        storefront
            .cart()
            .add_line("A", Variant::none(), 1, Price::whole(1000))
            .unwrap();
        let epoch = storefront.session().epoch;

        let err = storefront
            .login("ada@fads.shop", SecretString::from("wrong"), AccountKind::Customer)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");
        assert_eq!(storefront.actor(), Actor::Guest);
        assert_eq!(storefront.session().epoch, epoch);
        assert_eq!(storefront.cart().item_count(), 1);
    }

    #[tokio::test]
    async fn test_logout_keeps_cart_for_guest() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        backend.set_remote_cart(cart(&[("B", 3)]));
        let store = MemoryStore::new();
        let storefront = storefront(&backend, &store);
        storefront.bootstrap().await;
        storefront
            .login("ada@fads.shop", password(), AccountKind::Customer)
            .await
            .unwrap();

        storefront.logout().await;
        assert_eq!(storefront.actor(), Actor::Guest);
        assert_eq!(backend.last_logout_scope(), Some(AccountKind::Customer));
        assert_eq!(storefront.cart().item_count(), 3);
        assert_eq!(
            GuestCartRepository::new(store).load().unwrap().item_count(),
            3
        );
        assert!(!storefront.guard().decide_current("/dashboard").is_allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_cart_write_expires_session() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        let storefront = storefront(&backend, &MemoryStore::new());
        storefront.bootstrap().await;
        storefront
            .login("ada@fads.shop", password(), AccountKind::Customer)
            .await
            .unwrap();
        let mut page = storefront.guard().watch("/account/orders");
        assert!(page.current().is_allow());

        backend.sign_out_remotely();
        storefront
            .cart()
            .add_line("A", Variant::none(), 1, Price::whole(1000))
            .unwrap();

        let decision = page.changed().await.unwrap();
        assert_eq!(
            decision.target(),
            Some("/account/signin?reason=not-logged-in")
        );
        assert_eq!(storefront.actor(), Actor::Guest);
        // The unsynced line survives as the guest cart.
        assert_eq!(storefront.cart().item_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_cart_service_does_not_fail_login() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        backend.fail_fetches(ApiError::Timeout);
        let storefront = storefront(&backend, &MemoryStore::new());
        storefront.bootstrap().await;

        let actor = storefront
            .login("ada@fads.shop", password(), AccountKind::Customer)
            .await
            .unwrap();
        assert!(actor.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_merge_push_is_not_repeated_on_next_bootstrap() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        let store = MemoryStore::new();
        GuestCartRepository::new(store.clone())
            .save(&cart(&[("A", 2)]))
            .unwrap();
        let storefront = storefront(&backend, &store);
        storefront.bootstrap().await;
        backend.fail_upserts(1, &ApiError::Timeout);

        storefront
            .login("ada@fads.shop", password(), AccountKind::Customer)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(quantities(&backend.remote_cart()), vec![("A".to_string(), 2)]);
        assert_eq!(storefront.sync_status(), SyncStatus::Idle);
        assert!(GuestCartRepository::new(store.clone()).load().unwrap().is_empty());

        storefront.reset().await;
        storefront.bootstrap().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(quantities(&backend.remote_cart()), vec![("A".to_string(), 2)]);
        assert_eq!(quantities(&storefront.cart().cart()), vec![("A".to_string(), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_added_during_login_reaches_the_server() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        backend.set_remote_cart(cart(&[("B", 1)]));
        backend.set_fetch_delay(Duration::from_millis(200));
        let storefront = storefront(&backend, &MemoryStore::new());
        storefront.bootstrap().await;

        let login = storefront.login("ada@fads.shop", password(), AccountKind::Customer);
        let shopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            storefront
                .cart()
                .add_line("C", Variant::none(), 1, Price::whole(1000))
                .unwrap();
        };
        let (result, ()) = tokio::join!(login, shopper);
        result.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let expected = vec![("B".to_string(), 1), ("C".to_string(), 1)];
        assert_eq!(quantities(&storefront.cart().cart()), expected);
        assert_eq!(quantities(&backend.remote_cart()), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_logins_are_queued() {
        let backend = FakeBackend::new();
        backend.add_account("ada@fads.shop", "hunter22", AccountKind::Customer);
        backend.add_account("root@fads.shop", "hunter22", AccountKind::Admin);
        backend.set_session_delay(Duration::from_millis(50));
        let store = MemoryStore::new();
        GuestCartRepository::new(store.clone())
            .save(&cart(&[("A", 2)]))
            .unwrap();
        let storefront = storefront(&backend, &store);
        storefront.bootstrap().await;
        let mut events = storefront.events();

        let (customer, admin) = tokio::join!(
            storefront.login("ada@fads.shop", password(), AccountKind::Customer),
            storefront.login("root@fads.shop", password(), AccountKind::Admin),
        );
        assert_eq!(customer.unwrap().kind(), ActorKind::Customer);
        assert_eq!(admin.unwrap().kind(), ActorKind::Admin);
        assert_eq!(storefront.actor().kind(), ActorKind::Admin);

        let mut transitions = Vec::new();
        let mut merges = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                StorefrontEvent::SessionChanged { from, to, .. } => transitions.push((from, to)),
                StorefrontEvent::CartMerged { .. } => merges += 1,
                _ => {}
            }
        }
        // The admin login started from the committed customer session.
        assert_eq!(
            transitions,
            vec![
                (ActorKind::Guest, ActorKind::Customer),
                (ActorKind::Customer, ActorKind::Admin),
            ]
        );
        assert_eq!(merges, 1);
        assert_eq!(backend.upserts().len(), 1);
        assert_eq!(quantities(&backend.remote_cart()), vec![("A".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_reset_returns_to_resolving_guest() {
        let backend = FakeBackend::new();
        backend.sign_in_as(Actor::authenticated(
            AccountKind::Admin,
            UserId::parse("u7").unwrap(),
            Email::parse("root@fads.shop").unwrap(),
        ));
        backend.set_remote_cart(cart(&[("A", 1)]));
        let storefront = storefront(&backend, &MemoryStore::new());
        assert_eq!(storefront.bootstrap().await.kind(), ActorKind::Admin);
        assert_eq!(storefront.cart().count(), 1);

        storefront.reset().await;
        let session = storefront.session();
        assert_eq!(session.phase, Phase::Resolving);
        assert_eq!(session.actor, Actor::Guest);
        assert!(storefront.cart().cart().is_empty());
    }
}
