//! Session state: who is using the storefront.
//!
//! # State machine
//!
//! ```text
//! Resolving ──session check──▶ Resolved(Guest | Customer | Admin)
//!     ▲                              │
//!     └──────── bootstrap() ─────────┘
//! ```
//!
//! The [`Session`] value lives in a `watch` channel and is replaced wholesale,
//! so every reader sees either the old or the new actor, never a mix.
//! `epoch` increments whenever the actor changes and identifies which session
//! an in-flight response belongs to.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use fads_core::{AccountKind, Actor, ActorKind, Email};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tracing::instrument;

use crate::api::{Credentials, SessionApi};
use crate::events::{EventBus, StorefrontEvent};
use crate::telemetry::{clear_sentry_user, set_sentry_user};

/// Whether the actor is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A session check is in flight; the actor shown is the previous one.
    Resolving,
    Resolved,
}

/// The published session value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub phase: Phase,
    pub actor: Actor,
    pub epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Resolving,
            actor: Actor::Guest,
            epoch: 0,
        }
    }
}

/// Owner of the current [`Actor`].
pub struct SessionStore<A> {
    inner: Arc<SessionInner<A>>,
}

struct SessionInner<A> {
    api: Arc<A>,
    state: watch::Sender<Session>,
    /// Held for the duration of every remote session call.
    flight: Mutex<()>,
    events: EventBus,
}

impl<A> Clone for SessionStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for SessionStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<A: SessionApi> SessionStore<A> {
    pub fn new(api: Arc<A>, events: EventBus) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(SessionInner {
                api,
                state,
                flight: Mutex::new(()),
                events,
            }),
        }
    }

    /// Resolve the actor from the session service.
    ///
    /// Any failure resolves to `Guest`. A call made while another session
    /// call is in flight does not issue its own request; it waits for the
    /// running one and returns its result.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Actor {
        let Ok(_flight) = self.inner.flight.try_lock() else {
            drop(self.inner.flight.lock().await);
            return self.actor();
        };

        self.inner
            .state
            .send_modify(|session| session.phase = Phase::Resolving);

        let actor = match self.inner.api.session(AccountKind::Customer).await {
            Ok(actor) => actor,
            Err(e) => {
                tracing::info!(error = %e, "Session check failed, continuing as guest");
                Actor::Guest
            }
        };

        self.commit(actor.clone());
        actor
    }

    /// Sign in as `kind` and re-resolve the actor.
    ///
    /// Concurrent logins queue behind each other.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` with the server-reported reason on failure; the
    /// current actor is left unchanged.
    #[instrument(skip(self, password), fields(kind = %kind))]
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
        kind: AccountKind,
    ) -> Result<Actor, AuthError> {
        let credentials = Credentials {
            email: Email::parse(email)?,
            password,
        };

        let _flight = self.inner.flight.lock().await;

        self.inner.api.login(kind, &credentials).await?;
        let actor = self.inner.api.session(kind).await?;

        match (kind, actor.kind()) {
            (_, ActorKind::Guest) => {
                return Err(AuthError::MalformedSession(
                    "session check after login returned no user".to_string(),
                ));
            }
            (AccountKind::Admin, ActorKind::Customer) => {
                tracing::warn!("Admin login resolved to a customer account");
                return Err(AuthError::WrongRole);
            }
            (AccountKind::Admin, ActorKind::Admin)
            | (AccountKind::Customer, ActorKind::Customer | ActorKind::Admin) => {}
        }

        self.commit(actor.clone());
        Ok(actor)
    }

    /// Sign out. The remote call is best-effort; the actor becomes `Guest`
    /// regardless.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let _flight = self.inner.flight.lock().await;

        let scope = match self.actor().kind() {
            ActorKind::Admin => AccountKind::Admin,
            ActorKind::Customer | ActorKind::Guest => AccountKind::Customer,
        };
        if let Err(e) = self.inner.api.logout(scope).await {
            tracing::warn!(error = %e, "Logout call failed, clearing session locally");
        }

        self.commit(Actor::Guest);
    }

    /// Force `Guest` without a network call.
    pub fn expire(&self) {
        self.commit(Actor::Guest);
    }

    /// Force `Guest` if the session is still the one identified by `epoch`.
    ///
    /// Returns whether the session was expired.
    pub fn expire_if(&self, epoch: u64) -> bool {
        if self.epoch() != epoch || !self.actor().is_authenticated() {
            return false;
        }
        tracing::info!(epoch, "Session expired");
        self.expire();
        true
    }

    /// Replace the actor, bumping the epoch if it changed.
    fn commit(&self, actor: Actor) {
        let mut changed = None;
        self.inner.state.send_modify(|session| {
            session.phase = Phase::Resolved;
            if session.actor != actor {
                let from = session.actor.kind();
                session.actor = actor;
                session.epoch += 1;
                changed = Some((from, session.actor.clone(), session.epoch));
            }
        });

        let Some((from, actor, epoch)) = changed else {
            return;
        };

        match &actor {
            Actor::Guest => clear_sentry_user(),
            Actor::Customer { id, email } | Actor::Admin { id, email } => {
                set_sentry_user(id, Some(email.as_str()));
            }
        }
        tracing::info!(from = %from, to = %actor.kind(), epoch, "Session changed");
        self.inner.events.emit(StorefrontEvent::SessionChanged {
            from,
            to: actor.kind(),
            epoch,
        });
    }

    /// Snapshot of the published session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// The committed actor.
    #[must_use]
    pub fn actor(&self) -> Actor {
        self.inner.state.borrow().actor.clone()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.state.borrow().epoch
    }

    /// Receiver that observes every committed transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Back to the initial state (`Resolving`, `Guest`), keeping the epoch
    /// monotonic so responses from before the reset stay stale.
    pub fn reset(&self) {
        self.commit(Actor::Guest);
        self.inner
            .state
            .send_modify(|session| session.phase = Phase::Resolving);
    }
}
