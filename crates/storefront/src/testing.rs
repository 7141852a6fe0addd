//! In-memory session and cart services for unit tests.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fads_core::{
    AccountKind, Actor, Cart, CartLine, Email, Quantity, UserId,
};
use secrecy::ExposeSecret;

use crate::api::{ApiError, CartApi, Credentials, LineUpsert, SessionApi};

#[derive(Default)]
struct State {
    accounts: HashMap<String, (String, Actor)>,
    signed_in: Option<Actor>,
    session_error: Option<ApiError>,
    session_delay: Duration,
    logout_error: Option<ApiError>,
    last_logout_scope: Option<AccountKind>,
    session_checks: usize,
    login_calls: usize,
    remote: Cart,
    fetch_delay: Duration,
    fetch_error: Option<ApiError>,
    /// Scripted outcomes of the next upserts; `None` lets one through.
    upsert_script: VecDeque<Option<ApiError>>,
    upserts: Vec<LineUpsert>,
}

/// Scriptable backend. Clones share state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_account(&self, email: &str, password: &str, kind: AccountKind) {
        let mut state = self.state();
        let id = UserId::parse(format!("u{}", state.accounts.len() + 1)).unwrap();
        let actor = Actor::authenticated(kind, id, Email::parse(email).unwrap());
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), actor));
    }

    pub fn sign_in_as(&self, actor: Actor) {
        self.state().signed_in = Some(actor);
    }

    pub fn sign_out_remotely(&self) {
        self.state().signed_in = None;
    }

    pub fn fail_session_checks(&self, error: ApiError) {
        self.state().session_error = Some(error);
    }

    pub fn set_session_delay(&self, delay: Duration) {
        self.state().session_delay = delay;
    }

    pub fn fail_logouts(&self, error: ApiError) {
        self.state().logout_error = Some(error);
    }

    pub fn set_remote_cart(&self, cart: Cart) {
        self.state().remote = cart;
    }

    pub fn remote_cart(&self) -> Cart {
        self.state().remote.clone()
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = delay;
    }

    pub fn fail_fetches(&self, error: ApiError) {
        self.state().fetch_error = Some(error);
    }

    /// Fail the next `n` scripted upserts with `error`.
    pub fn fail_upserts(&self, n: usize, error: &ApiError) {
        let mut state = self.state();
        for _ in 0..n {
            state.upsert_script.push_back(Some(error.clone()));
        }
    }

    /// Let the next `n` scripted upserts through before any queued failure.
    pub fn pass_upserts(&self, n: usize) {
        let mut state = self.state();
        for _ in 0..n {
            state.upsert_script.push_back(None);
        }
    }

    pub fn upserts(&self) -> Vec<LineUpsert> {
        self.state().upserts.clone()
    }

    pub fn session_checks(&self) -> usize {
        self.state().session_checks
    }

    pub fn login_calls(&self) -> usize {
        self.state().login_calls
    }

    pub fn last_logout_scope(&self) -> Option<AccountKind> {
        self.state().last_logout_scope
    }
}

impl SessionApi for FakeBackend {
    async fn session(&self, _scope: AccountKind) -> Result<Actor, ApiError> {
        let delay = {
            let mut state = self.state();
            state.session_checks += 1;
            state.session_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        if let Some(error) = &state.session_error {
            return Err(error.clone());
        }
        Ok(state.signed_in.clone().unwrap_or_default())
    }

    async fn login(&self, _scope: AccountKind, credentials: &Credentials) -> Result<(), ApiError> {
        let mut state = self.state();
        state.login_calls += 1;
        let account = state
            .accounts
            .get(credentials.email.as_str())
            .filter(|(password, _)| password == credentials.password.expose_secret())
            .map(|(_, actor)| actor.clone());
        match account {
            Some(actor) => {
                state.signed_in = Some(actor);
                Ok(())
            }
            None => Err(ApiError::Unauthorized {
                reason: "Invalid credentials".to_string(),
            }),
        }
    }

    async fn logout(&self, scope: AccountKind) -> Result<(), ApiError> {
        let mut state = self.state();
        state.last_logout_scope = Some(scope);
        state.signed_in = None;
        state.logout_error.clone().map_or(Ok(()), Err)
    }
}

impl CartApi for FakeBackend {
    async fn fetch_cart(&self) -> Result<Cart, ApiError> {
        let delay = self.state().fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        if let Some(error) = &state.fetch_error {
            return Err(error.clone());
        }
        if state.signed_in.is_none() {
            return Err(ApiError::Unauthorized {
                reason: "Not logged in".to_string(),
            });
        }
        Ok(state.remote.clone())
    }

    async fn upsert_line(&self, upsert: &LineUpsert) -> Result<(), ApiError> {
        let mut state = self.state();
        if let Some(Some(error)) = state.upsert_script.pop_front() {
            return Err(error);
        }
        if state.signed_in.is_none() {
            return Err(ApiError::Unauthorized {
                reason: "Not logged in".to_string(),
            });
        }
        state.upserts.push(upsert.clone());

        let key = upsert.key();
        let mut lines: Vec<CartLine> = state
            .remote
            .lines()
            .iter()
            .filter(|l| l.key() != &key)
            .cloned()
            .collect();
        if upsert.quantity > 0 {
            lines.push(CartLine::new(
                upsert.product_id.clone(),
                upsert.variant.clone(),
                Quantity::new(upsert.quantity).unwrap(),
                upsert.unit_price,
                upsert.added_at,
            ));
        }
        state.remote = Cart::from_lines(lines);
        Ok(())
    }
}
