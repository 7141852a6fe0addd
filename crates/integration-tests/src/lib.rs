//! Integration tests for the fads storefront client.
//!
//! Tests drive a real [`Storefront`] over HTTP against [`MockBackend`], an
//! in-process axum server speaking the session and cart service contract:
//!
//! - `GET /api/{auth,admin}/me` → `{user}` or 401
//! - `POST /api/{auth,admin}/login` → `{user}` and a `token` cookie, or 401
//! - `POST /api/{auth,admin}/logout` → 200
//! - `GET /api/cart` → `{data: [line]}`; `POST /api/cart` upserts one line
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p fads-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use fads_core::{LineKey, Price, ProductId, Variant};
use fads_storefront::{Storefront, StorefrontConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;

/// Name of the session cookie the mock backend sets.
pub const TOKEN_COOKIE: &str = "token";

struct Account {
    id: u64,
    password: String,
    admin: bool,
}

/// One line as the cart service stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    product_id: ProductId,
    #[serde(default)]
    variant: Variant,
    quantity: u32,
    unit_price: Price,
    #[serde(default)]
    added_at: Option<DateTime<Utc>>,
}

impl StoredLine {
    fn key(&self) -> LineKey {
        LineKey::derive(&self.product_id, &self.variant)
    }
}

#[derive(Default)]
struct BackendState {
    accounts: HashMap<String, Account>,
    /// token → email
    sessions: HashMap<String, String>,
    /// email → lines
    carts: HashMap<String, Vec<StoredLine>>,
    failing_cart_writes: usize,
    cart_writes: usize,
}

type Shared = Arc<Mutex<BackendState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BackendState> {
    state.lock().expect("mock backend state poisoned")
}

/// In-process session and cart service on an ephemeral port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MockBackend {
    /// Bind `127.0.0.1:0` and start serving.
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/auth/me", get(me))
            .route("/api/auth/login", post(login))
            .route("/api/auth/logout", post(logout))
            .route("/api/admin/me", get(me))
            .route("/api/admin/login", post(login))
            .route("/api/admin/logout", post(logout))
            .route("/api/cart", get(fetch_cart).post(upsert_line))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to read mock address");
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock backend stopped");
        });

        Self { addr, state, task }
    }

    /// Base URL to configure the storefront with.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn add_account(&self, email: &str, password: &str, admin: bool) {
        let mut state = lock(&self.state);
        let id = u64::try_from(state.accounts.len()).unwrap_or(u64::MAX) + 1;
        state.accounts.insert(
            email.to_string(),
            Account {
                id,
                password: password.to_string(),
                admin,
            },
        );
    }

    /// Replace an account's cart with `(product, quantity)` lines priced at 10.
    pub fn set_cart(&self, email: &str, lines: &[(&str, u32)]) {
        let lines = lines
            .iter()
            .map(|(product, quantity)| StoredLine {
                product_id: ProductId::parse(*product).expect("valid product id"),
                variant: Variant::none(),
                quantity: *quantity,
                unit_price: Price::whole(10),
                added_at: Some(DateTime::UNIX_EPOCH),
            })
            .collect();
        lock(&self.state).carts.insert(email.to_string(), lines);
    }

    /// An account's cart as `(product, quantity)`, sorted by product.
    #[must_use]
    pub fn cart(&self, email: &str) -> Vec<(String, u32)> {
        let state = lock(&self.state);
        let mut lines: Vec<(String, u32)> = state
            .carts
            .get(email)
            .map(|lines| {
                lines
                    .iter()
                    .map(|l| (l.product_id.to_string(), l.quantity))
                    .collect()
            })
            .unwrap_or_default();
        lines.sort();
        lines
    }

    /// Invalidate every session token.
    pub fn expire_sessions(&self) {
        lock(&self.state).sessions.clear();
    }

    /// Answer the next `n` cart writes with 503.
    pub fn fail_cart_writes(&self, n: usize) {
        lock(&self.state).failing_cart_writes = n;
    }

    /// Number of cart writes accepted so far.
    #[must_use]
    pub fn cart_writes(&self) -> usize {
        lock(&self.state).cart_writes
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Email of the caller's session.
fn caller(state: &BackendState, headers: &HeaderMap) -> Option<String> {
    token(headers).and_then(|t| state.sessions.get(&t).cloned())
}

fn user_json(state: &BackendState, email: &str) -> serde_json::Value {
    let account = state.accounts.get(email);
    json!({
        "id": account.map_or(0, |a| a.id),
        "email": email,
        "role": if account.is_some_and(|a| a.admin) { "admin" } else { "user" },
    })
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&state);
    match caller(&state, &headers) {
        Some(email) => Json(json!({ "user": user_json(&state, &email) })).into_response(),
        None => error(StatusCode::UNAUTHORIZED, "Not authenticated"),
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<LoginBody>) -> Response {
    let mut state = lock(&state);
    let valid = state
        .accounts
        .get(&body.email)
        .is_some_and(|a| a.password == body.password);
    if !valid {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let token = uuid::Uuid::new_v4().to_string();
    state.sessions.insert(token.clone(), body.email.clone());
    let cookie = format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user": user_json(&state, &body.email) })),
    )
        .into_response()
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(token) = token(&headers) {
        lock(&state).sessions.remove(&token);
    }
    (
        [(header::SET_COOKIE, format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0"))],
        Json(json!({ "message": "Logged out" })),
    )
        .into_response()
}

async fn fetch_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&state);
    let Some(email) = caller(&state, &headers) else {
        return error(StatusCode::UNAUTHORIZED, "Not authenticated");
    };
    let lines = state.carts.get(&email).cloned().unwrap_or_default();
    Json(json!({ "data": lines })).into_response()
}

async fn upsert_line(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(line): Json<StoredLine>,
) -> Response {
    let mut state = lock(&state);
    let Some(email) = caller(&state, &headers) else {
        return error(StatusCode::UNAUTHORIZED, "Not authenticated");
    };
    if state.failing_cart_writes > 0 {
        state.failing_cart_writes -= 1;
        return error(StatusCode::SERVICE_UNAVAILABLE, "Cart service unavailable");
    }

    state.cart_writes += 1;
    let key = line.key();
    let lines = state.carts.entry(email).or_default();
    lines.retain(|l| l.key() != key);
    if line.quantity > 0 {
        lines.push(line);
    }
    Json(json!({ "message": "ok" })).into_response()
}

/// A fresh directory for a test's guest cart store.
#[must_use]
pub fn temp_storage() -> PathBuf {
    std::env::temp_dir().join(format!("fads-it-{}", uuid::Uuid::new_v4()))
}

/// A storefront wired to `backend`, keeping its guest cart in `storage_dir`.
///
/// # Panics
///
/// Panics if the storefront cannot be built.
#[must_use]
pub fn storefront(backend: &MockBackend, storage_dir: &Path, debounce: Duration) -> Storefront {
    let mut config =
        StorefrontConfig::for_api(&backend.api_url()).expect("Mock backend URL is valid");
    config.storage_dir = storage_dir.to_path_buf();
    config.request_timeout = Duration::from_secs(5);
    config.sync.debounce = debounce;
    config.sync.backoff_base = Duration::from_millis(20);
    config.sync.backoff_max = Duration::from_millis(100);
    Storefront::init(&config).expect("Failed to build storefront")
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
