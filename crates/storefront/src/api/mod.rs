//! HTTP client for the session and cart services.
//!
//! # Endpoints
//!
//! | scope | check | login | logout |
//! |---|---|---|---|
//! | customer | `GET auth/me` | `POST auth/login` | `POST auth/logout` |
//! | admin | `GET admin/me` | `POST admin/login` | `POST admin/logout` |
//!
//! The cart service is `GET cart` and `POST cart` (one line per call).
//! Sessions ride on cookies kept by the client's cookie store.
//!
//! Components depend on the [`SessionApi`] and [`CartApi`] traits rather than
//! on [`ApiClient`] so tests can run them against an in-memory backend.

mod wire;

pub use wire::{LineUpsert, Role, SessionUser};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fads_core::{AccountKind, Actor, Cart, Email};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::config::StorefrontConfig;
use wire::{CartPayload, ErrorBody, SessionPayload};

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors from the session and cart services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection failure or other transport problem.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered 401.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// The service answered with another non-success status.
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the failure is transient and worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Unauthorized { .. } | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Email and password for a login call.
///
/// `Debug` never prints the password.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

/// Session-service contract.
pub trait SessionApi: Send + Sync + 'static {
    /// Ask who the current session belongs to. `Guest` when nobody is signed in.
    fn session(&self, scope: AccountKind)
    -> impl Future<Output = Result<Actor, ApiError>> + Send;

    /// Sign in. The session itself is re-read with [`SessionApi::session`].
    fn login(
        &self,
        scope: AccountKind,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Sign out.
    fn logout(&self, scope: AccountKind) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Cart-service contract.
pub trait CartApi: Send + Sync + 'static {
    /// Load the server-persisted cart of the signed-in actor.
    fn fetch_cart(&self) -> impl Future<Output = Result<Cart, ApiError>> + Send;

    /// Create, update or (with quantity zero) delete one line.
    fn upsert_line(&self, upsert: &LineUpsert)
    -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Client for the session and cart services.
///
/// Cheap to clone; clones share the connection pool and the cookie store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base: Url,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.inner.base.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the services under `base`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(concat!("fads-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner { http, base }),
        })
    }

    /// Create a client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, ApiError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Send a request and map non-success statuses to `ApiError`.
    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let response = request
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let reason = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::reason)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        tracing::debug!(
            status = %status,
            request_id = %request_id,
            reason = %reason,
            "Service returned non-success status"
        );

        if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized { reason })
        } else {
            Err(ApiError::Rejected {
                status: status.as_u16(),
                reason,
            })
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
        serde_json::from_str(body).map_err(|e| {
            tracing::warn!(
                error = %e,
                body = %body.chars().take(200).collect::<String>(),
                "Failed to decode service response"
            );
            ApiError::Decode(e.to_string())
        })
    }
}

const fn scope_prefix(scope: AccountKind) -> &'static str {
    match scope {
        AccountKind::Customer => "auth",
        AccountKind::Admin => "admin",
    }
}

impl SessionApi for ApiClient {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn session(&self, scope: AccountKind) -> Result<Actor, ApiError> {
        let url = self.endpoint(&format!("{}/me", scope_prefix(scope)))?;
        let body = self.send(self.inner.http.get(url)).await?;
        Self::decode::<SessionPayload>(&body)?.into_actor(scope)
    }

    #[instrument(skip(self, credentials), fields(scope = %scope))]
    async fn login(&self, scope: AccountKind, credentials: &Credentials) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("{}/login", scope_prefix(scope)))?;
        let payload = serde_json::json!({
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
        });
        self.send(self.inner.http.post(url).json(&payload)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn logout(&self, scope: AccountKind) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("{}/logout", scope_prefix(scope)))?;
        self.send(self.inner.http.post(url)).await?;
        Ok(())
    }
}

impl CartApi for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Cart, ApiError> {
        let url = self.endpoint("cart")?;
        let body = self.send(self.inner.http.get(url)).await?;
        Self::decode::<CartPayload>(&body)?.into_cart()
    }

    #[instrument(skip(self, upsert), fields(product_id = %upsert.product_id, quantity = upsert.quantity))]
    async fn upsert_line(&self, upsert: &LineUpsert) -> Result<(), ApiError> {
        let url = self.endpoint("cart")?;
        self.send(self.inner.http.post(url).json(upsert)).await?;
        Ok(())
    }
}
