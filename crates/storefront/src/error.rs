//! Unified error handling with Sentry integration.
//!
//! Provides a unified `StorefrontError` for the operations of the storefront
//! context. Server-side failures are captured to Sentry; user errors are not.

use fads_core::ValidationError;
use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::session::AuthError;
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// A cart mutation was rejected; the cart is unchanged.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Login failed; the actor is unchanged.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// An authenticated call answered 401.
    #[error("Session expired")]
    SessionExpired,

    /// The session or cart service could not be reached.
    #[error("Network error: {0}")]
    Network(ApiError),

    /// Guest and remote carts could not be reconciled.
    ///
    /// Reserved: the current merge is total and never produces it.
    #[error("Cart merge conflict: {0}")]
    MergeConflict(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A response arrived after the session it belonged to ended.
    #[error("Stale response discarded")]
    StaleResponse,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ApiError> for StorefrontError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { .. } => Self::SessionExpired,
            other => Self::Network(other),
        }
    }
}

impl StorefrontError {
    /// Whether the failure is ours rather than the user's.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Storage(_) | Self::Config(_) | Self::MergeConflict(_)
        )
    }

    /// Capture server-side failures to Sentry and log them.
    pub fn report(&self) {
        if self.is_server_side() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        }
    }

    /// Text that is safe to show to the user.
    // Don't expose internal error details to users
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Rejected { reason } => reason.clone(),
                AuthError::WrongRole => "This account does not have admin access".to_string(),
                AuthError::MalformedSession(_) | AuthError::Network(_) => {
                    "Unable to sign in right now, please try again".to_string()
                }
            },
            Self::SessionExpired => "Your session has expired, please sign in again".to_string(),
            Self::Network(_) => "Unable to reach the store, changes are saved locally".to_string(),
            Self::StaleResponse => "The page changed, please try again".to_string(),
            Self::MergeConflict(_) | Self::Storage(_) | Self::Config(_) => {
                "Internal error".to_string()
            }
        }
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;
