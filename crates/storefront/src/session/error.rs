//! Authentication error types.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur during login.
///
/// The current actor is never changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Invalid email format (checked before any call).
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] fads_core::EmailError),

    /// The service refused the login.
    #[error("login rejected: {reason}")]
    Rejected {
        /// Server-reported reason.
        reason: String,
    },

    /// An admin login resolved to a non-admin account.
    #[error("account is not an administrator")]
    WrongRole,

    /// The follow-up session check did not describe a signed-in user.
    #[error("malformed session: {0}")]
    MalformedSession(String),

    /// The service could not be reached.
    #[error("network error: {0}")]
    Network(ApiError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { reason } => Self::Rejected { reason },
            ApiError::Rejected { status, reason } if status < 500 => Self::Rejected { reason },
            ApiError::Decode(detail) => Self::MalformedSession(detail),
            other => Self::Network(other),
        }
    }
}
