//! Session commands against the configured session service.
//!
//! Each run starts a fresh client with an empty cookie jar, so `whoami`
//! reports a signed-in actor only if the service recognises the caller
//! without a session cookie.
//!
//! # Environment Variables
//!
//! - `FADS_PASSWORD` - Password for `login`

use fads_core::AccountKind;
use fads_storefront::{Storefront, StorefrontConfig};
use secrecy::SecretString;

use super::{CliError, output};

/// Resolve the session and print the actor with the cart it owns.
pub async fn whoami(config: &StorefrontConfig) -> Result<(), CliError> {
    let storefront = Storefront::init(config)?;
    let actor = storefront.bootstrap().await;
    output::actor(&actor);
    output::cart(&storefront.cart().cart());
    Ok(())
}

/// Sign in, merging the local guest cart into the account's cart.
pub async fn login(config: &StorefrontConfig, email: &str, admin: bool) -> Result<(), CliError> {
    let password = std::env::var("FADS_PASSWORD")
        .map(SecretString::from)
        .map_err(|_| CliError::MissingPassword)?;
    let kind = if admin {
        AccountKind::Admin
    } else {
        AccountKind::Customer
    };

    let storefront = Storefront::init(config)?;
    storefront.bootstrap().await;
    let actor = storefront
        .login(email, password, kind)
        .await
        .inspect_err(|e| tracing::warn!(email, "Login failed: {}", e.user_message()))?;

    output::actor(&actor);
    output::cart(&storefront.cart().cart());
    Ok(())
}
