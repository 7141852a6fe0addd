//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `FADS_API_URL` - Session and cart service base URL (default: `http://localhost:5000/api`)
//! - `FADS_REQUEST_TIMEOUT_MS` - Timeout for every remote call (default: 10000)
//! - `FADS_CART_DEBOUNCE_MS` - Cart persistence coalescing window (default: 400)
//! - `FADS_SYNC_MAX_ATTEMPTS` - Cart write attempts per flush (default: 5)
//! - `FADS_SYNC_BACKOFF_BASE_MS` - First retry delay (default: 250)
//! - `FADS_SYNC_BACKOFF_MAX_MS` - Retry delay cap (default: 10000)
//! - `FADS_STORAGE_DIR` - Directory of the guest cart store (default: `.fads`)
//! - `FADS_TOKEN_COOKIE` - Presence cookie checked by the edge filter (default: `token`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TOKEN_COOKIE: &str = "token";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the session and cart services
    pub api_url: Url,
    /// Bound on every remote call
    pub request_timeout: Duration,
    /// Cart persistence settings
    pub sync: SyncConfig,
    /// Directory holding the file-backed guest cart
    pub storage_dir: PathBuf,
    /// Name of the cookie that signals a possible session
    pub token_cookie: String,
    /// Error tracking configuration
    pub sentry: SentryConfig,
}

/// Cart persistence timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Mutations inside this window coalesce into one write
    pub debounce: Duration,
    /// Attempts per flush before the cart is marked degraded
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff_base: Duration,
    /// Upper bound on any retry delay
    pub backoff_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            max_attempts: 5,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
        }
    }
}

/// Sentry configuration.
///
/// Implements `Debug` manually to redact the DSN, which embeds a key.
#[derive(Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
}

impl std::fmt::Debug for SentryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryConfig")
            .field("dsn", &self.dsn.as_ref().map(|_| "[REDACTED]"))
            .field("environment", &self.environment)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(
            "FADS_API_URL",
            &get_env_or_default("FADS_API_URL", DEFAULT_API_URL),
        )?;
        let request_timeout = Duration::from_millis(get_parsed_or_default(
            "FADS_REQUEST_TIMEOUT_MS",
            10_000_u64,
        )?);

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            debounce: get_millis_or("FADS_CART_DEBOUNCE_MS", defaults.debounce)?,
            max_attempts: get_parsed_or_default("FADS_SYNC_MAX_ATTEMPTS", defaults.max_attempts)?
                .max(1),
            backoff_base: get_millis_or("FADS_SYNC_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: get_millis_or("FADS_SYNC_BACKOFF_MAX_MS", defaults.backoff_max)?,
        };

        Ok(Self {
            api_url,
            request_timeout,
            sync,
            storage_dir: PathBuf::from(get_env_or_default("FADS_STORAGE_DIR", ".fads")),
            token_cookie: get_env_or_default("FADS_TOKEN_COOKIE", DEFAULT_TOKEN_COOKIE),
            sentry: SentryConfig {
                dsn: get_optional_env("SENTRY_DSN"),
                environment: get_optional_env("SENTRY_ENVIRONMENT"),
            },
        })
    }

    /// Configuration pointing at `api_url` with every other value defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `api_url` is not an http(s) URL.
    pub fn for_api(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url("FADS_API_URL", api_url)?,
            request_timeout: Duration::from_secs(10),
            sync: SyncConfig::default(),
            storage_dir: PathBuf::from(".fads"),
            token_cookie: DEFAULT_TOKEN_COOKIE.to_string(),
            sentry: SentryConfig::default(),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn get_millis_or(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    get_parsed_or_default(key, default_ms).map(Duration::from_millis)
}

/// Parse the API base URL, normalising it to end with `/` so relative
/// endpoint paths join under it instead of replacing its last segment.
fn parse_api_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
