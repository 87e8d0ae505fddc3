//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MODMARKET_API_URL` - Base URL of the marketplace API (cart and catalog)
//!
//! ## Optional
//! - `MODMARKET_USER_ID` - Authenticated user (requires `MODMARKET_SESSION_TOKEN`)
//! - `MODMARKET_SESSION_TOKEN` - Session credential sent as a bearer token
//! - `CART_MUTATION_TIMEOUT_SECS` - Bound on add/remove/clear requests (default: 15)
//! - `CART_REFRESH_TIMEOUT_SECS` - Bound on a full cart fetch (default: 10)
//! - `CART_CONNECT_TIMEOUT_SECS` - HTTP connect timeout (default: 5)
//! - `CATALOG_CACHE_TTL_SECS` - How long a last known catalog snapshot may stand
//!   in while the catalog is unreachable, 0 disables (default: 60)
//! - `CATALOG_CACHE_CAPACITY` - Maximum cached catalog entries (default: 1000)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::time::Duration;

use modmarket_core::UserId;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::identity::{Identity, Session};

const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CATALOG_TTL_SECS: u64 = 60;
const DEFAULT_CATALOG_CAPACITY: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Marketplace API base URL
    pub api_url: Url,
    /// Identity signal supplied by the session layer
    pub identity: Identity,
    /// Request timeouts
    pub timeouts: CartTimeouts,
    /// Catalog resolver cache settings
    pub catalog_cache: CatalogCacheConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Bounds on remote calls.
///
/// A request that exceeds its bound fails with a timeout so the mutation lock
/// is always released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTimeouts {
    pub mutation: Duration,
    pub refresh: Duration,
    pub connect: Duration,
}

impl Default for CartTimeouts {
    fn default() -> Self {
        Self {
            mutation: Duration::from_secs(DEFAULT_MUTATION_TIMEOUT_SECS),
            refresh: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Catalog snapshot cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCacheConfig {
    /// How long a snapshot may serve as a fallback; `Duration::ZERO` disables
    /// the fallback.
    pub ttl: Duration,
    pub capacity: u64,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CATALOG_TTL_SECS),
            capacity: DEFAULT_CATALOG_CAPACITY,
        }
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(&get_required_env("MODMARKET_API_URL")?)?;
        let identity = identity_from_env()?;

        let timeouts = CartTimeouts {
            mutation: get_duration_secs("CART_MUTATION_TIMEOUT_SECS", DEFAULT_MUTATION_TIMEOUT_SECS)?,
            refresh: get_duration_secs("CART_REFRESH_TIMEOUT_SECS", DEFAULT_REFRESH_TIMEOUT_SECS)?,
            connect: get_duration_secs("CART_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };
        reject_zero("CART_MUTATION_TIMEOUT_SECS", timeouts.mutation)?;
        reject_zero("CART_REFRESH_TIMEOUT_SECS", timeouts.refresh)?;
        reject_zero("CART_CONNECT_TIMEOUT_SECS", timeouts.connect)?;

        let catalog_cache = CatalogCacheConfig {
            ttl: get_duration_secs("CATALOG_CACHE_TTL_SECS", DEFAULT_CATALOG_TTL_SECS)?,
            capacity: get_parsed_or_default("CATALOG_CACHE_CAPACITY", DEFAULT_CATALOG_CAPACITY)?,
        };

        Ok(Self {
            api_url,
            identity,
            timeouts,
            catalog_cache,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

/// Build the identity signal from `MODMARKET_USER_ID` and `MODMARKET_SESSION_TOKEN`.
///
/// Both absent means anonymous; exactly one present is a configuration error.
fn identity_from_env() -> Result<Identity, ConfigError> {
    let user = get_optional_env("MODMARKET_USER_ID");
    let token = get_optional_env("MODMARKET_SESSION_TOKEN");

    match (user, token) {
        (None, None) => Ok(Identity::Anonymous),
        (Some(user), Some(token)) => {
            let user_id = user.parse::<UserId>().map_err(|e| {
                ConfigError::InvalidEnvVar("MODMARKET_USER_ID".to_string(), e.to_string())
            })?;
            Ok(Identity::Authenticated(Session::new(
                user_id,
                SecretString::from(token),
            )))
        }
        (Some(_), None) => Err(ConfigError::MissingEnvVar(
            "MODMARKET_SESSION_TOKEN".to_string(),
        )),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("MODMARKET_USER_ID".to_string())),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the API base URL, normalizing it to end with a slash so relative
/// joins keep any path prefix.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized).map_err(|e| {
        ConfigError::InvalidEnvVar("MODMARKET_API_URL".to_string(), e.to_string())
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "MODMARKET_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get a parsed environment variable with a default value.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Get a whole-second duration with a default value.
fn get_duration_secs(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    get_parsed_or_default(key, default_secs).map(Duration::from_secs)
}

fn reject_zero(key: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
