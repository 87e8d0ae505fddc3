//! Engine-level error type.
//!
//! Boundary adapters report [`StoreError`](crate::remote::StoreError) and
//! [`CatalogError`](crate::catalog::CatalogError); the engine folds both into
//! [`CartError`], the only error a surface ever sees. `CartError` is `Clone`
//! so a single refresh result can be handed to every caller that joined it.

use std::time::Duration;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::remote::StoreError;

/// Errors returned by cart operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    /// No authenticated identity; the caller should prompt for sign-in.
    #[error("Sign in to use the cart")]
    Unauthenticated,

    /// The session credential was rejected by the store.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// A cart mutation is already in flight.
    #[error("Another cart update is still in progress")]
    Busy,

    /// The store or catalog could not be reached or failed.
    #[error("Network error: {0}")]
    Network(String),

    /// A request did not settle within its bound.
    #[error("Cart request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The store rejected the change (e.g. the mod no longer exists).
    #[error("Cart update rejected: {0}")]
    Conflict(String),

    /// The identity changed while the request was in flight; its result was
    /// discarded.
    #[error("Identity changed while the cart request was in flight")]
    IdentityChanged,
}

impl CartError {
    /// Whether the UI should redirect to authentication instead of retrying.
    #[must_use]
    pub const fn requires_sign_in(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::SessionExpired(_))
    }

    /// Whether this is the single-flight rejection.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Whether an explicit user-triggered retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Conflict(_) | Self::IdentityChanged
        )
    }
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(msg) => Self::SessionExpired(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<CatalogError> for CartError {
    fn from(err: CatalogError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        assert_eq!(CartError::Unauthenticated.to_string(), "Sign in to use the cart");
        assert_eq!(
            CartError::Timeout(Duration::from_millis(1500)).to_string(),
            "Cart request timed out after 1.5s"
        );
    }

    #[test]
    fn test_store_error_classification() {
        let err = CartError::from(StoreError::Unauthorized("token expired".to_string()));
        assert!(err.requires_sign_in());
        assert!(!err.is_retryable());

        let err = CartError::from(StoreError::Conflict("mod 9 is unlisted".to_string()));
        assert_eq!(err, CartError::Conflict("mod 9 is unlisted".to_string()));
        assert!(err.is_retryable());

        let err = CartError::from(StoreError::RateLimited(30));
        assert!(matches!(err, CartError::Network(_)));
    }

    #[test]
    fn test_busy_is_not_retryable_or_auth() {
        assert!(CartError::Busy.is_busy());
        assert!(!CartError::Busy.requires_sign_in());
        assert!(!CartError::Busy.is_retryable());
    }
}
