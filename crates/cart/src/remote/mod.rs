//! Remote cart store boundary.
//!
//! The store is the source of truth for which mods a user has in their cart.
//! The engine talks to it only through [`RemoteCartStore`]; [`HttpCartStore`]
//! is the production adapter.

mod http;

pub use http::HttpCartStore;

use async_trait::async_trait;
use modmarket_core::{CartEntryId, ModId};
use thiserror::Error;

use crate::identity::Session;

/// One `(entry, mod)` pair as returned by the store, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub entry_id: CartEntryId,
    pub mod_id: ModId,
}

/// Errors that can occur when talking to the remote cart store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session missing, expired or rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The store refused the change.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited by the store.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative cart persistence.
///
/// Every call carries the session; implementations must fail closed with
/// [`StoreError::Unauthorized`] when the credential is not accepted.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// All entries for the session's user, in store order.
    async fn fetch_all(&self, session: &Session) -> Result<Vec<RemoteEntry>, StoreError>;

    /// Add one entry. Adding a mod that is already present is not an error.
    async fn add(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError>;

    /// Remove the entry for `mod_id`. An absent entry is not an error.
    async fn remove(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError>;

    /// Remove every entry for the session's user.
    async fn clear(&self, session: &Session) -> Result<(), StoreError>;
}
