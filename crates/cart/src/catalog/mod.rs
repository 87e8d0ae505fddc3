//! Catalog resolver boundary.
//!
//! Cart entries only name a mod; the resolver supplies the title, pricing and
//! thumbnail shown for each line. [`HttpCatalog`] is the production adapter.

mod http;

pub use http::HttpCatalog;

use async_trait::async_trait;
use modmarket_core::{ModId, ModSnapshot};
use thiserror::Error;

/// Errors that can occur when resolving catalog entries.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any non-success status other than 404.
    #[error("Catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The catalog returned data that cannot be priced.
    #[error("Invalid catalog entry for mod {mod_id}: {reason}")]
    Invalid { mod_id: ModId, reason: String },
}

impl CatalogError {
    /// Whether the catalog could not be reached or failed on its side, as
    /// opposed to answering with something unusable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Parse(_) | Self::Invalid { .. } => false,
        }
    }
}

/// Maps a mod id to its current display and pricing fields.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Resolve one mod from the current catalog.
    ///
    /// `Ok(None)` means the mod no longer exists; the cart drops the orphaned
    /// entry from the snapshot it is building.
    async fn resolve(&self, mod_id: ModId) -> Result<Option<ModSnapshot>, CatalogError>;
}
