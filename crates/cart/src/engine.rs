//! Engine façade.
//!
//! [`CartEngine`] is the one handle UI surfaces hold. It owns the cache and the
//! mutation sequencer and is cheap to clone.

use std::sync::Arc;

use modmarket_core::{IdentityScope, ModId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::cache::{CartCache, CartState};
use crate::catalog::{CatalogError, CatalogResolver, HttpCatalog};
use crate::config::{CartConfig, CartTimeouts};
use crate::error::Result;
use crate::identity::Identity;
use crate::remote::{HttpCartStore, RemoteCartStore, StoreError};
use crate::sequencer::{CartNotice, MutationOutcome, MutationSequencer};
use crate::view::CartTotals;

/// Errors building an engine from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to build cart store client: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to build catalog client: {0}")]
    Catalog(#[from] CatalogError),
}

/// Shared cart engine.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartEngineInner>,
}

struct CartEngineInner {
    cache: Arc<CartCache>,
    sequencer: MutationSequencer,
}

impl CartEngine {
    /// Wire an engine around the given boundary implementations.
    ///
    /// The engine starts anonymous; call [`CartEngine::set_identity`] once the
    /// session layer knows who the user is.
    #[must_use]
    pub fn new(
        store: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn CatalogResolver>,
        timeouts: CartTimeouts,
    ) -> Self {
        let cache = Arc::new(CartCache::new(
            Arc::clone(&store),
            catalog,
            timeouts.refresh,
        ));
        let sequencer = MutationSequencer::new(Arc::clone(&cache), store, timeouts.mutation);
        Self {
            inner: Arc::new(CartEngineInner { cache, sequencer }),
        }
    }

    /// Build an engine backed by the marketplace HTTP API, using the identity
    /// from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built.
    pub fn from_config(config: &CartConfig) -> std::result::Result<Self, BuildError> {
        let store = HttpCartStore::new(config)?;
        let catalog = HttpCatalog::new(config)?;
        let engine = Self::new(Arc::new(store), Arc::new(catalog), config.timeouts);
        engine.set_identity(config.identity.clone());
        Ok(engine)
    }

    /// Switch identity.
    ///
    /// Signing out or switching user empties the cart and dismisses any
    /// notice. A rotated credential for the same user keeps both.
    pub fn set_identity(&self, identity: Identity) {
        if self.inner.cache.set_identity(identity) {
            self.inner.sequencer.dismiss_notice();
            info!(scope = ?self.identity_scope(), "Cart identity switched");
        }
    }

    #[must_use]
    pub fn identity_scope(&self) -> IdentityScope {
        self.inner.cache.identity_scope()
    }

    /// Current cart state. Never blocks.
    #[must_use]
    pub fn read(&self) -> CartState {
        self.inner.cache.read()
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.read().totals()
    }

    /// Whether `mod_id` is in the cached cart.
    #[must_use]
    pub fn contains(&self, mod_id: ModId) -> bool {
        self.inner.cache.read().contains(mod_id)
    }

    /// Re-fetch the cart; concurrent calls share one request.
    ///
    /// # Errors
    ///
    /// See [`CartCache::refresh`].
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<CartState> {
        self.inner.cache.refresh().await?;
        Ok(self.read())
    }

    /// # Errors
    ///
    /// See [`MutationSequencer::clear`].
    pub async fn add(&self, mod_id: ModId) -> Result<MutationOutcome> {
        self.inner.sequencer.add(mod_id).await
    }

    /// # Errors
    ///
    /// See [`MutationSequencer::clear`].
    pub async fn remove(&self, mod_id: ModId) -> Result<MutationOutcome> {
        self.inner.sequencer.remove(mod_id).await
    }

    /// # Errors
    ///
    /// See [`MutationSequencer::clear`].
    pub async fn clear(&self) -> Result<MutationOutcome> {
        self.inner.sequencer.clear().await
    }

    /// Whether a mutation is in flight for the current identity.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.sequencer.is_pending()
    }

    #[must_use]
    pub fn notice(&self) -> Option<CartNotice> {
        self.inner.sequencer.notice()
    }

    pub fn dismiss_notice(&self) {
        self.inner.sequencer.dismiss_notice();
    }

    /// Subscribe to every change a surface renders.
    #[must_use]
    pub fn subscribe(&self) -> CartSubscription {
        CartSubscription {
            state: self.inner.cache.subscribe(),
            pending: self.inner.sequencer.subscribe_pending(),
            notice: self.inner.sequencer.subscribe_notice(),
        }
    }
}

/// The engine was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cart engine dropped")]
pub struct EngineClosed;

/// Change notifications for one surface.
pub struct CartSubscription {
    state: watch::Receiver<CartState>,
    pending: watch::Receiver<Option<u64>>,
    notice: watch::Receiver<Option<CartNotice>>,
}

impl CartSubscription {
    /// Wait until the snapshot, the pending flag or the notice changes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineClosed`] once the engine is gone.
    pub async fn changed(&mut self) -> std::result::Result<(), EngineClosed> {
        let result = tokio::select! {
            r = self.state.changed() => r,
            r = self.pending.changed() => r,
            r = self.notice.changed() => r,
        };
        result.map_err(|_| EngineClosed)
    }

    /// The latest state seen by this subscription.
    #[must_use]
    pub fn state(&mut self) -> CartState {
        self.state.borrow_and_update().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use modmarket_core::UserId;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::CartError;
    use crate::remote::StoreError;
    use crate::sequencer::NoticeKind;
    use crate::testing::{self, MemoryCartStore, MemoryCatalog, session};

    #[tokio::test]
    async fn test_sign_out_clears_cart_and_notice() {
        let store = Arc::new(MemoryCartStore::new().with_cart(1, &[42]));
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));
        engine.refresh().await.unwrap();

        store.fail_next(StoreError::Unavailable("offline".to_string()));
        assert!(engine.add(ModId::new(7)).await.is_err());
        assert!(engine.notice().is_some());

        engine.set_identity(Identity::Anonymous);
        assert_eq!(engine.identity_scope(), IdentityScope::Anonymous);
        assert!(engine.read().snapshot.is_empty());
        assert_eq!(engine.notice(), None);
    }

    #[tokio::test]
    async fn test_token_rotation_keeps_cart_and_notice() {
        let store = Arc::new(MemoryCartStore::new().with_cart(1, &[42]));
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));
        engine.refresh().await.unwrap();
        store.fail_next(StoreError::Unavailable("offline".to_string()));
        assert!(engine.clear().await.is_err());

        engine.set_identity(session(1));

        assert!(engine.contains(ModId::new(42)));
        assert_eq!(engine.notice().unwrap().kind, NoticeKind::RequestFailed);
    }

    #[tokio::test]
    async fn test_totals_follow_snapshot() {
        let store = Arc::new(MemoryCartStore::new().with_cart(1, &[42, 7]));
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));

        let state = engine.refresh().await.unwrap();
        assert_eq!(state.snapshot.identity_scope, IdentityScope::User(UserId::new(1)));
        let totals = engine.totals();
        assert_eq!(totals.count, 2);
        assert_eq!(totals.total.display(), "$12.50");
    }

    #[tokio::test]
    async fn test_subscription_wakes_on_mutation() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));
        engine.refresh().await.unwrap();

        let mut subscription = engine.subscribe();
        engine.add(ModId::new(13)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), subscription.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(subscription.state().contains(ModId::new(13)));
    }

    #[tokio::test]
    async fn test_subscription_closes_with_engine() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        let mut subscription = engine.subscribe();

        drop(engine);
        assert_eq!(subscription.changed().await, Err(EngineClosed));
    }

    #[tokio::test]
    async fn test_anonymous_mutation_requires_sign_in() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);

        assert_eq!(engine.add(ModId::new(42)).await, Err(CartError::Unauthenticated));
        assert_eq!(engine.notice().unwrap().kind, NoticeKind::SignInRequired);
        assert!(store.calls().is_empty());
    }
}
