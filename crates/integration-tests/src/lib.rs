//! Integration tests for the mod marketplace cart engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p modmarket-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_engine` - Consistency properties of the engine against in-memory
//!   store and catalog doubles
//! - `surfaces` - Several surfaces observing one engine
//!
//! Shared fixtures live here so each test file stays focused on behaviour.

use std::sync::Arc;

use modmarket_cart::CartEngine;
use modmarket_cart::testing::{self, MemoryCartStore, MemoryCatalog};

/// An engine with its doubles, signed in as user 1 unless stated otherwise.
pub struct Harness {
    pub store: Arc<MemoryCartStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub engine: CartEngine,
}

impl Harness {
    /// Anonymous engine over `store` and the standard catalog.
    #[must_use]
    pub fn anonymous(store: MemoryCartStore) -> Self {
        let store = Arc::new(store);
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        Self {
            store,
            catalog,
            engine,
        }
    }

    /// Engine signed in as user 1, cart not yet fetched.
    #[must_use]
    pub fn signed_in(store: MemoryCartStore) -> Self {
        let harness = Self::anonymous(store);
        harness.engine.set_identity(testing::session(1));
        harness
    }

    /// Mod ids in the cached snapshot, in snapshot order.
    #[must_use]
    pub fn cached_mods(&self) -> Vec<i32> {
        self.engine
            .read()
            .snapshot
            .items
            .iter()
            .map(|item| item.mod_id.as_i32())
            .collect()
    }

    /// Count and formatted total.
    #[must_use]
    pub fn summary(&self) -> (usize, String) {
        let totals = self.engine.totals();
        (totals.count, totals.total.display())
    }
}
