//! In-memory store and catalog doubles.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! downstream test crates. [`MemoryCartStore`] records every call in dispatch
//! order and can be scripted to fail, hold or hang the next call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use modmarket_core::{CartEntryId, CurrencyCode, ModId, ModSnapshot, Price, UserId};
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::oneshot;

use crate::catalog::{CatalogError, CatalogResolver};
use crate::config::CartTimeouts;
use crate::engine::CartEngine;
use crate::identity::{Identity, Session};
use crate::remote::{RemoteCartStore, RemoteEntry, StoreError};

/// An authenticated identity for `user_id`.
#[must_use]
pub fn session(user_id: i32) -> Identity {
    Identity::Authenticated(Session::new(
        UserId::new(user_id),
        SecretString::from(format!("test-session-{user_id}")),
    ))
}

/// A catalog snapshot priced in USD cents.
#[must_use]
pub fn mod_snapshot(title: &str, cents: i64, discount_cents: Option<i64>) -> ModSnapshot {
    ModSnapshot {
        title: title.to_string(),
        price: Price::from_cents(cents, CurrencyCode::USD),
        discount_price: discount_cents.map(|c| Price::from_cents(c, CurrencyCode::USD)),
        thumbnail_url: Some(format!("https://cdn.example.com/mods/{}.png", title.to_lowercase().replace(' ', "-"))),
        category: "gameplay".to_string(),
    }
}

/// An engine wired to the given doubles with default timeouts.
#[must_use]
pub fn engine(store: &Arc<MemoryCartStore>, catalog: &Arc<MemoryCatalog>) -> CartEngine {
    CartEngine::new(store.clone(), catalog.clone(), CartTimeouts::default())
}

/// A call as observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    FetchAll(UserId),
    Add(UserId, ModId),
    Remove(UserId, ModId),
    Clear(UserId),
}

impl StoreCall {
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::FetchAll(_))
    }
}

/// Scripted behaviour for the next call.
enum CallPlan {
    Fail(StoreError),
    Hold(oneshot::Receiver<Option<StoreError>>),
    Hang,
}

/// Lets a held call proceed.
pub struct Release(oneshot::Sender<Option<StoreError>>);

impl Release {
    pub fn release(self) {
        let _ = self.0.send(None);
    }

    /// Settle the held call with `error` instead.
    pub fn fail(self, error: StoreError) {
        let _ = self.0.send(Some(error));
    }
}

#[derive(Default)]
struct StoreState {
    carts: HashMap<UserId, Vec<RemoteEntry>>,
    calls: Vec<StoreCall>,
    plans: VecDeque<CallPlan>,
    revoked: HashSet<UserId>,
    next_entry: u64,
}

impl StoreState {
    fn entry(&mut self, mod_id: ModId) -> RemoteEntry {
        self.next_entry += 1;
        RemoteEntry {
            entry_id: CartEntryId::new(format!("entry-{}", self.next_entry)),
            mod_id,
        }
    }
}

/// In-memory remote cart store.
#[derive(Default)]
pub struct MemoryCartStore {
    state: Mutex<StoreState>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user's cart.
    #[must_use]
    pub fn with_cart(self, user_id: i32, mods: &[i32]) -> Self {
        self.set_cart(user_id, mods);
        self
    }

    /// Replace a user's cart, as another device would.
    pub fn set_cart(&self, user_id: i32, mods: &[i32]) {
        let mut state = self.state.lock();
        let entries = mods.iter().map(|&m| state.entry(ModId::new(m))).collect();
        state.carts.insert(UserId::new(user_id), entries);
    }

    /// Mods currently stored for a user, in store order.
    #[must_use]
    pub fn cart(&self, user_id: i32) -> Vec<i32> {
        self.state
            .lock()
            .carts
            .get(&UserId::new(user_id))
            .map(|entries| entries.iter().map(|e| e.mod_id.as_i32()).collect())
            .unwrap_or_default()
    }

    /// Every call received so far, in dispatch order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Only the mutating calls, in dispatch order.
    #[must_use]
    pub fn mutation_calls(&self) -> Vec<StoreCall> {
        self.calls().into_iter().filter(StoreCall::is_mutation).collect()
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: StoreError) {
        self.state.lock().plans.push_back(CallPlan::Fail(error));
    }

    /// Hold the next call until the returned handle is released.
    #[must_use]
    pub fn hold_next(&self) -> Release {
        let (tx, rx) = oneshot::channel();
        self.state.lock().plans.push_back(CallPlan::Hold(rx));
        Release(tx)
    }

    /// Make the next call never settle.
    pub fn hang_next(&self) {
        self.state.lock().plans.push_back(CallPlan::Hang);
    }

    /// Reject every further call for `user_id` as unauthorized.
    pub fn revoke(&self, user_id: i32) {
        self.state.lock().revoked.insert(UserId::new(user_id));
    }

    /// Record the call, then run any scripted behaviour.
    async fn dispatch(&self, call: StoreCall, user_id: UserId) -> Result<(), StoreError> {
        let plan = {
            let mut state = self.state.lock();
            state.calls.push(call);
            if state.revoked.contains(&user_id) {
                return Err(StoreError::Unauthorized("session revoked".to_string()));
            }
            state.plans.pop_front()
        };

        match plan {
            None => Ok(()),
            Some(CallPlan::Fail(error)) => Err(error),
            Some(CallPlan::Hold(rx)) => match rx.await {
                Ok(Some(error)) => Err(error),
                _ => Ok(()),
            },
            Some(CallPlan::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl RemoteCartStore for MemoryCartStore {
    async fn fetch_all(&self, session: &Session) -> Result<Vec<RemoteEntry>, StoreError> {
        let user_id = session.user_id();
        self.dispatch(StoreCall::FetchAll(user_id), user_id).await?;
        Ok(self
            .state
            .lock()
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError> {
        let user_id = session.user_id();
        self.dispatch(StoreCall::Add(user_id, mod_id), user_id).await?;
        let mut state = self.state.lock();
        let present = state
            .carts
            .get(&user_id)
            .is_some_and(|entries| entries.iter().any(|e| e.mod_id == mod_id));
        if !present {
            let entry = state.entry(mod_id);
            state.carts.entry(user_id).or_default().push(entry);
        }
        Ok(())
    }

    async fn remove(&self, session: &Session, mod_id: ModId) -> Result<(), StoreError> {
        let user_id = session.user_id();
        self.dispatch(StoreCall::Remove(user_id, mod_id), user_id).await?;
        if let Some(entries) = self.state.lock().carts.get_mut(&user_id) {
            entries.retain(|e| e.mod_id != mod_id);
        }
        Ok(())
    }

    async fn clear(&self, session: &Session) -> Result<(), StoreError> {
        let user_id = session.user_id();
        self.dispatch(StoreCall::Clear(user_id), user_id).await?;
        self.state.lock().carts.remove(&user_id);
        Ok(())
    }
}

/// In-memory catalog.
#[derive(Default)]
pub struct MemoryCatalog {
    mods: Mutex<HashMap<ModId, ModSnapshot>>,
    resolves: AtomicUsize,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A small catalog: mod 42 at $10.00, mod 7 at $5.00 discounted to $2.50,
    /// mod 13 at $3.99.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_mod(42, mod_snapshot("Better Trains", 1000, None))
            .with_mod(7, mod_snapshot("Night Sky", 500, Some(250)))
            .with_mod(13, mod_snapshot("Quiet Birds", 399, None))
    }

    #[must_use]
    pub fn with_mod(self, mod_id: i32, snapshot: ModSnapshot) -> Self {
        self.insert(mod_id, snapshot);
        self
    }

    pub fn insert(&self, mod_id: i32, snapshot: ModSnapshot) {
        self.mods.lock().insert(ModId::new(mod_id), snapshot);
    }

    /// Change a mod's regular price.
    pub fn set_price(&self, mod_id: i32, cents: i64) {
        if let Some(snapshot) = self.mods.lock().get_mut(&ModId::new(mod_id)) {
            snapshot.price = Price::from_cents(cents, snapshot.price.currency_code);
        }
    }

    /// Change or drop a mod's discount.
    pub fn set_discount(&self, mod_id: i32, cents: Option<i64>) {
        if let Some(snapshot) = self.mods.lock().get_mut(&ModId::new(mod_id)) {
            snapshot.discount_price =
                cents.map(|c| Price::from_cents(c, snapshot.price.currency_code));
        }
    }

    /// Delist a mod.
    pub fn remove(&self, mod_id: i32) {
        self.mods.lock().remove(&ModId::new(mod_id));
    }

    #[must_use]
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CatalogResolver for MemoryCatalog {
    async fn resolve(&self, mod_id: ModId) -> Result<Option<ModSnapshot>, CatalogError> {
        self.resolves.fetch_add(1, Ordering::Relaxed);
        Ok(self.mods.lock().get(&mod_id).cloned())
    }
}
