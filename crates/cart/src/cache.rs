//! Cart cache.
//!
//! Holds the single [`CartSnapshot`] for the active identity and publishes it
//! to every surface through a `watch` channel. The cache is written only by a
//! refresh (standalone or post-mutation); surfaces are read-only.
//!
//! # Refresh protocol
//!
//! 1. Standalone refreshes are single-flight: the first caller becomes the
//!    leader and fetches, later callers subscribe to the leader's result.
//! 2. A post-mutation refresh never joins an outstanding flight, since that
//!    fetch may have started before the mutation landed. It always starts a
//!    new flight, which later standalone callers then join.
//! 3. Every fetch takes a ticket when it starts. A result is applied only if
//!    no later-started fetch has already been applied, and only if the
//!    identity epoch is unchanged.
//! 4. A failed fetch leaves the previous snapshot untouched.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use modmarket_core::{CartItem, CartSnapshot, IdentityScope, ModId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::catalog::CatalogResolver;
use crate::error::{CartError, Result};
use crate::identity::{Identity, Session};
use crate::remote::RemoteCartStore;
use crate::view::CartTotals;

type RefreshResult = Result<Arc<CartSnapshot>>;

/// What a surface reads: the snapshot plus whether it has ever been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartState {
    pub snapshot: Arc<CartSnapshot>,
    /// True until the first successful fetch for an authenticated identity.
    pub is_loading: bool,
}

impl CartState {
    fn empty(scope: IdentityScope) -> Self {
        Self {
            snapshot: Arc::new(CartSnapshot::empty(scope)),
            is_loading: scope.is_authenticated(),
        }
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::of(&self.snapshot)
    }

    #[must_use]
    pub fn contains(&self, mod_id: ModId) -> bool {
        self.snapshot.contains(mod_id)
    }
}

/// Identity bookkeeping guarded by one lock.
struct ScopeState {
    identity: Identity,
    /// Bumped on every identity change; results from older epochs are dropped.
    epoch: u64,
    next_ticket: u64,
    applied_ticket: u64,
    inflight: Option<Arc<InFlightRefresh>>,
}

impl ScopeState {
    fn begin_flight(&mut self) -> Arc<InFlightRefresh> {
        self.next_ticket += 1;
        let (tx, _) = watch::channel(None);
        let flight = Arc::new(InFlightRefresh {
            epoch: self.epoch,
            ticket: self.next_ticket,
            tx,
        });
        self.inflight = Some(Arc::clone(&flight));
        flight
    }
}

/// Tracking state for a fetch in progress.
struct InFlightRefresh {
    epoch: u64,
    ticket: u64,
    tx: watch::Sender<Option<RefreshResult>>,
}

/// Clears the in-flight slot when the leader finishes or is dropped.
///
/// Dropping the slot drops the last sender once the leader's own handle is
/// gone, which wakes any waiters so they can elect a new leader.
struct FlightGuard<'a> {
    scope: &'a Mutex<ScopeState>,
    ticket: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut scope = self.scope.lock();
        if scope
            .inflight
            .as_ref()
            .is_some_and(|flight| flight.ticket == self.ticket)
        {
            scope.inflight = None;
        }
    }
}

enum Role {
    Leader(Arc<InFlightRefresh>, Session),
    Waiter(watch::Receiver<Option<RefreshResult>>),
}

/// In-memory cart snapshot for the active identity.
pub struct CartCache {
    store: Arc<dyn RemoteCartStore>,
    catalog: Arc<dyn CatalogResolver>,
    refresh_timeout: Duration,
    state: watch::Sender<CartState>,
    scope: Mutex<ScopeState>,
}

impl CartCache {
    /// Create an empty cache for an anonymous identity.
    #[must_use]
    pub fn new(
        store: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn CatalogResolver>,
        refresh_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(CartState::empty(IdentityScope::Anonymous));
        Self {
            store,
            catalog,
            refresh_timeout,
            state,
            scope: Mutex::new(ScopeState {
                identity: Identity::Anonymous,
                epoch: 0,
                next_ticket: 0,
                applied_ticket: 0,
                inflight: None,
            }),
        }
    }

    /// Current state. Never blocks and never touches the network.
    #[must_use]
    pub fn read(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn identity_scope(&self) -> IdentityScope {
        self.scope.lock().identity.scope()
    }

    /// Current identity epoch.
    pub(crate) fn epoch(&self) -> u64 {
        self.scope.lock().epoch
    }

    /// Session and epoch for a call that must be authenticated.
    pub(crate) fn session(&self) -> Option<(Session, u64)> {
        let scope = self.scope.lock();
        scope
            .identity
            .session()
            .map(|session| (session.clone(), scope.epoch))
    }

    /// Switch identity.
    ///
    /// A different user (or signing out) discards the snapshot and every
    /// outstanding result. A new credential for the same user keeps it.
    /// Returns whether the scope changed.
    pub fn set_identity(&self, identity: Identity) -> bool {
        let mut scope = self.scope.lock();
        let previous = scope.identity.scope();
        let next = identity.scope();
        scope.identity = identity;

        if previous == next {
            return false;
        }

        scope.epoch += 1;
        scope.inflight = None;
        self.state.send_replace(CartState::empty(next));
        debug!(epoch = scope.epoch, ?next, "Cart identity changed");
        true
    }

    /// Re-fetch the cart, joining an outstanding refresh if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Unauthenticated`] without any network access for
    /// an anonymous identity, or the fetch failure; the previous snapshot is
    /// kept on failure.
    pub async fn refresh(&self) -> RefreshResult {
        loop {
            let role = {
                let mut scope = self.scope.lock();
                let Some(session) = scope.identity.session().cloned() else {
                    return Err(CartError::Unauthenticated);
                };
                let joinable = scope
                    .inflight
                    .as_ref()
                    .filter(|flight| flight.epoch == scope.epoch)
                    .map(|flight| flight.tx.subscribe());
                match joinable {
                    Some(rx) => Role::Waiter(rx),
                    None => Role::Leader(scope.begin_flight(), session),
                }
            };

            match role {
                Role::Leader(flight, session) => return self.lead(flight, session).await,
                Role::Waiter(mut rx) => {
                    debug!("Joining in-flight cart refresh");
                    if let Ok(result) = rx.wait_for(Option::is_some).await
                        && let Some(result) = result.as_ref()
                    {
                        return result.clone();
                    }
                    // Leader was dropped before finishing; elect a new one.
                }
            }
        }
    }

    /// Mandatory refresh after a mutation issued under `epoch`.
    ///
    /// Always starts a new fetch.
    pub(crate) async fn refresh_after_mutation(&self, epoch: u64) -> RefreshResult {
        let (flight, session) = {
            let mut scope = self.scope.lock();
            if scope.epoch != epoch {
                return Err(CartError::IdentityChanged);
            }
            let Some(session) = scope.identity.session().cloned() else {
                return Err(CartError::IdentityChanged);
            };
            (scope.begin_flight(), session)
        };
        self.lead(flight, session).await
    }

    async fn lead(&self, flight: Arc<InFlightRefresh>, session: Session) -> RefreshResult {
        let _guard = FlightGuard {
            scope: &self.scope,
            ticket: flight.ticket,
        };
        let result = self.fetch_and_apply(&session, flight.epoch, flight.ticket).await;
        flight.tx.send_replace(Some(result.clone()));
        result
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    async fn fetch_and_apply(&self, session: &Session, epoch: u64, ticket: u64) -> RefreshResult {
        let items = match tokio::time::timeout(self.refresh_timeout, self.fetch(session)).await {
            Err(_) => {
                warn!(timeout = ?self.refresh_timeout, "Cart refresh timed out; keeping last snapshot");
                return Err(CartError::Timeout(self.refresh_timeout));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cart refresh failed; keeping last snapshot");
                return Err(e);
            }
            Ok(Ok(items)) => items,
        };
        self.apply(epoch, ticket, items)
    }

    /// Fetch entries and enrich them through the catalog.
    async fn fetch(&self, session: &Session) -> Result<Vec<CartItem>> {
        let entries = self.store.fetch_all(session).await?;

        let resolved = try_join_all(entries.into_iter().map(|entry| async move {
            let snapshot = self.catalog.resolve(entry.mod_id).await?;
            if snapshot.is_none() {
                warn!(mod_id = %entry.mod_id, entry_id = %entry.entry_id, "Dropping cart entry for unknown mod");
            }
            Ok::<_, CartError>(snapshot.map(|mod_snapshot| CartItem {
                entry_id: entry.entry_id,
                mod_id: entry.mod_id,
                mod_snapshot,
            }))
        }))
        .await?;

        Ok(resolved.into_iter().flatten().collect())
    }

    fn apply(&self, epoch: u64, ticket: u64, items: Vec<CartItem>) -> RefreshResult {
        let mut scope = self.scope.lock();

        if scope.epoch != epoch {
            warn!("Discarding cart response fetched for a previous identity");
            return Err(CartError::IdentityChanged);
        }

        if ticket < scope.applied_ticket {
            debug!(ticket, applied = scope.applied_ticket, "Discarding superseded cart response");
            return Ok(Arc::clone(&self.state.borrow().snapshot));
        }

        scope.applied_ticket = ticket;
        let snapshot = Arc::new(CartSnapshot::from_items(scope.identity.scope(), items));
        self.state.send_replace(CartState {
            snapshot: Arc::clone(&snapshot),
            is_loading: false,
        });
        debug!(count = snapshot.items.len(), "Cart snapshot replaced");
        Ok(snapshot)
    }
}
