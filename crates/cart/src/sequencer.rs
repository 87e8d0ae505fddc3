//! Mutation sequencer.
//!
//! Serializes add/remove/clear against the remote store. At most one mutation
//! per identity is in flight; a call made while one is pending fails fast with
//! [`CartError::Busy`]. Every successful mutation is followed by exactly one
//! cache refresh before the lock is released, so the local snapshot is always
//! re-derived from the store rather than patched locally.
//!
//! ```text
//! Idle ──call──▶ Pending ──store ok──▶ refresh ──▶ Idle
//!                   └──store error / timeout──▶ notice ──▶ Idle
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use modmarket_core::{CartSnapshot, IdentityScope, ModId};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CartCache, CartState};
use crate::error::{CartError, Result};
use crate::identity::Session;
use crate::remote::RemoteCartStore;

/// Which mutation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add(ModId),
    Remove(ModId),
    Clear,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(id) => write!(f, "add mod {id}"),
            Self::Remove(id) => write!(f, "remove mod {id}"),
            Self::Clear => f.write_str("clear cart"),
        }
    }
}

/// Result of a mutation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The store accepted the change and the cache was refreshed.
    Applied(Arc<CartSnapshot>),
    /// Nothing to do (mod already present, or already absent); no request
    /// was made.
    Unchanged(Arc<CartSnapshot>),
}

impl MutationOutcome {
    #[must_use]
    pub fn snapshot(&self) -> &Arc<CartSnapshot> {
        match self {
            Self::Applied(snapshot) | Self::Unchanged(snapshot) => snapshot,
        }
    }

    #[must_use]
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Category of a user-visible failure notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The user must sign in (again) before using the cart.
    SignInRequired,
    /// The change was not applied.
    RequestFailed,
    /// The change was applied but the cart could not be reloaded.
    OutOfDate,
}

/// A dismissible failure notice shown by cart surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartNotice {
    pub kind: NoticeKind,
    pub operation: MutationKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl CartNotice {
    fn for_error(kind: NoticeKind, operation: MutationKind, err: &CartError) -> Self {
        let kind = if err.requires_sign_in() {
            NoticeKind::SignInRequired
        } else {
            kind
        };
        let message = match kind {
            NoticeKind::SignInRequired => "Sign in to update your cart.".to_string(),
            NoticeKind::RequestFailed => format!("Could not {operation}: {err}"),
            NoticeKind::OutOfDate => {
                format!("Your cart was updated but could not be reloaded: {err}")
            }
        };
        Self {
            kind,
            operation,
            message,
            raised_at: Utc::now(),
        }
    }
}

/// Releases the mutation lock on drop, but only if this identity still
/// holds it.
struct LockGuard<'a> {
    lock: &'a watch::Sender<Option<u64>>,
    epoch: u64,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.send_if_modified(|holder| {
            if *holder == Some(self.epoch) {
                *holder = None;
                true
            } else {
                false
            }
        });
    }
}

/// Single-flight, write-through cart mutations.
pub struct MutationSequencer {
    cache: Arc<CartCache>,
    store: Arc<dyn RemoteCartStore>,
    timeout: Duration,
    /// Epoch of the identity whose mutation is in flight.
    lock: watch::Sender<Option<u64>>,
    notice: watch::Sender<Option<CartNotice>>,
}

impl MutationSequencer {
    #[must_use]
    pub fn new(cache: Arc<CartCache>, store: Arc<dyn RemoteCartStore>, timeout: Duration) -> Self {
        let (lock, _) = watch::channel(None);
        let (notice, _) = watch::channel(None);
        Self {
            cache,
            store,
            timeout,
            lock,
            notice,
        }
    }

    /// Whether a mutation for the current identity is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.is_held(self.cache.epoch())
    }

    /// Subscribe to lock changes.
    #[must_use]
    pub fn subscribe_pending(&self) -> watch::Receiver<Option<u64>> {
        self.lock.subscribe()
    }

    /// The current failure notice, if any.
    #[must_use]
    pub fn notice(&self) -> Option<CartNotice> {
        self.notice.borrow().clone()
    }

    /// Subscribe to notice changes.
    #[must_use]
    pub fn subscribe_notice(&self) -> watch::Receiver<Option<CartNotice>> {
        self.notice.subscribe()
    }

    /// Dismiss the current notice.
    pub fn dismiss_notice(&self) {
        self.notice.send_if_modified(|notice| notice.take().is_some());
    }

    /// Add `mod_id`. A mod already in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// See [`MutationSequencer::clear`].
    pub async fn add(&self, mod_id: ModId) -> Result<MutationOutcome> {
        self.run(MutationKind::Add(mod_id)).await
    }

    /// Remove `mod_id`. A mod not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// See [`MutationSequencer::clear`].
    pub async fn remove(&self, mod_id: ModId) -> Result<MutationOutcome> {
        self.run(MutationKind::Remove(mod_id)).await
    }

    /// Remove every entry, then refresh.
    ///
    /// # Errors
    ///
    /// - [`CartError::Unauthenticated`] for an anonymous identity
    /// - [`CartError::Busy`] while another mutation is pending
    /// - the store, timeout or refresh failure otherwise; the cache keeps its
    ///   last-known-good snapshot and a notice is raised
    pub async fn clear(&self) -> Result<MutationOutcome> {
        self.run(MutationKind::Clear).await
    }

    #[instrument(skip_all, fields(op = %op))]
    async fn run(&self, op: MutationKind) -> Result<MutationOutcome> {
        let Some((session, epoch)) = self.cache.session() else {
            let err = CartError::Unauthenticated;
            self.raise(NoticeKind::SignInRequired, op, &err);
            return Err(err);
        };

        if self.is_held(epoch) {
            debug!("Rejecting cart mutation while another is pending");
            return Err(CartError::Busy);
        }

        if let Some(outcome) = unchanged(&self.cache.read(), &session, op) {
            return Ok(outcome);
        }

        let Some(_guard) = self.try_acquire(epoch) else {
            return Err(CartError::Busy);
        };

        let dispatched = tokio::time::timeout(self.timeout, self.dispatch(&session, op)).await;
        if self.cache.epoch() != epoch {
            warn!("Identity changed during cart mutation; result discarded");
            return Err(CartError::IdentityChanged);
        }
        match dispatched {
            Err(_) => return Err(self.fail(op, CartError::Timeout(self.timeout))),
            Ok(Err(e)) => return Err(self.fail(op, e)),
            Ok(Ok(())) => {}
        }

        match self.cache.refresh_after_mutation(epoch).await {
            Ok(snapshot) => {
                self.dismiss_notice();
                info!(count = snapshot.items.len(), "Cart mutation applied");
                Ok(MutationOutcome::Applied(snapshot))
            }
            Err(CartError::IdentityChanged) => {
                warn!("Identity changed during cart mutation; result discarded");
                Err(CartError::IdentityChanged)
            }
            Err(e) => {
                warn!(error = %e, "Cart mutation applied but refresh failed");
                self.raise(NoticeKind::OutOfDate, op, &e);
                Err(e)
            }
        }
    }

    async fn dispatch(&self, session: &Session, op: MutationKind) -> Result<()> {
        match op {
            MutationKind::Add(mod_id) => self.store.add(session, mod_id).await?,
            MutationKind::Remove(mod_id) => self.store.remove(session, mod_id).await?,
            MutationKind::Clear => self.store.clear(session).await?,
        }
        Ok(())
    }

    fn is_held(&self, epoch: u64) -> bool {
        *self.lock.borrow() == Some(epoch)
    }

    fn try_acquire(&self, epoch: u64) -> Option<LockGuard<'_>> {
        let acquired = self.lock.send_if_modified(|holder| {
            if *holder == Some(epoch) {
                false
            } else {
                *holder = Some(epoch);
                true
            }
        });
        acquired.then_some(LockGuard {
            lock: &self.lock,
            epoch,
        })
    }

    fn fail(&self, op: MutationKind, err: CartError) -> CartError {
        error!(error = %err, "Cart mutation failed");
        self.raise(NoticeKind::RequestFailed, op, &err);
        err
    }

    fn raise(&self, kind: NoticeKind, op: MutationKind, err: &CartError) {
        self.notice
            .send_replace(Some(CartNotice::for_error(kind, op, err)));
    }
}

/// The no-op outcome for `op`, if the cached snapshot shows there is nothing
/// to do.
///
/// Presence is only trusted once `session`'s own cart has been fetched; before
/// that, or against another identity's snapshot, the request goes to the
/// store, which is idempotent.
fn unchanged(state: &CartState, session: &Session, op: MutationKind) -> Option<MutationOutcome> {
    let own_scope = IdentityScope::User(session.user_id());
    if state.is_loading || state.snapshot.identity_scope != own_scope {
        return None;
    }
    match op {
        MutationKind::Add(mod_id) if state.contains(mod_id) => {
            debug!("Mod already in cart");
            Some(MutationOutcome::Unchanged(Arc::clone(&state.snapshot)))
        }
        MutationKind::Remove(mod_id) if !state.contains(mod_id) => {
            debug!("Mod not in cart");
            Some(MutationOutcome::Unchanged(Arc::clone(&state.snapshot)))
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use modmarket_core::UserId;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::identity::Identity;
    use crate::remote::StoreError;
    use crate::testing::{MemoryCartStore, MemoryCatalog, StoreCall, session};

    struct Fixture {
        store: Arc<MemoryCartStore>,
        cache: Arc<CartCache>,
        sequencer: MutationSequencer,
    }

    async fn fixture(store: MemoryCartStore) -> Fixture {
        let store = Arc::new(store);
        let catalog = Arc::new(MemoryCatalog::standard());
        let cache = Arc::new(CartCache::new(
            store.clone(),
            catalog,
            Duration::from_secs(5),
        ));
        cache.set_identity(session(1));
        cache.refresh().await.unwrap();
        let sequencer = MutationSequencer::new(cache.clone(), store.clone(), Duration::from_secs(5));
        Fixture {
            store,
            cache,
            sequencer,
        }
    }

    fn user() -> UserId {
        UserId::new(1)
    }

    #[tokio::test]
    async fn test_add_refreshes_after_store_call() {
        let f = fixture(MemoryCartStore::new()).await;

        let outcome = f.sequencer.add(ModId::new(42)).await.unwrap();

        assert!(outcome.was_applied());
        assert!(outcome.snapshot().contains(ModId::new(42)));
        assert!(f.cache.read().contains(ModId::new(42)));
        assert_eq!(
            f.store.calls(),
            vec![
                StoreCall::FetchAll(user()),
                StoreCall::Add(user(), ModId::new(42)),
                StoreCall::FetchAll(user()),
            ]
        );
        assert!(!f.sequencer.is_pending());
    }

    #[tokio::test]
    async fn test_add_present_mod_makes_no_call() {
        let f = fixture(MemoryCartStore::new().with_cart(1, &[42])).await;

        let outcome = f.sequencer.add(ModId::new(42)).await.unwrap();

        assert!(!outcome.was_applied());
        assert!(f.store.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_mod_is_noop() {
        let f = fixture(MemoryCartStore::new()).await;

        let outcome = f.sequencer.remove(ModId::new(42)).await.unwrap();

        assert_eq!(outcome, MutationOutcome::Unchanged(f.cache.read().snapshot));
        assert!(f.store.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_clear_always_calls_store() {
        let f = fixture(MemoryCartStore::new()).await;

        let outcome = f.sequencer.clear().await.unwrap();

        assert!(outcome.was_applied());
        assert_eq!(f.store.mutation_calls(), vec![StoreCall::Clear(user())]);
    }

    #[tokio::test]
    async fn test_busy_while_pending() {
        let f = fixture(MemoryCartStore::new()).await;
        let release = f.store.hold_next();

        let (first, second) = tokio::join!(f.sequencer.add(ModId::new(42)), async {
            while !f.sequencer.is_pending() {
                tokio::task::yield_now().await;
            }
            let second = f.sequencer.add(ModId::new(7)).await;
            release.release();
            second
        });

        assert!(first.unwrap().was_applied());
        assert_eq!(second, Err(CartError::Busy));
        assert_eq!(
            f.store.mutation_calls(),
            vec![StoreCall::Add(user(), ModId::new(42))]
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_snapshot_and_raises_notice() {
        let f = fixture(MemoryCartStore::new().with_cart(1, &[42, 7])).await;
        let before = f.cache.read();

        f.store
            .fail_next(StoreError::Unavailable("connection reset".to_string()));
        let err = f.sequencer.clear().await.unwrap_err();

        assert!(matches!(err, CartError::Network(_)));
        assert_eq!(f.cache.read(), before);
        assert!(!f.sequencer.is_pending());
        let notice = f.sequencer.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::RequestFailed);
        assert_eq!(notice.operation, MutationKind::Clear);

        f.sequencer.dismiss_notice();
        assert_eq!(f.sequencer.notice(), None);
    }

    #[tokio::test]
    async fn test_successful_mutation_clears_previous_notice() {
        let f = fixture(MemoryCartStore::new()).await;
        f.store
            .fail_next(StoreError::Unavailable("offline".to_string()));
        assert!(f.sequencer.add(ModId::new(42)).await.is_err());
        assert!(f.sequencer.notice().is_some());

        f.sequencer.add(ModId::new(42)).await.unwrap();
        assert_eq!(f.sequencer.notice(), None);
    }

    #[tokio::test]
    async fn test_unauthorized_asks_for_sign_in() {
        let f = fixture(MemoryCartStore::new()).await;
        f.store.revoke(1);

        let err = f.sequencer.add(ModId::new(42)).await.unwrap_err();

        assert!(err.requires_sign_in());
        assert_eq!(f.sequencer.notice().unwrap().kind, NoticeKind::SignInRequired);
    }

    #[tokio::test]
    async fn test_anonymous_is_rejected_without_network() {
        let f = fixture(MemoryCartStore::new()).await;
        f.cache.set_identity(Identity::Anonymous);
        let calls_before = f.store.calls().len();

        assert_eq!(
            f.sequencer.add(ModId::new(42)).await,
            Err(CartError::Unauthenticated)
        );
        assert_eq!(f.store.calls().len(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_mutation_times_out_and_releases_lock() {
        let f = fixture(MemoryCartStore::new()).await;
        f.store.hang_next();

        let err = f.sequencer.add(ModId::new(42)).await.unwrap_err();

        assert_eq!(err, CartError::Timeout(Duration::from_secs(5)));
        assert!(!f.sequencer.is_pending());
        assert!(f.sequencer.add(ModId::new(42)).await.unwrap().was_applied());
    }

    #[tokio::test]
    async fn test_presence_is_not_checked_against_another_identity() {
        let f = fixture(MemoryCartStore::new().with_cart(1, &[42])).await;
        let state = f.cache.read();

        let own = unchanged(&state, &f.cache.session().unwrap().0, MutationKind::Add(ModId::new(42)));
        assert!(matches!(own, Some(MutationOutcome::Unchanged(_))));

        let Identity::Authenticated(other) = session(2) else {
            unreachable!()
        };
        assert_eq!(unchanged(&state, &other, MutationKind::Add(ModId::new(42))), None);
        assert_eq!(unchanged(&state, &other, MutationKind::Remove(ModId::new(7))), None);
    }

    #[tokio::test]
    async fn test_failure_after_identity_switch_raises_no_notice() {
        let f = fixture(MemoryCartStore::new()).await;
        let hold = f.store.hold_next();

        let (first, ()) = tokio::join!(f.sequencer.add(ModId::new(42)), async {
            while !f.sequencer.is_pending() {
                tokio::task::yield_now().await;
            }
            f.cache.set_identity(session(2));
            hold.fail(StoreError::Unauthorized("session revoked".to_string()));
        });

        assert_eq!(first, Err(CartError::IdentityChanged));
        assert_eq!(f.sequencer.notice(), None);
        assert!(!f.sequencer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_identity_switch_raises_no_notice() {
        let f = fixture(MemoryCartStore::new()).await;
        f.store.hang_next();

        let (first, ()) = tokio::join!(f.sequencer.add(ModId::new(42)), async {
            while !f.sequencer.is_pending() {
                tokio::task::yield_now().await;
            }
            f.cache.set_identity(session(2));
        });

        assert_eq!(first, Err(CartError::IdentityChanged));
        assert_eq!(f.sequencer.notice(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_after_mutation_reports_out_of_date() {
        let f = fixture(MemoryCartStore::new()).await;
        // The add itself succeeds; the refresh that follows fails.
        f.store.hold_next().release();
        f.store
            .fail_next(StoreError::Unavailable("gateway timeout".to_string()));

        let err = f.sequencer.add(ModId::new(42)).await.unwrap_err();

        assert!(matches!(err, CartError::Network(_)));
        assert_eq!(f.store.cart(1), vec![42]);
        assert!(!f.cache.read().contains(ModId::new(42)));
        assert_eq!(f.sequencer.notice().unwrap().kind, NoticeKind::OutOfDate);
        assert!(!f.sequencer.is_pending());
    }
}
