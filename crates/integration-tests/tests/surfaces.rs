//! Several surfaces observing one engine.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use modmarket_cart::remote::StoreError;
use modmarket_cart::surfaces::{
    AddButtonState, AddToCartControl, CartBadge, CartDrawer, DrawerHandle, DrawerShortcut,
    FloatingCartButton, IntentOutcome, SurfaceView,
};
use modmarket_cart::testing::{MemoryCartStore, session};
use modmarket_cart::{Identity, NoticeKind};
use modmarket_core::ModId;
use modmarket_integration_tests::Harness;
use pretty_assertions::assert_eq;

struct Page {
    badge: CartBadge,
    button: FloatingCartButton,
    drawer: CartDrawer,
    shortcut: DrawerShortcut,
    trains: AddToCartControl,
    birds: AddToCartControl,
}

fn page(h: &Harness) -> Page {
    let handle = DrawerHandle::new();
    Page {
        badge: CartBadge::new(h.engine.clone()),
        button: FloatingCartButton::new(h.engine.clone(), handle.clone()),
        drawer: CartDrawer::new(h.engine.clone(), handle.clone()),
        shortcut: DrawerShortcut::new(handle),
        trains: AddToCartControl::new(h.engine.clone(), ModId::new(42)),
        birds: AddToCartControl::new(h.engine.clone(), ModId::new(13)),
    }
}

#[tokio::test]
async fn test_every_surface_sees_a_mutation_from_any_surface() {
    let h = Harness::signed_in(MemoryCartStore::new());
    h.engine.refresh().await.unwrap();
    let p = page(&h);

    assert_eq!(p.trains.press().await, IntentOutcome::Applied);
    assert_eq!(p.birds.press().await, IntentOutcome::Applied);

    let badge = p.badge.render().cart().unwrap();
    let button = p.button.render().cart().unwrap();
    let drawer = p.drawer.render().cart().unwrap();
    assert_eq!(badge.count, 2);
    assert_eq!(button.count, 2);
    assert_eq!(button.total, "$13.99");
    assert_eq!(drawer.total, button.total);
    assert_eq!(
        drawer.lines.iter().map(|l| l.mod_id).collect::<Vec<_>>(),
        vec![ModId::new(42), ModId::new(13)]
    );

    assert_eq!(p.drawer.remove(ModId::new(42)).await, IntentOutcome::Applied);
    assert_eq!(p.trains.state(), AddButtonState::Add);
    assert_eq!(p.birds.state(), AddButtonState::Added);
    assert_eq!(p.badge.render().cart().unwrap().count, 1);
}

#[tokio::test]
async fn test_controls_are_disabled_while_pending() {
    let h = Harness::signed_in(MemoryCartStore::new());
    h.engine.refresh().await.unwrap();
    let p = page(&h);
    let release = h.store.hold_next();

    let (first, during) = tokio::join!(p.trains.press(), async {
        while !h.engine.is_pending() {
            tokio::task::yield_now().await;
        }
        let state = p.birds.state();
        let pressed = p.birds.press().await;
        let cleared = p.drawer.clear().await;
        let badge_pending = p.badge.render().cart().unwrap().is_pending;
        release.release();
        (state, pressed, cleared, badge_pending)
    });

    assert_eq!(first, IntentOutcome::Applied);
    assert_eq!(
        during,
        (
            AddButtonState::Working,
            IntentOutcome::Ignored,
            IntentOutcome::Ignored,
            true
        )
    );
    assert_eq!(h.store.mutation_calls().len(), 1);
}

#[tokio::test]
async fn test_notice_is_shared_and_dismissible() {
    let h = Harness::signed_in(MemoryCartStore::new().with_cart(1, &[42]));
    h.engine.refresh().await.unwrap();
    let p = page(&h);

    h.store
        .fail_next(StoreError::Unavailable("offline".to_string()));
    let outcome = p.birds.press().await;

    assert!(matches!(outcome, IntentOutcome::Failed(_)));
    let notice = p.drawer.render().cart().unwrap().notice.unwrap();
    assert_eq!(notice.kind, NoticeKind::RequestFailed);
    assert_eq!(p.badge.render().cart().unwrap().count, 1);

    p.drawer.dismiss_notice();
    assert_eq!(h.engine.notice(), None);
}

#[tokio::test]
async fn test_subscription_wakes_for_each_change() {
    let h = Harness::signed_in(MemoryCartStore::new());
    let mut subscription = h.engine.subscribe();

    h.engine.refresh().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), subscription.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(!subscription.state().is_loading);

    h.engine.add(ModId::new(7)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), subscription.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(subscription.state().contains(ModId::new(7)));
}

#[tokio::test]
async fn test_drawer_toggles_from_button_and_shortcut() {
    let h = Harness::signed_in(MemoryCartStore::new());
    h.engine.refresh().await.unwrap();
    let p = page(&h);

    assert!(!p.drawer.render().cart().unwrap().open);
    assert_eq!(p.button.click(), IntentOutcome::Applied);
    assert!(p.drawer.render().cart().unwrap().open);
    assert!(p.shortcut.handle("Ctrl+K".parse().unwrap()));
    assert!(!p.drawer.handle().is_open());
}

#[tokio::test]
async fn test_sign_out_turns_every_surface_into_sign_in() {
    let h = Harness::signed_in(MemoryCartStore::new().with_cart(1, &[42]));
    h.engine.refresh().await.unwrap();
    let p = page(&h);
    assert_eq!(p.trains.state(), AddButtonState::Added);

    h.engine.set_identity(Identity::Anonymous);

    assert_eq!(p.badge.render(), SurfaceView::SignIn);
    assert_eq!(p.button.render(), SurfaceView::SignIn);
    assert_eq!(p.drawer.render(), SurfaceView::SignIn);
    assert_eq!(p.trains.state(), AddButtonState::SignIn);
    assert_eq!(p.trains.press().await, IntentOutcome::SignInRequired);

    // Signing back in starts from an unloaded cart
    h.engine.set_identity(session(1));
    assert_eq!(p.trains.state(), AddButtonState::Working);
    h.engine.refresh().await.unwrap();
    assert_eq!(p.trains.state(), AddButtonState::Added);
}
