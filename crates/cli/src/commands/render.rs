//! Plain-text rendering of the cart surfaces.

use std::fmt::Write as _;

use modmarket_cart::CartEngine;
use modmarket_cart::surfaces::{
    CartBadge, CartDrawer, DrawerHandle, DrawerView, FloatingCartButton, IntentOutcome,
    SurfaceView,
};

const SIGN_IN: &str = "Sign in to use your cart (set MODMARKET_USER_ID and MODMARKET_SESSION_TOKEN).";

/// Every surface the terminal shows, sharing one drawer.
#[derive(Clone)]
pub struct Surfaces {
    pub badge: CartBadge,
    pub button: FloatingCartButton,
    pub drawer: CartDrawer,
}

impl Surfaces {
    pub fn new(engine: &CartEngine, handle: &DrawerHandle) -> Self {
        Self {
            badge: CartBadge::new(engine.clone()),
            button: FloatingCartButton::new(engine.clone(), handle.clone()),
            drawer: CartDrawer::new(engine.clone(), handle.clone()),
        }
    }

    /// Badge and floating button on one line, then the drawer if open.
    pub fn render(&self) -> String {
        let (SurfaceView::Cart(badge), SurfaceView::Cart(button)) =
            (self.badge.render(), self.button.render())
        else {
            return SIGN_IN.to_string();
        };

        let mut out = format!("{badge}  ({} items, {})", button.count, button.total);
        if button.is_pending {
            out.push_str("  updating…");
        }
        if let SurfaceView::Cart(drawer) = self.drawer.render() {
            if drawer.open {
                out.push('\n');
                out.push_str(&drawer_text(&drawer));
            } else if let Some(notice) = &drawer.notice {
                let _ = write!(out, "\n! {}", notice.message);
            }
        }
        out
    }
}

/// The drawer body: lines, total and any notice.
pub fn drawer_text(view: &DrawerView) -> String {
    let mut out = String::new();
    if view.is_loading {
        out.push_str("Loading cart…\n");
    } else if view.lines.is_empty() {
        out.push_str("Your cart is empty.\n");
    }
    for line in &view.lines {
        let _ = write!(out, "  #{:<5} {:<32} {:>10}", line.mod_id, line.title, line.price);
        if let Some(original) = &line.original_price {
            let _ = write!(out, " (was {original})");
        }
        out.push('\n');
    }
    let _ = write!(out, "  Total: {}", view.total);
    if let Some(notice) = &view.notice {
        let _ = write!(out, "\n! {} (type `dismiss` to hide)", notice.message);
    }
    out
}

/// One-line summary of an intent.
pub fn outcome_text(outcome: &IntentOutcome) -> String {
    match outcome {
        IntentOutcome::Applied => "Done.".to_string(),
        IntentOutcome::Unchanged => "Nothing to change.".to_string(),
        IntentOutcome::Ignored => "Busy; try again in a moment.".to_string(),
        IntentOutcome::SignInRequired => SIGN_IN.to_string(),
        IntentOutcome::Failed(e) => format!("Failed: {e}"),
    }
}
