//! Cart surfaces.
//!
//! Each surface is a read-only view over a [`CartEngine`] plus the intents it
//! can route to the sequencer. Rendering never touches the network, and every
//! surface renders [`SurfaceView::SignIn`] for an anonymous identity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use modmarket_core::{CartItem, ModId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::engine::CartEngine;
use crate::error::{CartError, Result};
use crate::sequencer::{CartNotice, MutationOutcome};

/// What a surface shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceView<T> {
    /// Sign-in call to action.
    SignIn,
    Cart(T),
}

impl<T> SurfaceView<T> {
    #[must_use]
    pub fn cart(self) -> Option<T> {
        match self {
            Self::SignIn => None,
            Self::Cart(view) => Some(view),
        }
    }
}

/// How an intent played out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    Unchanged,
    /// The control was disabled; nothing was sent.
    Ignored,
    SignInRequired,
    /// The engine raised a notice for this failure.
    Failed(CartError),
}

impl IntentOutcome {
    fn from_result(result: Result<MutationOutcome>) -> Self {
        match result {
            Ok(MutationOutcome::Applied(_)) => Self::Applied,
            Ok(MutationOutcome::Unchanged(_)) => Self::Unchanged,
            Err(e) if e.is_busy() => Self::Ignored,
            Err(e) if e.requires_sign_in() => Self::SignInRequired,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Shared open/closed flag for the drawer.
#[derive(Clone)]
pub struct DrawerHandle {
    open: Arc<watch::Sender<bool>>,
}

impl Default for DrawerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawerHandle {
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    pub fn open(&self) {
        self.open.send_if_modified(|open| !std::mem::replace(open, true));
    }

    pub fn close(&self) {
        self.open.send_if_modified(|open| std::mem::replace(open, false));
    }

    /// Flip the drawer, returning whether it is now open.
    pub fn toggle(&self) -> bool {
        self.open.send_modify(|open| *open = !*open);
        self.is_open()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.open.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeView {
    pub count: usize,
    pub is_loading: bool,
    pub is_pending: bool,
}

impl fmt::Display for BadgeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_loading {
            f.write_str("[cart …]")
        } else {
            write!(f, "[cart {}]", self.count)
        }
    }
}

/// Navbar item count.
#[derive(Clone)]
pub struct CartBadge {
    engine: CartEngine,
}

impl CartBadge {
    #[must_use]
    pub const fn new(engine: CartEngine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn render(&self) -> SurfaceView<BadgeView> {
        if !self.engine.identity_scope().is_authenticated() {
            return SurfaceView::SignIn;
        }
        let state = self.engine.read();
        SurfaceView::Cart(BadgeView {
            count: state.totals().count,
            is_loading: state.is_loading,
            is_pending: self.engine.is_pending(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingButtonView {
    pub count: usize,
    pub total: String,
    pub is_pending: bool,
}

/// Persistent floating cart button; clicking it toggles the drawer.
#[derive(Clone)]
pub struct FloatingCartButton {
    engine: CartEngine,
    drawer: DrawerHandle,
}

impl FloatingCartButton {
    #[must_use]
    pub const fn new(engine: CartEngine, drawer: DrawerHandle) -> Self {
        Self { engine, drawer }
    }

    #[must_use]
    pub fn render(&self) -> SurfaceView<FloatingButtonView> {
        if !self.engine.identity_scope().is_authenticated() {
            return SurfaceView::SignIn;
        }
        let totals = self.engine.totals();
        SurfaceView::Cart(FloatingButtonView {
            count: totals.count,
            total: totals.total.display(),
            is_pending: self.engine.is_pending(),
        })
    }

    pub fn click(&self) -> IntentOutcome {
        if !self.engine.identity_scope().is_authenticated() {
            return IntentOutcome::SignInRequired;
        }
        let open = self.drawer.toggle();
        debug!(open, "Cart drawer toggled");
        IntentOutcome::Applied
    }
}

/// One drawer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerLine {
    pub mod_id: ModId,
    pub title: String,
    pub category: String,
    pub thumbnail_url: Option<String>,
    /// Price actually charged.
    pub price: String,
    /// Regular price, when a discount applies.
    pub original_price: Option<String>,
}

impl From<&CartItem> for DrawerLine {
    fn from(item: &CartItem) -> Self {
        let snapshot = &item.mod_snapshot;
        Self {
            mod_id: item.mod_id,
            title: snapshot.title.clone(),
            category: snapshot.category.clone(),
            thumbnail_url: snapshot.thumbnail_url.clone(),
            price: snapshot.effective_price().display(),
            original_price: snapshot.is_discounted().then(|| snapshot.price.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerView {
    pub open: bool,
    pub lines: Vec<DrawerLine>,
    pub count: usize,
    pub total: String,
    pub is_loading: bool,
    pub is_pending: bool,
    pub notice: Option<CartNotice>,
}

/// Slide-out cart drawer.
#[derive(Clone)]
pub struct CartDrawer {
    engine: CartEngine,
    drawer: DrawerHandle,
}

impl CartDrawer {
    #[must_use]
    pub const fn new(engine: CartEngine, drawer: DrawerHandle) -> Self {
        Self { engine, drawer }
    }

    #[must_use]
    pub fn handle(&self) -> &DrawerHandle {
        &self.drawer
    }

    #[must_use]
    pub fn render(&self) -> SurfaceView<DrawerView> {
        if !self.engine.identity_scope().is_authenticated() {
            return SurfaceView::SignIn;
        }
        let state = self.engine.read();
        let totals = state.totals();
        SurfaceView::Cart(DrawerView {
            open: self.drawer.is_open(),
            lines: state.snapshot.items.iter().map(DrawerLine::from).collect(),
            count: totals.count,
            total: totals.total.display(),
            is_loading: state.is_loading,
            is_pending: self.engine.is_pending(),
            notice: self.engine.notice(),
        })
    }

    /// Remove one line.
    pub async fn remove(&self, mod_id: ModId) -> IntentOutcome {
        if self.engine.is_pending() {
            return IntentOutcome::Ignored;
        }
        IntentOutcome::from_result(self.engine.remove(mod_id).await)
    }

    /// Empty the cart.
    pub async fn clear(&self) -> IntentOutcome {
        if self.engine.is_pending() {
            return IntentOutcome::Ignored;
        }
        IntentOutcome::from_result(self.engine.clear().await)
    }

    pub fn dismiss_notice(&self) {
        self.engine.dismiss_notice();
    }
}

/// Rendering of a per-product add button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddButtonState {
    SignIn,
    Add,
    Added,
    /// A mutation is in flight or the cart is not loaded yet; disabled.
    Working,
}

impl fmt::Display for AddButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SignIn => "Sign in to buy",
            Self::Add => "Add to cart",
            Self::Added => "In cart",
            Self::Working => "Working…",
        })
    }
}

/// "Add to cart" control on a product card.
#[derive(Clone)]
pub struct AddToCartControl {
    engine: CartEngine,
    mod_id: ModId,
}

impl AddToCartControl {
    #[must_use]
    pub const fn new(engine: CartEngine, mod_id: ModId) -> Self {
        Self { engine, mod_id }
    }

    #[must_use]
    pub fn state(&self) -> AddButtonState {
        if !self.engine.identity_scope().is_authenticated() {
            return AddButtonState::SignIn;
        }
        let state = self.engine.read();
        if self.engine.is_pending() || state.is_loading {
            AddButtonState::Working
        } else if state.contains(self.mod_id) {
            AddButtonState::Added
        } else {
            AddButtonState::Add
        }
    }

    pub async fn press(&self) -> IntentOutcome {
        match self.state() {
            AddButtonState::SignIn => IntentOutcome::SignInRequired,
            AddButtonState::Added | AddButtonState::Working => IntentOutcome::Ignored,
            AddButtonState::Add => IntentOutcome::from_result(self.engine.add(self.mod_id).await),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyChordError {
    #[error("empty key chord")]
    Empty,
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),
    #[error("key must be a single character: {0}")]
    InvalidKey(String),
}

/// A key plus modifiers, e.g. `Ctrl+K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub key: char,
}

impl KeyChord {
    #[must_use]
    pub const fn ctrl(key: char) -> Self {
        Self {
            ctrl: true,
            alt: false,
            shift: false,
            key: key.to_ascii_lowercase(),
        }
    }
}

impl FromStr for KeyChord {
    type Err = KeyChordError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty()).ok_or(KeyChordError::Empty)?;

        let mut chars = key.chars();
        let (Some(key), None) = (chars.next(), chars.next()) else {
            return Err(KeyChordError::InvalidKey(key.to_string()));
        };

        let mut chord = Self {
            ctrl: false,
            alt: false,
            shift: false,
            key: key.to_ascii_lowercase(),
        };
        for modifier in parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" | "meta" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                _ => return Err(KeyChordError::UnknownModifier(modifier.to_string())),
            }
        }
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key.to_ascii_uppercase())
    }
}

/// Global shortcut that toggles the drawer.
#[derive(Clone)]
pub struct DrawerShortcut {
    chord: KeyChord,
    drawer: DrawerHandle,
}

impl DrawerShortcut {
    /// Bind `Ctrl+K`.
    #[must_use]
    pub fn new(drawer: DrawerHandle) -> Self {
        Self::with_chord(KeyChord::ctrl('k'), drawer)
    }

    #[must_use]
    pub const fn with_chord(chord: KeyChord, drawer: DrawerHandle) -> Self {
        Self { chord, drawer }
    }

    #[must_use]
    pub const fn chord(&self) -> KeyChord {
        self.chord
    }

    /// Toggle the drawer if `pressed` matches. Returns whether it was handled.
    pub fn handle(&self, pressed: KeyChord) -> bool {
        let matches = KeyChord {
            key: pressed.key.to_ascii_lowercase(),
            ..pressed
        } == self.chord;
        if matches {
            self.drawer.toggle();
        }
        matches
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use modmarket_core::ModId;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::identity::Identity;
    use crate::remote::StoreError;
    use crate::testing::{self, MemoryCartStore, MemoryCatalog, session};

    async fn signed_in(store: MemoryCartStore) -> (Arc<MemoryCartStore>, CartEngine) {
        let store = Arc::new(store);
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));
        engine.refresh().await.unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn test_anonymous_surfaces_render_sign_in() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        let drawer = DrawerHandle::new();

        assert_eq!(CartBadge::new(engine.clone()).render(), SurfaceView::SignIn);
        assert_eq!(
            CartDrawer::new(engine.clone(), drawer.clone()).render(),
            SurfaceView::SignIn
        );
        let button = FloatingCartButton::new(engine.clone(), drawer.clone());
        assert_eq!(button.render(), SurfaceView::SignIn);
        assert_eq!(button.click(), IntentOutcome::SignInRequired);
        assert!(!drawer.is_open());

        let control = AddToCartControl::new(engine, ModId::new(42));
        assert_eq!(control.state(), AddButtonState::SignIn);
        assert_eq!(control.press().await, IntentOutcome::SignInRequired);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_control_tracks_presence() {
        let (store, engine) = signed_in(MemoryCartStore::new()).await;
        let control = AddToCartControl::new(engine.clone(), ModId::new(42));
        let badge = CartBadge::new(engine);

        assert_eq!(control.state(), AddButtonState::Add);
        assert_eq!(control.press().await, IntentOutcome::Applied);
        assert_eq!(control.state(), AddButtonState::Added);
        assert_eq!(control.press().await, IntentOutcome::Ignored);
        assert_eq!(badge.render().cart().unwrap().count, 1);
        assert_eq!(store.mutation_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_add_control_is_working_before_first_load() {
        let store = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::standard());
        let engine = testing::engine(&store, &catalog);
        engine.set_identity(session(1));

        let control = AddToCartControl::new(engine.clone(), ModId::new(42));
        assert_eq!(control.state(), AddButtonState::Working);
        assert_eq!(
            CartBadge::new(engine).render().cart().unwrap().to_string(),
            "[cart …]"
        );
    }

    #[tokio::test]
    async fn test_drawer_lines_show_discounts() {
        let (_store, engine) = signed_in(MemoryCartStore::new().with_cart(1, &[42, 7])).await;
        let drawer = CartDrawer::new(engine, DrawerHandle::new());

        let view = drawer.render().cart().unwrap();
        assert_eq!(view.count, 2);
        assert_eq!(view.total, "$12.50");
        assert_eq!(view.lines[0].price, "$10.00");
        assert_eq!(view.lines[0].original_price, None);
        assert_eq!(view.lines[1].title, "Night Sky");
        assert_eq!(view.lines[1].price, "$2.50");
        assert_eq!(view.lines[1].original_price.as_deref(), Some("$5.00"));
    }

    #[tokio::test]
    async fn test_drawer_failure_shows_notice() {
        let (store, engine) = signed_in(MemoryCartStore::new().with_cart(1, &[42])).await;
        let drawer = CartDrawer::new(engine, DrawerHandle::new());

        store.fail_next(StoreError::Status {
            status: 500,
            body: "boom".to_string(),
        });
        let outcome = drawer.clear().await;

        assert!(matches!(outcome, IntentOutcome::Failed(CartError::Network(_))));
        let view = drawer.render().cart().unwrap();
        assert_eq!(view.count, 1);
        assert!(view.notice.is_some());

        drawer.dismiss_notice();
        assert_eq!(drawer.render().cart().unwrap().notice, None);
    }

    #[tokio::test]
    async fn test_floating_button_and_shortcut_share_drawer() {
        let (_store, engine) = signed_in(MemoryCartStore::new().with_cart(1, &[13])).await;
        let handle = DrawerHandle::new();
        let button = FloatingCartButton::new(engine.clone(), handle.clone());
        let drawer = CartDrawer::new(engine.clone(), handle.clone());
        let shortcut = DrawerShortcut::new(handle);

        assert_eq!(
            button.render(),
            SurfaceView::Cart(FloatingButtonView {
                count: 1,
                total: "$3.99".to_string(),
                is_pending: false,
            })
        );
        assert_eq!(button.click(), IntentOutcome::Applied);
        assert!(drawer.render().cart().unwrap().open);

        assert!(!shortcut.handle("Ctrl+J".parse().unwrap()));
        assert!(shortcut.handle("ctrl+K".parse().unwrap()));
        assert!(!drawer.handle().is_open());

        engine.set_identity(Identity::Anonymous);
        assert_eq!(button.click(), IntentOutcome::SignInRequired);
    }

    #[test]
    fn test_key_chord_parse_and_display() {
        let chord: KeyChord = "Ctrl + Shift + p".parse().unwrap();
        assert!(chord.ctrl && chord.shift && !chord.alt);
        assert_eq!(chord.to_string(), "Ctrl+Shift+P");
        assert_eq!(KeyChord::ctrl('K').to_string(), "Ctrl+K");

        assert_eq!("".parse::<KeyChord>(), Err(KeyChordError::Empty));
        assert_eq!(
            "Hyper+K".parse::<KeyChord>(),
            Err(KeyChordError::UnknownModifier("Hyper".to_string()))
        );
        assert_eq!(
            "Ctrl+Esc".parse::<KeyChord>(),
            Err(KeyChordError::InvalidKey("Esc".to_string()))
        );
    }

    #[test]
    fn test_drawer_handle_toggle() {
        let drawer = DrawerHandle::default();
        let mut rx = drawer.subscribe();
        assert!(drawer.toggle());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        drawer.open();
        assert!(!rx.has_changed().unwrap());
        drawer.close();
        assert!(!drawer.is_open());
    }
}
