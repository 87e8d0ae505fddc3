//! Cart snapshot types.
//!
//! A [`CartSnapshot`] is the value every cart surface renders from. Items carry
//! a denormalized [`ModSnapshot`] resolved from the catalog at fetch time; the
//! snapshot is replaced wholesale on every fetch and never edited in place.

use serde::{Deserialize, Serialize};

use super::id::{CartEntryId, ModId, UserId};
use super::price::Price;

/// Catalog fields a cart line needs for pricing and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSnapshot {
    pub title: String,
    pub price: Price,
    pub discount_price: Option<Price>,
    pub thumbnail_url: Option<String>,
    pub category: String,
}

impl ModSnapshot {
    /// The price the buyer pays: the discount price when present, else the
    /// regular price.
    #[must_use]
    pub fn effective_price(&self) -> Price {
        self.discount_price.unwrap_or(self.price)
    }

    /// Whether a discount applies.
    #[must_use]
    pub const fn is_discounted(&self) -> bool {
        self.discount_price.is_some()
    }
}

/// One entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub entry_id: CartEntryId,
    pub mod_id: ModId,
    pub mod_snapshot: ModSnapshot,
}

/// Which identity a cart snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "userId", rename_all = "camelCase")]
pub enum IdentityScope {
    /// No authenticated user; the cart is always empty.
    #[default]
    Anonymous,
    /// An authenticated user.
    User(UserId),
}

impl IdentityScope {
    /// The user, if authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(*id),
        }
    }

    /// Whether this scope denotes an authenticated user.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// The canonical cart contents for one identity.
///
/// Item order is the order the remote store returned; it is not guaranteed
/// stable across fetches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub identity_scope: IdentityScope,
}

impl CartSnapshot {
    /// An empty snapshot for `scope`.
    #[must_use]
    pub const fn empty(scope: IdentityScope) -> Self {
        Self {
            items: Vec::new(),
            identity_scope: scope,
        }
    }

    /// Build a snapshot, keeping only the first entry for each mod.
    ///
    /// The store is itself idempotent on duplicate adds, so a repeated mod
    /// indicates a store bug; dropping the duplicate keeps counts and totals
    /// honest.
    #[must_use]
    pub fn from_items(scope: IdentityScope, items: Vec<CartItem>) -> Self {
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.mod_id))
            .collect();
        Self {
            items,
            identity_scope: scope,
        }
    }

    /// Whether the cart holds an entry for `mod_id`.
    #[must_use]
    pub fn contains(&self, mod_id: ModId) -> bool {
        self.items.iter().any(|item| item.mod_id == mod_id)
    }

    /// The entry for `mod_id`, if present.
    #[must_use]
    pub fn item(&self, mod_id: ModId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.mod_id == mod_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
