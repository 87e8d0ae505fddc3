//! Derived cart view.
//!
//! `count` and `total` are computed from the item list on every access and
//! never stored, so they cannot drift from the snapshot they describe.

use modmarket_core::{CartItem, CartSnapshot, Price};

/// Count and total for a set of cart items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    pub count: usize,
    pub total: Price,
}

impl CartTotals {
    /// Compute totals for `items`.
    ///
    /// Each item contributes its discount price when present, else its
    /// regular price.
    #[must_use]
    pub fn from_items(items: &[CartItem]) -> Self {
        Self {
            count: items.len(),
            total: items
                .iter()
                .map(|item| item.mod_snapshot.effective_price())
                .sum(),
        }
    }

    /// Compute totals for a snapshot.
    #[must_use]
    pub fn of(snapshot: &CartSnapshot) -> Self {
        Self::from_items(&snapshot.items)
    }
}
