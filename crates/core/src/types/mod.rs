//! Core types for the mod marketplace.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;

pub use cart::{CartItem, CartSnapshot, IdentityScope, ModSnapshot};
pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
