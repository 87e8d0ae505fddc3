//! Cart consistency engine for the mod marketplace storefront.
//!
//! Keeps one cart snapshot per identity in sync with the remote cart store and
//! shares it with every UI surface (badge, drawer, floating button, product
//! add buttons). Writes are pessimistic and write-through: a mutation goes to
//! the store first, and the snapshot only ever changes by re-fetching it.
//!
//! # Modules
//!
//! - [`cache`] - Snapshot cache with single-flight refresh
//! - [`sequencer`] - Serialized add/remove/clear with failure notices
//! - [`view`] - Derived count and total
//! - [`surfaces`] - Read-only surfaces and their intents
//! - [`engine`] - Façade wiring the above together
//! - [`remote`] / [`catalog`] - Boundary traits and their HTTP adapters

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod remote;
pub mod sequencer;
pub mod surfaces;
pub mod view;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::CartState;
pub use config::{CartConfig, CartTimeouts, CatalogCacheConfig, ConfigError};
pub use engine::{BuildError, CartEngine, CartSubscription, EngineClosed};
pub use error::{CartError, Result};
pub use identity::{Identity, Session};
pub use sequencer::{CartNotice, MutationKind, MutationOutcome, NoticeKind};
pub use view::CartTotals;
