//! Modmarket Core - Shared types library.
//!
//! This crate provides the types shared by the cart engine and its front ends:
//! - `modmarket-cart` - The cart consistency engine (cache, mutation sequencer, surfaces)
//! - `modmarket-cli` - Terminal front end for the engine
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no async runtime, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, catalog snapshots and cart snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
