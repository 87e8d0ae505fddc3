//! Typed identifiers.
//!
//! Users and mods are both numbered by the marketplace, so each gets its own
//! newtype to keep a `UserId` from ever being passed where a `ModId` belongs.
//! Cart entries are numbered by the cart store and stay opaque strings.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Declares an `i32`-backed identifier type.
///
/// The generated type is `Copy`, ordered, hashable, serializes as a bare
/// number, displays as a bare number (so it can be dropped into URL paths) and
/// parses from a string with surrounding whitespace ignored. Doc comments and
/// other attributes before the name are forwarded to the struct.
///
/// ```rust
/// # use modmarket_core::define_id;
/// define_id!(
///     /// A review left on a mod page.
///     ReviewId
/// );
///
/// let id: ReviewId = " 12 ".parse().unwrap();
/// assert_eq!(id.as_i32(), 12);
/// assert_eq!(id.to_string(), "12");
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(::serde::Serialize, ::serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(raw: i32) -> Self {
                Self(raw)
            }

            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl ::core::convert::From<i32> for $name {
            fn from(raw: i32) -> Self {
                Self(raw)
            }
        }

        impl ::core::convert::From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// A marketplace account.
    UserId
);
define_id!(
    /// A catalog listing.
    ModId
);

/// Identifier of one cart entry.
///
/// Assigned by the remote cart store when the entry is created. The client
/// never interprets it; it is only carried along for display keys and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartEntryId(String);

impl CartEntryId {
    /// Wrap a store-assigned entry identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CartEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
