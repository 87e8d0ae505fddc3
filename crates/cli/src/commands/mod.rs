//! CLI commands.

pub mod cart;
pub mod render;
pub mod shell;

use modmarket_cart::{BuildError, CartError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The engine could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// The drawer shortcut could not be parsed.
    #[error("Invalid shortcut: {0}")]
    Shortcut(#[from] modmarket_cart::surfaces::KeyChordError),

    /// Reading from the terminal failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
