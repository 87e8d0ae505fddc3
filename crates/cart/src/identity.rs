//! Identity signal consumed by the cart engine.
//!
//! Authentication itself lives outside the engine. The session layer hands
//! the engine an [`Identity`]; the engine only needs the user id (to scope
//! snapshots) and the session credential (to authorize remote calls).

use std::fmt;

use modmarket_core::{IdentityScope, UserId};
use secrecy::{ExposeSecret, SecretString};

/// An authenticated session.
///
/// Implements `Debug` manually to redact the credential.
#[derive(Clone)]
pub struct Session {
    user_id: UserId,
    credential: SecretString,
}

impl Session {
    #[must_use]
    pub const fn new(user_id: UserId, credential: SecretString) -> Self {
        Self {
            user_id,
            credential,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.credential.expose_secret())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// The current authentication state.
#[derive(Debug, Clone, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(Session),
}

impl Identity {
    /// The scope snapshots fetched under this identity belong to.
    #[must_use]
    pub const fn scope(&self) -> IdentityScope {
        match self {
            Self::Anonymous => IdentityScope::Anonymous,
            Self::Authenticated(session) => IdentityScope::User(session.user_id),
        }
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(session) => Some(session),
        }
    }
}
