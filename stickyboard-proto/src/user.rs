//! Account identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user account (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new time-ordered user identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `UserId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed-in (or signed-up) account as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier; owner of every task the user creates.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Name shown in the UI.
    pub display_name: String,
}

impl User {
    /// Returns the display name to use when none was given at sign-up:
    /// the local part of the email address.
    #[must_use]
    pub fn default_display_name(email: &str) -> String {
        email.split('@').next().unwrap_or(email).to_string()
    }
}
