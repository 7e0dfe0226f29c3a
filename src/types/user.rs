use serde::{Deserialize, Serialize};

/// A Campfire user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Numeric user id.
    pub id: u64,

    /// Display name.
    pub name: String,

    /// Email address, when visible to the token.
    #[serde(default)]
    pub email_address: Option<String>,

    /// Whether the user administers the account.
    #[serde(default)]
    pub admin: bool,
}

/// Envelope returned by `users/me.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnvelope {
    /// The wrapped user.
    pub user: User,
}
