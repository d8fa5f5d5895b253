use serde::Deserialize;

// ---------------------------------------------------------------------------
// Current user
// ---------------------------------------------------------------------------

/// The user a client is authenticated as (`GET /user`).
///
/// Only `id` and `username` are guaranteed; the rest depends on the server
/// version and on the token's scopes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}
