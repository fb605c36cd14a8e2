use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// A single to-do record. The `done`/`deleted`/`hidden`/`pinned` flags are
/// nullable timestamps rather than booleans so the record keeps *when* each
/// one was toggled; the clean-slate undo relies on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub text: String,
    pub notes: Option<String>,
    pub context: Option<String>,
    pub created: i64,
    pub modified: i64,
    pub done: Option<i64>,
    pub deleted: Option<i64>,
    pub hidden: Option<i64>,
    pub pinned: Option<i64>,
    /// Server-assigned revision, managed by the sync layer.
    pub last_modified: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub text: String,
    pub notes: Option<String>,
    pub context: Option<String>,
}

/// Content edit payload. Deliberately has no `last_modified` field, so a
/// client can never overwrite the store-managed revision.
#[derive(Debug, Clone, Deserialize)]
pub struct EditContent {
    pub text: String,
    pub notes: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextCount {
    pub name: String,
    pub count: i64,
}

/// List query. An absent or empty `context` means no filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetTokenRequest {
    pub access_token: String,
}

// Wire types for the remote collection service.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub since: Option<i64>,
    pub changes: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub ok: bool,
    pub last_modified: i64,
    /// Server copies of the pushes it accepted, carrying fresh revisions.
    #[serde(default)]
    pub published: Vec<Item>,
    /// Remote-side changes for the client to import.
    #[serde(default)]
    pub changes: Vec<Item>,
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
}

/// A record changed on both sides since the last sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConflict {
    pub local: Item,
    pub remote: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub id: String,
    pub resolution: String,
    pub record: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub openid: Option<OpenIdCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdCapability {
    pub providers: Vec<Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub auth_path: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}
