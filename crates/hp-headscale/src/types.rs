// types.rs — Wire types returned by the coordination server's `/api/v1`.
//
// Field names follow the server's JSON (camelCase). Numeric IDs arrive as
// strings and stay strings; timestamps stay RFC 3339 strings because the
// console only displays them.

use serde::{Deserialize, Serialize};

/// A tailnet user.
///
/// Users created through OIDC may have an empty `name`; `id` is the only
/// field the server always fills in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A pre-authentication key.
///
/// `user` is `None` for tag-only keys (coordination server 0.28+).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreAuthKey {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub acl_tags: Vec<String>,
}

/// An API key as listed by the server (the secret part is never returned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub prefix: String,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
}
