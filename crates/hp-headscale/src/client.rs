// client.rs — HTTP client for the coordination server's `/api/v1`.
//
// One `HeadscaleClient` is shared for the life of the process; each request
// is made through a short-lived `ApiSession` that carries the caller's API
// key, so the root key and per-user keys never mix.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::HeadscaleError;
use crate::types::{ApiKey, PreAuthKey, User};

pub type Result<T> = std::result::Result<T, HeadscaleError>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client bound to one coordination server.
#[derive(Debug, Clone)]
pub struct HeadscaleClient {
    http: reqwest::Client,
    base: String,
}

impl HeadscaleClient {
    /// Build a client for `base_url` (scheme and host, optional path prefix).
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(HeadscaleError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: format!("{}/api", trimmed),
        })
    }

    /// The base URL requests are sent to, including the `/api` prefix.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Borrow the client with an API key for a series of calls.
    pub fn session<'a>(&'a self, api_key: &'a str) -> ApiSession<'a> {
        ApiSession {
            client: self,
            api_key,
        }
    }
}

/// Request body for creating a pre-auth key.
///
/// `user` and `acl_tags` are omitted from the JSON body when unset; tag-only
/// keys must not send a `user` field at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePreAuthKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub ephemeral: bool,
    pub reusable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl_tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Deserialize)]
struct UserResponse {
    user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreAuthKeysResponse {
    #[serde(default)]
    pre_auth_keys: Vec<PreAuthKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreAuthKeyResponse {
    pre_auth_key: PreAuthKey,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeysResponse {
    #[serde(default)]
    api_keys: Vec<ApiKey>,
}

#[derive(Deserialize)]
struct Empty {}

/// A client paired with the API key to authenticate with.
#[derive(Debug, Clone, Copy)]
pub struct ApiSession<'a> {
    client: &'a HeadscaleClient,
    api_key: &'a str,
}

impl<'a> ApiSession<'a> {
    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.client.base, path);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.api_key)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("{} {} failed with {}", method, url, status);
            return Err(HeadscaleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.call::<(), T>(Method::GET, path, query, None).await
    }

    /// List users, optionally filtered by exact name.
    pub async fn get_users(&self, name: Option<&str>) -> Result<Vec<User>> {
        let query: Vec<(&str, &str)> = name.map(|n| ("name", n)).into_iter().collect();
        let res: UsersResponse = self.get("v1/user", &query).await?;
        Ok(res.users)
    }

    pub async fn create_user(
        &self,
        name: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'b> {
            name: &'b str,
            #[serde(skip_serializing_if = "Option::is_none")]
            display_name: Option<&'b str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            email: Option<&'b str>,
        }

        let body = Body {
            name,
            display_name,
            email,
        };
        let res: UserResponse = self
            .call(Method::POST, "v1/user", &[], Some(&body))
            .await?;
        Ok(res.user)
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        let _: Empty = self
            .call::<(), _>(Method::DELETE, &format!("v1/user/{}", id), &[], None)
            .await?;
        Ok(())
    }

    pub async fn rename_user(&self, id: &str, new_name: &str) -> Result<User> {
        let path = format!("v1/user/{}/rename/{}", id, new_name);
        let res: UserResponse = self.call::<(), _>(Method::POST, &path, &[], None).await?;
        Ok(res.user)
    }

    /// Pre-auth keys belonging to one user (by ID).
    pub async fn get_pre_auth_keys(&self, user: &str) -> Result<Vec<PreAuthKey>> {
        let res: PreAuthKeysResponse = self.get("v1/preauthkey", &[("user", user)]).await?;
        Ok(res.pre_auth_keys)
    }

    /// Every pre-auth key, including tag-only keys with no user.
    pub async fn get_all_pre_auth_keys(&self) -> Result<Vec<PreAuthKey>> {
        let res: PreAuthKeysResponse = self.get("v1/preauthkey", &[]).await?;
        Ok(res.pre_auth_keys)
    }

    pub async fn create_pre_auth_key(&self, request: &CreatePreAuthKey) -> Result<PreAuthKey> {
        let res: PreAuthKeyResponse = self
            .call(Method::POST, "v1/preauthkey", &[], Some(request))
            .await?;
        Ok(res.pre_auth_key)
    }

    pub async fn expire_pre_auth_key(&self, user: &str, key: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Body<'b> {
            user: &'b str,
            key: &'b str,
        }

        let _: Empty = self
            .call(
                Method::POST,
                "v1/preauthkey/expire",
                &[],
                Some(&Body { user, key }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_api_keys(&self) -> Result<Vec<ApiKey>> {
        let res: ApiKeysResponse = self.get("v1/apikey", &[]).await?;
        Ok(res.api_keys)
    }

    /// Whether the server accepts this session's API key.
    ///
    /// A 401/403 answer is `Ok(false)`; any other failure is an error.
    pub async fn check_api_key(&self) -> Result<bool> {
        match self.get_api_keys().await {
            Ok(_) => Ok(true),
            Err(HeadscaleError::Api { status, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_urls_without_scheme() {
        assert!(matches!(
            HeadscaleClient::new("headscale:8080"),
            Err(HeadscaleError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = HeadscaleClient::new("http://headscale:8080/").unwrap();
        assert_eq!(client.base(), "http://headscale:8080/api");
    }

    #[test]
    fn tag_only_key_body_omits_user() {
        let body = CreatePreAuthKey {
            user: None,
            ephemeral: false,
            reusable: true,
            expiration: None,
            acl_tags: Some(vec!["tag:server".into()]),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("user").is_none());
        assert_eq!(json["aclTags"][0], "tag:server");
    }

    #[test]
    fn user_key_body_omits_acl_tags() {
        let body = CreatePreAuthKey {
            user: Some("3".into()),
            ..CreatePreAuthKey::default()
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user"], "3");
        assert!(json.get("aclTags").is_none());
        assert_eq!(json["reusable"], false);
    }
}
