// discovery.rs — OpenID Connect discovery, validation and the code flow.
//
// `DiscoveryValidator` fetches `<issuer>/.well-known/openid-configuration`
// with an explicit timeout and checks that the provider can serve the
// authorization code flow with the configured client auth method. The same
// client then drives the login: authorization URL, code exchange, userinfo.

use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Url;
use serde::Deserialize;

use crate::error::OidcError;
use crate::oidc::{OidcDescriptor, OidcValidation, OidcValidator};
use crate::session::SessionUser;

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const SCOPES: &str = "openid profile email";

/// The parts of the discovery document the console uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
}

impl ProviderMetadata {
    fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, OidcError> {
        field
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OidcError::Discovery(format!("missing {}", name)))
    }

    pub fn authorization_endpoint(&self) -> Result<&str, OidcError> {
        Self::require(&self.authorization_endpoint, "authorization_endpoint")
    }

    pub fn token_endpoint(&self) -> Result<&str, OidcError> {
        Self::require(&self.token_endpoint, "token_endpoint")
    }

    pub fn userinfo_endpoint(&self) -> Result<&str, OidcError> {
        Self::require(&self.userinfo_endpoint, "userinfo_endpoint")
    }

    /// Providers that do not list auth methods accept the default.
    pub fn supports_auth_method(&self, method: &str) -> bool {
        match &self.token_endpoint_auth_methods_supported {
            Some(methods) => methods.iter().any(|m| m == method),
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Random value for the `state` parameter.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Discovery-backed validator and login client.
#[derive(Debug, Clone)]
pub struct DiscoveryValidator {
    http: reqwest::Client,
}

impl DiscoveryValidator {
    pub fn new() -> Result<Self, OidcError> {
        let http = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Fetch the provider's discovery document.
    pub async fn discover(&self, issuer: &str) -> Result<ProviderMetadata, OidcError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        tracing::debug!("Fetching OIDC discovery document from {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(OidcError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// URL to send the browser to for login.
    pub fn authorization_url(
        &self,
        descriptor: &OidcDescriptor,
        metadata: &ProviderMetadata,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, OidcError> {
        let endpoint = metadata.authorization_endpoint()?;
        let mut url =
            Url::parse(endpoint).map_err(|_| OidcError::InvalidUrl(endpoint.to_string()))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &descriptor.client)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(
        &self,
        descriptor: &OidcDescriptor,
        metadata: &ProviderMetadata,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, OidcError> {
        let endpoint = metadata.token_endpoint()?;
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let mut request = self.http.post(endpoint);
        if descriptor.method == "client_secret_post" {
            form.push(("client_id", descriptor.client.as_str()));
            form.push(("client_secret", descriptor.secret.as_str()));
        } else {
            request = request.basic_auth(&descriptor.client, Some(&descriptor.secret));
        }

        let response = request.form(&form).send().await?;
        if !response.status().is_success() {
            return Err(OidcError::Status {
                url: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Look up the signed-in user with an access token.
    pub async fn userinfo(
        &self,
        metadata: &ProviderMetadata,
        access_token: &str,
    ) -> Result<SessionUser, OidcError> {
        let endpoint = metadata.userinfo_endpoint()?;
        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OidcError::Status {
                url: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let info: UserInfo = response.json().await?;
        let name = info
            .name
            .or(info.preferred_username.clone())
            .or(info.email.clone())
            .unwrap_or_else(|| info.sub.clone());
        Ok(SessionUser {
            subject: info.sub,
            name,
            email: info.email,
            username: info.preferred_username,
            picture: info.picture,
        })
    }

    /// Complete a login: discovery, code exchange, userinfo.
    pub async fn login(
        &self,
        descriptor: &OidcDescriptor,
        code: &str,
        redirect_uri: &str,
    ) -> Result<SessionUser, OidcError> {
        let metadata = self.discover(&descriptor.issuer).await?;
        let token = self
            .exchange_code(descriptor, &metadata, code, redirect_uri)
            .await?;
        self.userinfo(&metadata, &token).await
    }
}

#[async_trait]
impl OidcValidator for DiscoveryValidator {
    async fn validate(&self, descriptor: &OidcDescriptor) -> OidcValidation {
        let metadata = match self.discover(&descriptor.issuer).await {
            Ok(metadata) => metadata,
            Err(e) => return OidcValidation::Invalid(e.to_string()),
        };

        if let Err(e) = metadata
            .authorization_endpoint()
            .and(metadata.token_endpoint())
        {
            return OidcValidation::Invalid(e.to_string());
        }

        if !metadata.supports_auth_method(&descriptor.method) {
            return OidcValidation::Invalid(format!(
                "token endpoint does not support auth method {}",
                descriptor.method
            ));
        }

        OidcValidation::Valid
    }
}
