// oidc.rs — Resolving the OIDC descriptor from the environment and config file.
//
// Resolution order:
//   1. A complete issuer/client/secret triple from the environment wins and
//      is validated unless OIDC_SKIP_CONFIG_VALIDATION=true.
//   2. Otherwise missing fields are backfilled from the config file's `oidc`
//      section (the secret may live in `client_secret_path`), and the result
//      is validated only if `only_start_if_oidc_is_available` is set.
//
// A failed validation turns OIDC off; it never aborts startup. An incomplete
// triple is fatal only when the environment supplied part of it.

use std::fmt;

use async_trait::async_trait;
use hp_config::{vars, ConfigFile, Environment, OidcSection};
use serde::Serialize;

use crate::error::ContextError;

pub const DEFAULT_AUTH_METHOD: &str = "client_secret_basic";

/// Where the issuer/client/secret triple came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OidcSource {
    Environment,
    ConfigFile,
}

/// Identity provider settings for federated login.
#[derive(Clone, PartialEq, Eq)]
pub struct OidcDescriptor {
    pub issuer: String,
    pub client: String,
    pub secret: String,
    pub redirect_uri: Option<String>,
    pub root_key: String,
    /// Token endpoint auth method, e.g. `client_secret_basic`.
    pub method: String,
    pub disable_key_login: bool,
    /// From the config section's `enabled`. Always true for an
    /// environment-sourced triple. Resolution does not look at it.
    pub enabled: bool,
    pub source: OidcSource,
}

// Secrets stay out of logs.
impl fmt::Debug for OidcDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcDescriptor")
            .field("issuer", &self.issuer)
            .field("client", &self.client)
            .field("secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("root_key", &"<redacted>")
            .field("method", &self.method)
            .field("disable_key_login", &self.disable_key_login)
            .field("enabled", &self.enabled)
            .field("source", &self.source)
            .finish()
    }
}

/// Outcome of checking a descriptor against the live provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcValidation {
    Valid,
    Invalid(String),
}

/// Checks that an identity provider is reachable and usable.
#[async_trait]
pub trait OidcValidator: Send + Sync {
    async fn validate(&self, descriptor: &OidcDescriptor) -> OidcValidation;
}

/// The API key used for server-side calls, `ROOT_API_KEY` before `API_KEY`.
pub fn resolve_root_key(env: &Environment) -> Result<String, ContextError> {
    tracing::debug!("Checking ROOT_API_KEY and falling back to API_KEY");
    env.get_non_empty(vars::ROOT_API_KEY)
        .or_else(|| env.get_non_empty(vars::API_KEY))
        .map(str::to_string)
        .ok_or(ContextError::MissingRootApiKey)
}

/// Resolve the OIDC descriptor, or `None` when OIDC is off.
///
/// `config` is the merged config (file plus environment overlay), if any.
pub async fn resolve_oidc(
    env: &Environment,
    config: Option<&ConfigFile>,
    root_key: &str,
    validator: &dyn OidcValidator,
) -> Result<Option<OidcDescriptor>, ContextError> {
    tracing::debug!("Checking OIDC configuration");

    let disable_key_login = env.flag(vars::DISABLE_API_KEY_LOGIN);
    tracing::debug!("API Key Login Enabled: {}", !disable_key_login);

    let method = env
        .get_non_empty(vars::OIDC_CLIENT_SECRET_METHOD)
        .unwrap_or(DEFAULT_AUTH_METHOD)
        .to_string();
    let skip = env.flag(vars::OIDC_SKIP_CONFIG_VALIDATION);

    let env_issuer = env.get_non_empty(vars::OIDC_ISSUER);
    let env_client = env.get_non_empty(vars::OIDC_CLIENT_ID);
    let env_secret = env.get_non_empty(vars::OIDC_CLIENT_SECRET);
    let env_redirect = env.get_non_empty(vars::OIDC_REDIRECT_URI);

    tracing::debug!("Issuer: {:?}", env_issuer);
    tracing::debug!("Client: {:?}", env_client);
    tracing::debug!("Token Auth Method: {}", method);

    let env_fields = [env_issuer, env_client, env_secret]
        .iter()
        .filter(|f| f.is_some())
        .count();

    if env_fields > 0 && env_fields < 3 && config.is_none() {
        return Err(ContextError::OidcEnvIncomplete);
    }

    if let (Some(issuer), Some(client), Some(secret)) = (env_issuer, env_client, env_secret) {
        let descriptor = OidcDescriptor {
            issuer: issuer.to_string(),
            client: client.to_string(),
            secret: secret.to_string(),
            redirect_uri: env_redirect.map(str::to_string),
            root_key: root_key.to_string(),
            method,
            disable_key_login,
            enabled: true,
            source: OidcSource::Environment,
        };

        if skip {
            tracing::debug!("OIDC_SKIP_CONFIG_VALIDATION is set, skipping validation");
            return Ok(Some(descriptor));
        }
        tracing::debug!("Validating OIDC configuration from environment variables");
        return Ok(validated(descriptor, validator).await);
    }

    let section = config.and_then(|c| c.oidc.as_ref());
    let issuer = env_issuer
        .map(str::to_string)
        .or_else(|| section.and_then(|s| non_empty(&s.issuer)));
    let client = env_client
        .map(str::to_string)
        .or_else(|| section.and_then(|s| non_empty(&s.client_id)));
    let secret = match env_secret {
        Some(secret) => Some(secret.to_string()),
        None => match section {
            Some(section) => section_secret(section).await,
            None => None,
        },
    };

    let (issuer, client, secret) = match (issuer, client, secret) {
        (Some(i), Some(c), Some(s)) => (i, c, s),
        (None, None, None) => {
            tracing::debug!("No OIDC configuration found");
            return Ok(None);
        }
        _ if env_fields > 0 => return Err(ContextError::OidcIncomplete),
        _ => {
            tracing::warn!("OIDC configuration in the config file is incomplete, OIDC is disabled");
            return Ok(None);
        }
    };

    let descriptor = OidcDescriptor {
        issuer,
        client,
        secret,
        redirect_uri: env_redirect
            .map(str::to_string)
            .or_else(|| section.and_then(|s| non_empty(&s.redirect_uri))),
        root_key: root_key.to_string(),
        method,
        disable_key_login,
        enabled: section.map(|s| s.enabled).unwrap_or(true),
        source: OidcSource::ConfigFile,
    };

    if section.is_some_and(|s| s.only_start_if_oidc_is_available) {
        tracing::debug!("Validating OIDC configuration from headscale config");
        Ok(validated(descriptor, validator).await)
    } else {
        tracing::debug!("OIDC validation is disabled in headscale config");
        Ok(Some(descriptor))
    }
}

async fn validated(
    descriptor: OidcDescriptor,
    validator: &dyn OidcValidator,
) -> Option<OidcDescriptor> {
    match validator.validate(&descriptor).await {
        OidcValidation::Valid => Some(descriptor),
        OidcValidation::Invalid(reason) => {
            tracing::warn!("OIDC validation against {} failed: {}", descriptor.issuer, reason);
            None
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Inline secret, else the trimmed contents of `client_secret_path`.
///
/// A read failure is logged and leaves the secret unset.
async fn section_secret(section: &OidcSection) -> Option<String> {
    if let Some(secret) = non_empty(&section.client_secret) {
        return Some(secret);
    }
    let path = section.client_secret_path.as_ref()?;
    tracing::debug!("Trying to read OIDC client secret from {}", path.display());
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Some(data.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            tracing::error!(
                "Failed to read OIDC client secret from {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedValidator {
        result: OidcValidation,
        calls: AtomicUsize,
    }

    impl FixedValidator {
        fn valid() -> Self {
            Self {
                result: OidcValidation::Valid,
                calls: AtomicUsize::new(0),
            }
        }

        fn invalid() -> Self {
            Self {
                result: OidcValidation::Invalid("unreachable".into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OidcValidator for FixedValidator {
        async fn validate(&self, _descriptor: &OidcDescriptor) -> OidcValidation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn env_triple() -> Vec<(&'static str, &'static str)> {
        vec![
            (vars::OIDC_ISSUER, "https://idp.example.com"),
            (vars::OIDC_CLIENT_ID, "headplane"),
            (vars::OIDC_CLIENT_SECRET, "s3cret"),
        ]
    }

    fn file_config(section: OidcSection) -> ConfigFile {
        ConfigFile {
            server_url: Some("http://headscale:8080".into()),
            oidc: Some(section),
        }
    }

    fn full_section() -> OidcSection {
        OidcSection {
            issuer: Some("https://file-idp.example.com".into()),
            client_id: Some("file-client".into()),
            client_secret: Some("file-secret".into()),
            ..OidcSection::default()
        }
    }

    #[test]
    fn root_key_prefers_root_api_key() {
        let env = Environment::from_pairs([(vars::ROOT_API_KEY, "root"), (vars::API_KEY, "api")]);
        assert_eq!(resolve_root_key(&env).unwrap(), "root");

        let env = Environment::from_pairs([(vars::API_KEY, "api")]);
        assert_eq!(resolve_root_key(&env).unwrap(), "api");

        assert!(matches!(
            resolve_root_key(&Environment::default()),
            Err(ContextError::MissingRootApiKey)
        ));
    }

    #[tokio::test]
    async fn env_triple_is_validated() {
        let env = Environment::from_pairs(env_triple());
        let validator = FixedValidator::valid();
        let oidc = resolve_oidc(&env, None, "root", &validator)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(validator.calls(), 1);
        assert_eq!(oidc.source, OidcSource::Environment);
        assert_eq!(oidc.method, DEFAULT_AUTH_METHOD);
        assert!(oidc.enabled);
        assert_eq!(oidc.root_key, "root");
    }

    #[tokio::test]
    async fn env_triple_validation_failure_disables_oidc() {
        let env = Environment::from_pairs(env_triple());
        let validator = FixedValidator::invalid();
        let oidc = resolve_oidc(&env, None, "root", &validator).await.unwrap();
        assert!(oidc.is_none());
    }

    #[tokio::test]
    async fn skip_flag_bypasses_validation() {
        let mut pairs = env_triple();
        pairs.push((vars::OIDC_SKIP_CONFIG_VALIDATION, "true"));
        pairs.push((vars::OIDC_CLIENT_SECRET_METHOD, "client_secret_post"));
        let env = Environment::from_pairs(pairs);
        let validator = FixedValidator::invalid();

        let oidc = resolve_oidc(&env, None, "root", &validator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(validator.calls(), 0);
        assert_eq!(oidc.method, "client_secret_post");
    }

    #[tokio::test]
    async fn env_subset_without_config_is_fatal() {
        let env = Environment::from_pairs([(vars::OIDC_ISSUER, "https://idp.example.com")]);
        let err = resolve_oidc(&env, None, "root", &FixedValidator::valid())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::OidcEnvIncomplete));
    }

    #[tokio::test]
    async fn env_subset_is_backfilled_from_config() {
        let env = Environment::from_pairs([(vars::OIDC_CLIENT_ID, "env-client")]);
        let config = file_config(full_section());
        let oidc = resolve_oidc(&env, Some(&config), "root", &FixedValidator::invalid())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(oidc.client, "env-client");
        assert_eq!(oidc.issuer, "https://file-idp.example.com");
        assert_eq!(oidc.secret, "file-secret");
        assert_eq!(oidc.source, OidcSource::ConfigFile);
    }

    #[tokio::test]
    async fn env_subset_left_incomplete_is_fatal() {
        let env = Environment::from_pairs([(vars::OIDC_CLIENT_ID, "env-client")]);
        let config = file_config(OidcSection {
            issuer: Some("https://file-idp.example.com".into()),
            ..OidcSection::default()
        });
        let err = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::OidcIncomplete));
    }

    #[tokio::test]
    async fn incomplete_file_section_is_soft() {
        let config = file_config(OidcSection {
            issuer: Some("https://file-idp.example.com".into()),
            ..OidcSection::default()
        });
        let env = Environment::default();
        let oidc = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap();
        assert!(oidc.is_none());
    }

    #[tokio::test]
    async fn no_oidc_anywhere_is_none() {
        let config = ConfigFile {
            server_url: Some("http://headscale:8080".into()),
            oidc: None,
        };
        let validator = FixedValidator::valid();
        let oidc = resolve_oidc(&Environment::default(), Some(&config), "root", &validator)
            .await
            .unwrap();
        assert!(oidc.is_none());
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn file_triple_validated_only_when_requested() {
        let validator = FixedValidator::invalid();
        let config = file_config(full_section());
        let oidc = resolve_oidc(&Environment::default(), Some(&config), "root", &validator)
            .await
            .unwrap();
        assert!(oidc.is_some());
        assert_eq!(validator.calls(), 0);

        let config = file_config(OidcSection {
            only_start_if_oidc_is_available: true,
            ..full_section()
        });
        let oidc = resolve_oidc(&Environment::default(), Some(&config), "root", &validator)
            .await
            .unwrap();
        assert!(oidc.is_none());
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_section_still_populates_descriptor() {
        let config = file_config(OidcSection {
            enabled: false,
            ..full_section()
        });
        let env = Environment::default();
        let oidc = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap()
            .unwrap();
        assert!(!oidc.enabled);
        assert_eq!(oidc.client, "file-client");
    }

    #[tokio::test]
    async fn secret_is_read_and_trimmed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oidc_secret");
        std::fs::write(&path, "from-file\n").unwrap();

        let config = file_config(OidcSection {
            client_secret: None,
            client_secret_path: Some(path),
            ..full_section()
        });
        let env = Environment::default();
        let oidc = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oidc.secret, "from-file");
    }

    #[tokio::test]
    async fn unreadable_secret_file_leaves_secret_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(OidcSection {
            client_secret: None,
            client_secret_path: Some(dir.path().join("missing")),
            ..full_section()
        });

        // File-only triple: soft.
        let env = Environment::default();
        let oidc = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap();
        assert!(oidc.is_none());

        // Partially from the environment: fatal.
        let env = Environment::from_pairs([(vars::OIDC_ISSUER, "https://idp.example.com")]);
        let err = resolve_oidc(&env, Some(&config), "root", &FixedValidator::valid())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::OidcIncomplete));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let descriptor = OidcDescriptor {
            issuer: "https://idp".into(),
            client: "c".into(),
            secret: "hunter2".into(),
            redirect_uri: None,
            root_key: "rootkey".into(),
            method: DEFAULT_AUTH_METHOD.into(),
            disable_key_login: false,
            enabled: true,
            source: OidcSource::Environment,
        };
        let out = format!("{:?}", descriptor);
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("rootkey"));
    }
}
