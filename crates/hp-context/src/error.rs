// error.rs — Error types for context bootstrap, OIDC, sessions and roles.

use std::path::PathBuf;

use hp_config::ConfigError;
use thiserror::Error;

/// Fatal bootstrap errors. Any of these stops the console from serving.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No coordination server URL in the environment and no config file.
    #[error("HEADSCALE_URL not set")]
    MissingHeadscaleUrl,

    /// A config file was found but it has no `server_url`.
    #[error("Missing server_url in headscale config")]
    MissingServerUrl,

    #[error("COOKIE_SECRET not set")]
    MissingCookieSecret,

    #[error("ROOT_API_KEY or API_KEY not set")]
    MissingRootApiKey,

    /// Some but not all of OIDC_ISSUER / OIDC_CLIENT_ID / OIDC_CLIENT_SECRET
    /// are set and there is no config file to fill the gaps.
    #[error("OIDC environment variables are incomplete")]
    OidcEnvIncomplete,

    /// The environment supplied part of the OIDC settings and the config
    /// file did not supply the rest.
    #[error("OIDC configuration is incomplete")]
    OidcIncomplete,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Oidc(#[from] OidcError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors talking to the identity provider.
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("request to identity provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    /// Discovery document is missing something the login flow needs.
    #[error("invalid discovery document: {0}")]
    Discovery(String),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

/// Why a request could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no session cookie")]
    NoSession,

    /// The cookie is malformed or its signature does not verify.
    #[error("invalid session cookie")]
    InvalidCookie,

    /// Correctly signed, but the session is not (or no longer) known.
    #[error("unknown session")]
    UnknownSession,

    #[error("session expired")]
    Expired,
}

/// Errors persisting console user roles.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
