// context.rs — The process-wide Context and its one-time construction.
//
// `ContextBuilder::build` runs the bootstrap steps strictly in order:
//   1. optional `.env` file          6. cookie secret (fatal if absent)
//   2. debug flag                    7. session manager and role store
//   3. config file + capability      8. agent cache settings
//   4. coordination server URL       9. first available integration
//   5. public URL                   10. root API key and OIDC
//
// `ContextCell` makes construction happen once per process. Concurrent
// callers wait on the same in-flight build and all receive its result,
// including a failure.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hp_config::{
    config_capability, load_config_file, merge_config, vars, ConfigCapability, ConfigFile,
    Environment, DEFAULT_CONFIG_PATH,
};
use hp_integration::{default_integrations, load_integration, Integration};
use tokio::sync::OnceCell;

use crate::discovery::DiscoveryValidator;
use crate::error::ContextError;
use crate::oidc::{resolve_oidc, resolve_root_key, OidcDescriptor, OidcValidator};
use crate::roles::{RoleStore, DEFAULT_USER_STORE_PATH};
use crate::session::SessionManager;

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_AGENT_CACHE_PATH: &str = "/etc/headplane/agent.cache";
pub const AGENT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Settings for the node-info agent cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCacheSettings {
    pub enabled: bool,
    pub path: PathBuf,
    pub default_ttl: Duration,
}

impl AgentCacheSettings {
    fn from_env(env: &Environment) -> Self {
        Self {
            enabled: !env.flag(vars::AGENT_CACHE_DISABLED),
            path: env
                .get_non_empty(vars::AGENT_CACHE_PATH)
                .unwrap_or(DEFAULT_AGENT_CACHE_PATH)
                .into(),
            default_ttl: AGENT_CACHE_TTL,
        }
    }
}

/// Resolved, immutable console configuration.
pub struct Context {
    pub debug: bool,
    pub headscale_url: String,
    /// URL shown to users; falls back to `headscale_url`.
    pub headscale_public_url: String,
    pub cookie_secret: String,
    pub cookie_secure: bool,
    pub integration: Option<Arc<dyn Integration>>,
    pub config: ConfigCapability,
    pub config_path: PathBuf,
    /// Config file merged with the environment overlay.
    pub config_file: Option<ConfigFile>,
    pub oidc: Option<OidcDescriptor>,
    pub cache: AgentCacheSettings,
    pub root_api_key: String,
    pub sessions: SessionManager,
    pub roles: RoleStore,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("debug", &self.debug)
            .field("headscale_url", &self.headscale_url)
            .field("headscale_public_url", &self.headscale_public_url)
            .field("integration", &self.integration.as_ref().map(|i| i.name()))
            .field("config", &self.config)
            .field("config_path", &self.config_path)
            .field("oidc", &self.oidc)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn integration_name(&self) -> &str {
        self.integration.as_ref().map(|i| i.name()).unwrap_or("None")
    }

    /// The OIDC descriptor, if OIDC sign-in is turned on.
    ///
    /// A section with `enabled: false` still resolves into `oidc` so its
    /// values can be inspected, but it does not enable sign-in.
    pub fn oidc_login(&self) -> Option<&OidcDescriptor> {
        self.oidc.as_ref().filter(|o| o.enabled)
    }

    fn log_summary(&self) {
        tracing::info!("Starting Headplane with Context");
        tracing::info!("HEADSCALE_URL: {}", self.headscale_url);
        tracing::info!("HEADSCALE_PUBLIC_URL: {}", self.headscale_public_url);
        tracing::info!("Integration: {}", self.integration_name());
        tracing::info!("Config: {}", self.config.describe());
        let oidc = match (&self.oidc, self.oidc_login()) {
            (_, Some(_)) => "Configured",
            (Some(_), None) => "Disabled",
            (None, _) => "Unavailable",
        };
        tracing::info!("OIDC: {}", oidc);
    }
}

/// Collects the inputs for building a [`Context`].
pub struct ContextBuilder {
    env: Environment,
    env_file: PathBuf,
    integrations: Option<Vec<Arc<dyn Integration>>>,
    validator: Option<Arc<dyn OidcValidator>>,
}

impl ContextBuilder {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            integrations: None,
            validator: None,
        }
    }

    /// File read when `LOAD_ENV_FILE=true`.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = path.into();
        self
    }

    /// Replace the default integration candidates (in priority order).
    pub fn integrations(mut self, integrations: Vec<Arc<dyn Integration>>) -> Self {
        self.integrations = Some(integrations);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn OidcValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub async fn build(self) -> Result<Context, ContextError> {
        let mut env = self.env;

        // 1. .env file
        if env.flag(vars::LOAD_ENV_FILE) {
            tracing::info!(
                "Loading environment variables from {}",
                self.env_file.display()
            );
            match env.load_env_file(&self.env_file) {
                Ok(count) => tracing::debug!("Loaded {} variables", count),
                Err(hp_config::ConfigError::EnvFile { source, .. }) if source.not_found() => {
                    tracing::warn!("{} not found, continuing", self.env_file.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        // 2. debug
        let debug = env.flag(vars::DEBUG);
        if debug {
            tracing::info!("Debug mode is enabled! Logs will spam a lot.");
            tracing::info!("Please disable debug mode in production.");
        }

        // 3. config file
        let config_path = PathBuf::from(
            env.get_non_empty(vars::CONFIG_FILE)
                .unwrap_or(DEFAULT_CONFIG_PATH),
        );
        let load = load_config_file(&config_path);
        let config = config_capability(&config_path, &load);
        let config_file = match merge_config(&load, &env) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!("Ignoring environment overlay: {}", e);
                load.config().cloned()
            }
        };

        // 4. coordination server URL
        let headscale_url = match (env.get_non_empty(vars::HEADSCALE_URL), &config_file) {
            (Some(url), _) => url.to_string(),
            (None, None) => return Err(ContextError::MissingHeadscaleUrl),
            (None, Some(file)) => file
                .server_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or(ContextError::MissingServerUrl)?,
        };

        // 5. public URL
        let headscale_public_url = env
            .get_non_empty(vars::HEADSCALE_PUBLIC_URL)
            .map(str::to_string)
            .or_else(|| {
                config_file
                    .as_ref()
                    .and_then(|f| f.server_url.clone())
                    .filter(|u| !u.is_empty())
            })
            .unwrap_or_else(|| headscale_url.clone());

        // 6. cookie secret
        let cookie_secret = env
            .get_non_empty(vars::COOKIE_SECRET)
            .ok_or(ContextError::MissingCookieSecret)?
            .to_string();
        let cookie_secure = env.get(vars::COOKIE_SECURE) != Some("false");

        // 7. sessions
        let sessions = SessionManager::new(&cookie_secret, cookie_secure);
        let roles = RoleStore::open(
            env.get_non_empty(vars::USER_STORE_PATH)
                .unwrap_or(DEFAULT_USER_STORE_PATH),
        )?;

        // 8. agent cache
        let cache = AgentCacheSettings::from_env(&env);

        // 9. integration
        let candidates = self.integrations.unwrap_or_else(default_integrations);
        let integration = load_integration(&candidates, &env).await;

        // 10. OIDC
        let root_api_key = resolve_root_key(&env)?;
        let validator = match self.validator {
            Some(validator) => validator,
            None => Arc::new(DiscoveryValidator::new()?),
        };
        let oidc =
            resolve_oidc(&env, config_file.as_ref(), &root_api_key, validator.as_ref()).await?;

        let context = Context {
            debug,
            headscale_url,
            headscale_public_url,
            cookie_secret,
            cookie_secure,
            integration,
            config,
            config_path,
            config_file,
            oidc,
            cache,
            root_api_key,
            sessions,
            roles,
        };
        context.log_summary();
        Ok(context)
    }
}

pub type SharedResult<T, E> = Result<Arc<T>, Arc<E>>;

/// A value built at most once, shared by every caller.
///
/// The first caller runs `init`; callers arriving while it runs wait for it
/// and receive the same `Arc`. A failed build is cached and handed to every
/// caller as well.
pub struct OnceShared<T, E> {
    cell: OnceCell<SharedResult<T, E>>,
}

impl<T, E> OnceShared<T, E> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell
            .get_or_init(|| async { init().await.map(Arc::new).map_err(Arc::new) })
            .await
            .clone()
    }

    /// The result, if construction has finished.
    pub fn get(&self) -> Option<SharedResult<T, E>> {
        self.cell.get().cloned()
    }
}

impl<T, E> Default for OnceShared<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ContextCell = OnceShared<Context, ContextError>;

static CONTEXT: ContextCell = ContextCell::new();

/// Return the process-wide Context, running `builder` on the first call.
///
/// Later calls drop their builder and return the first result.
pub async fn load_context(builder: ContextBuilder) -> SharedResult<Context, ContextError> {
    CONTEXT.get_or_init(|| builder.build()).await
}
