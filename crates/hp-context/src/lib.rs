//! # hp-context
//!
//! The Headplane console's process-wide context.
//!
//! [`ContextBuilder`] composes the environment snapshot, the coordination
//! server's config file (plus overlay), the session manager, the platform
//! integration and the OIDC descriptor into one immutable [`Context`].
//! [`load_context`] builds it at most once per process; concurrent callers
//! share the same build and see the same success or failure.
//!
//! ## Failure policy
//!
//! - Fatal ([`ContextError`]): no coordination server URL, no cookie
//!   secret, no root API key, an incomplete OIDC triple that the
//!   environment partially supplied, an unreadable or corrupt role store
//!   (starting with an empty one would hand owner to the next login).
//! - Degraded: unreadable config file (config editing disabled), failed
//!   OIDC validation (OIDC disabled), no available integration.

pub mod context;
pub mod discovery;
pub mod error;
pub mod oidc;
pub mod roles;
pub mod session;

pub use context::{
    load_context, AgentCacheSettings, Context, ContextBuilder, ContextCell, OnceShared,
    DEFAULT_ENV_FILE,
};
pub use discovery::{generate_state, DiscoveryValidator, ProviderMetadata};
pub use error::{AuthError, ContextError, OidcError, StoreError};
pub use oidc::{
    resolve_oidc, resolve_root_key, OidcDescriptor, OidcSource, OidcValidation, OidcValidator,
};
pub use roles::{RoleStore, StoredUser};
pub use session::{Session, SessionManager, SessionUser, API_KEY_SUBJECT, SESSION_COOKIE};
