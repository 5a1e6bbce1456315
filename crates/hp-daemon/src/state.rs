// state.rs — Shared state handed to every handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hp_context::{Context, DiscoveryValidator};
use hp_headscale::HeadscaleClient;

/// How long an OIDC `state` value stays valid.
const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<Context>,
    pub headscale: HeadscaleClient,
    pub oidc_client: Arc<DiscoveryValidator>,
    pending_logins: Arc<Mutex<HashMap<String, Instant>>>,
}

impl AppState {
    pub fn new(
        context: Arc<Context>,
        headscale: HeadscaleClient,
        oidc_client: DiscoveryValidator,
    ) -> Self {
        Self {
            context,
            headscale,
            oidc_client: Arc::new(oidc_client),
            pending_logins: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn logins(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        self.pending_logins.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember an OIDC `state` value issued at login start.
    pub fn remember_login(&self, state: String) {
        let mut logins = self.logins();
        logins.retain(|_, issued| issued.elapsed() < LOGIN_STATE_TTL);
        logins.insert(state, Instant::now());
    }

    /// Consume a `state` value. True if it was issued here and is fresh.
    pub fn take_login(&self, state: &str) -> bool {
        self.logins()
            .remove(state)
            .is_some_and(|issued| issued.elapsed() < LOGIN_STATE_TTL)
    }
}
