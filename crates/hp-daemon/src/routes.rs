// routes.rs — The console's HTTP surface.
//
//   GET   /healthz
//   POST  /login                   API key form
//   GET   /oidc/start, /oidc/callback
//   GET   /pending-approval
//   POST  /logout
//   GET   /api/users               read_users
//   GET   /api/preauthkeys         read_users
//   POST  /api/preauthkeys         generate_authkeys
//   POST  /api/preauthkeys/expire  generate_authkeys
//   PATCH /api/config              write_network
//   GET   /api/roles, POST /api/roles   configure_iam

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::login;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/users", get(api::list_users))
        .route(
            "/preauthkeys",
            get(api::list_pre_auth_keys).post(api::create_pre_auth_key),
        )
        .route("/preauthkeys/expire", post(api::expire_pre_auth_key))
        .route("/config", patch(api::patch_config_file))
        .route("/roles", get(api::list_roles).post(api::set_role));

    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/login", post(login::login_with_key))
        .route("/oidc/start", get(login::oidc_start))
        .route("/oidc/callback", get(login::oidc_callback))
        .route("/pending-approval", get(login::pending_approval))
        .route("/logout", post(login::logout))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
