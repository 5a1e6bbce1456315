// login.rs — Sign-in and sign-out: API key form, OIDC code flow, logout.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use hp_context::{generate_state, SessionUser, API_KEY_SUBJECT};
use hp_policy::{Capability, Role};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{cookie_header, Authed};
use crate::error::ApiError;
use crate::state::AppState;

pub const LANDING_PATH: &str = "/machines";
pub const PENDING_PATH: &str = "/pending-approval";

fn redirect_with_cookie(location: &str, set_cookie: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, set_cookie),
        ],
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct ApiKeyLogin {
    pub api_key: String,
}

/// `POST /login`: sign in with a coordination server API key.
///
/// API key sessions act as owner: whoever holds the key already has full
/// control of the server.
pub async fn login_with_key(
    State(state): State<AppState>,
    Form(form): Form<ApiKeyLogin>,
) -> Result<Response, ApiError> {
    let ctx = &state.context;
    if ctx.oidc_login().is_some_and(|o| o.disable_key_login) {
        return Err(ApiError::Forbidden("API key login is disabled".into()));
    }

    let api_key = form.api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::BadRequest("API key is required".into()));
    }

    if !state.headscale.session(api_key).check_api_key().await? {
        tracing::info!("Rejected API key login");
        return Ok((StatusCode::UNAUTHORIZED, "Invalid API key").into_response());
    }

    let session = ctx
        .sessions
        .create_session(SessionUser::api_key_user(), Role::Owner, api_key);
    Ok(redirect_with_cookie(
        LANDING_PATH,
        ctx.sessions.commit_session(&session),
    ))
}

/// Where the provider sends the browser back to.
fn callback_uri(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let oidc = state.context.oidc_login()?;
    if let Some(uri) = &oidc.redirect_uri {
        return Some(uri.clone());
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = if state.context.cookie_secure {
        "https"
    } else {
        "http"
    };
    Some(format!("{}://{}/oidc/callback", scheme, host))
}

/// `GET /oidc/start`: redirect to the identity provider.
pub async fn oidc_start(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let oidc = state
        .context
        .oidc_login()
        .ok_or_else(|| ApiError::NotFound("OIDC is not configured".into()))?;
    let redirect_uri = callback_uri(&state, &headers)
        .ok_or_else(|| ApiError::BadRequest("cannot determine redirect URI".into()))?;

    let metadata = state
        .oidc_client
        .discover(&oidc.issuer)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let login_state = generate_state();
    let url = state
        .oidc_client
        .authorization_url(oidc, &metadata, &login_state, &redirect_uri)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.remember_login(login_state);

    Ok(Redirect::to(&url).into_response())
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// `GET /oidc/callback`: finish the code flow and start a session.
pub async fn oidc_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let ctx = &state.context;
    let oidc = ctx
        .oidc_login()
        .ok_or_else(|| ApiError::NotFound("OIDC is not configured".into()))?;
    if !state.take_login(&params.state) {
        return Err(ApiError::BadRequest("unknown or expired login state".into()));
    }
    let redirect_uri = callback_uri(&state, &headers)
        .ok_or_else(|| ApiError::BadRequest("cannot determine redirect URI".into()))?;

    let user = state
        .oidc_client
        .login(oidc, &params.code, &redirect_uri)
        .await
        .map_err(|e| {
            tracing::warn!("OIDC login failed: {}", e);
            ApiError::Forbidden("OIDC login failed".into())
        })?;

    let role = ctx.roles.register_login(&user).map_err(|e| {
        tracing::error!("Failed to record login for {}: {}", user.subject, e);
        ApiError::Internal("could not record login".into())
    })?;
    tracing::info!("OIDC login for {} as {}", user.subject, role);

    let session = ctx.sessions.create_session(user, role, &oidc.root_key);
    let location = if role.has(Capability::UiAccess) {
        LANDING_PATH
    } else {
        PENDING_PATH
    };
    Ok(redirect_with_cookie(
        location,
        ctx.sessions.commit_session(&session),
    ))
}

/// `GET /pending-approval`: what a signed-in member without access sees.
pub async fn pending_approval(
    State(state): State<AppState>,
    Authed(session): Authed,
) -> Response {
    if session.user.subject == API_KEY_SUBJECT || session.has(Capability::UiAccess) {
        return Redirect::to(LANDING_PATH).into_response();
    }

    Json(json!({
        "user": session.user,
        "url": state.context.headscale_public_url,
        "exists": state.context.roles.role_for(&session.user.subject).is_some(),
    }))
    .into_response()
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let clear = state
        .context
        .sessions
        .destroy_session(cookie_header(&headers));
    redirect_with_cookie("/login", clear)
}
