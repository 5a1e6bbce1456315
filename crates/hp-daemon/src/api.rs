// api.rs — JSON API handlers. Each one checks a capability first.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hp_config::{patch_config, ConfigPatch};
use hp_headscale::{filter_users_with_valid_ids, user_display_name, CreatePreAuthKey, PreAuthKey};
use hp_policy::{Capability, Role};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::Authed;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ctx = &state.context;
    Json(json!({
        "status": "ok",
        "integration": ctx.integration_name(),
        "config": ctx.config.describe(),
        "oidc": ctx.oidc_login().is_some(),
    }))
}

#[derive(Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: hp_headscale::User,
    pub label: String,
}

/// `GET /api/users`
pub async fn list_users(
    State(state): State<AppState>,
    auth: Authed,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let session = auth.require(Capability::ReadUsers)?;
    let users = state.headscale.session(&session.api_key).get_users(None).await?;
    let views = filter_users_with_valid_ids(users)
        .into_iter()
        .map(|user| UserView {
            label: user_display_name(&user).to_string(),
            user,
        })
        .collect();
    Ok(Json(views))
}

#[derive(Deserialize)]
pub struct KeyQuery {
    pub user: Option<String>,
}

/// `GET /api/preauthkeys?user=<id>`; without `user`, every key.
pub async fn list_pre_auth_keys(
    State(state): State<AppState>,
    auth: Authed,
    Query(query): Query<KeyQuery>,
) -> Result<Json<Vec<PreAuthKey>>, ApiError> {
    let session = auth.require(Capability::ReadUsers)?;
    let api = state.headscale.session(&session.api_key);
    let keys = match query.user.as_deref().filter(|u| !u.is_empty()) {
        Some(user) => api.get_pre_auth_keys(user).await?,
        None => api.get_all_pre_auth_keys().await?,
    };
    Ok(Json(keys))
}

/// `POST /api/preauthkeys`
pub async fn create_pre_auth_key(
    State(state): State<AppState>,
    auth: Authed,
    Json(request): Json<CreatePreAuthKey>,
) -> Result<Response, ApiError> {
    let session = auth.require(Capability::GenerateAuthkeys)?;
    let tagged = request.acl_tags.as_ref().is_some_and(|t| !t.is_empty());
    if request.user.is_none() && !tagged {
        return Err(ApiError::BadRequest(
            "a key needs a user or at least one ACL tag".into(),
        ));
    }

    let key = state
        .headscale
        .session(&session.api_key)
        .create_pre_auth_key(&request)
        .await?;
    Ok((StatusCode::CREATED, Json(key)).into_response())
}

#[derive(Deserialize)]
pub struct ExpireRequest {
    pub user: String,
    pub key: String,
}

/// `POST /api/preauthkeys/expire`
pub async fn expire_pre_auth_key(
    State(state): State<AppState>,
    auth: Authed,
    Json(request): Json<ExpireRequest>,
) -> Result<StatusCode, ApiError> {
    let session = auth.require(Capability::GenerateAuthkeys)?;
    state
        .headscale
        .session(&session.api_key)
        .expire_pre_auth_key(&request.user, &request.key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /api/config`: write changes to the config file, then let the
/// integration restart the coordination server.
pub async fn patch_config_file(
    State(state): State<AppState>,
    auth: Authed,
    Json(patches): Json<Vec<ConfigPatch>>,
) -> Result<StatusCode, ApiError> {
    auth.require(Capability::WriteNetwork)?;
    let ctx = &state.context;
    if !ctx.config.write {
        return Err(ApiError::Forbidden("config file is not writable".into()));
    }
    if patches.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }

    patch_config(&ctx.config_path, &patches)?;

    if let Some(integration) = &ctx.integration {
        if let Err(e) = integration.on_config_change() {
            tracing::error!("{} failed to apply config change: {}", integration.name(), e);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub subject: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct RoleView {
    pub subject: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `GET /api/roles`
pub async fn list_roles(
    State(state): State<AppState>,
    auth: Authed,
) -> Result<Json<Vec<RoleView>>, ApiError> {
    auth.require(Capability::ConfigureIam)?;
    let roles = state
        .context
        .roles
        .list()
        .into_iter()
        .map(|(subject, user)| RoleView {
            subject,
            role: user.role,
            name: user.name,
            email: user.email,
        })
        .collect();
    Ok(Json(roles))
}

/// `POST /api/roles`: grant a role to an OIDC subject.
///
/// Only an owner may hand out or take away the owner role.
pub async fn set_role(
    State(state): State<AppState>,
    auth: Authed,
    Json(update): Json<RoleUpdate>,
) -> Result<StatusCode, ApiError> {
    let session = auth.require(Capability::ConfigureIam)?;
    let ctx = &state.context;

    let touches_owner =
        update.role == Role::Owner || ctx.roles.role_for(&update.subject) == Some(Role::Owner);
    if touches_owner && !session.has(Capability::Owner) {
        return Err(ApiError::missing(Capability::Owner));
    }

    ctx.roles.set_role(&update.subject, update.role).map_err(|e| {
        tracing::error!("Failed to store role for {}: {}", update.subject, e);
        ApiError::Internal(e.to_string())
    })?;
    let live = ctx.sessions.update_role(&update.subject, update.role);
    tracing::info!(
        "{} set role of {} to {} ({} live session(s))",
        session.user.subject,
        update.subject,
        update.role,
        live
    );
    Ok(StatusCode::NO_CONTENT)
}
