// error.rs — Request-level errors and how they render.
//
// Authentication failures never surface as errors to the browser: they
// become a redirect to the login page with a cookie that clears the session.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hp_config::ConfigError;
use hp_headscale::HeadscaleError;
use hp_policy::Capability;

#[derive(Debug)]
pub enum ApiError {
    /// Not signed in. Carries the `Set-Cookie` value that clears the session.
    Unauthenticated { clear_cookie: String },
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Internal(String),
    Upstream(HeadscaleError),
    Config(ConfigError),
}

impl ApiError {
    pub fn missing(cap: Capability) -> Self {
        ApiError::Forbidden(format!("missing capability {}", cap))
    }
}

impl From<HeadscaleError> for ApiError {
    fn from(e: HeadscaleError) -> Self {
        ApiError::Upstream(e)
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::Config(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated { clear_cookie } => (
                StatusCode::SEE_OTHER,
                [
                    (header::LOCATION, "/login".to_string()),
                    (header::SET_COOKIE, clear_cookie),
                ],
            )
                .into_response(),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            ApiError::Upstream(e) => {
                tracing::warn!("Coordination server request failed: {}", e);
                let status = match &e {
                    HeadscaleError::Api { status, .. } if *status < 500 => {
                        StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string()).into_response()
            }
            ApiError::Config(e) => {
                tracing::error!("Config update failed: {}", e);
                let status = match &e {
                    ConfigError::NotWritable { .. } => StatusCode::FORBIDDEN,
                    ConfigError::InvalidPatch { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string()).into_response()
            }
        }
    }
}
