// auth.rs — Session extractor and capability checks for handlers.

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use hp_context::Session;
use hp_policy::Capability;

use crate::error::ApiError;
use crate::state::AppState;

pub fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(COOKIE).and_then(|v| v.to_str().ok())
}

/// An authenticated request.
pub struct Authed(pub Session);

impl Authed {
    /// Fail with 403 unless the session's role grants `cap`.
    pub fn require(&self, cap: Capability) -> Result<&Session, ApiError> {
        if self.0.has(cap) {
            Ok(&self.0)
        } else {
            tracing::debug!("{} lacks {}", self.0.user.subject, cap);
            Err(ApiError::missing(cap))
        }
    }
}

impl FromRequestParts<AppState> for Authed {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = cookie_header(&parts.headers);
        let sessions = &state.context.sessions;
        match sessions.auth(cookies) {
            Ok(session) => Ok(Authed(session)),
            Err(e) => {
                tracing::debug!("Authentication failed: {}", e);
                Err(ApiError::Unauthenticated {
                    clear_cookie: sessions.destroy_session(cookies),
                })
            }
        }
    }
}
