// session.rs — Cookie-backed sessions.
//
// The cookie carries `<session id>.<signature>`, where the signature is
// HMAC-SHA256 over the id keyed by COOKIE_SECRET. Session state itself lives
// in memory; a restart signs everyone out.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hp_policy::{Capability, Role};
use ring::hmac;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

pub const SESSION_COOKIE: &str = "hp_sess";

/// Session lifetime, also sent as the cookie's Max-Age.
pub const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Subject recorded for sessions created from an API key login.
pub const API_KEY_SUBJECT: &str = "unknown-non-oauth";

/// Who a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// OIDC `sub`, or [`API_KEY_SUBJECT`].
    pub subject: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl SessionUser {
    pub fn api_key_user() -> Self {
        Self {
            subject: API_KEY_SUBJECT.to_string(),
            name: "API Key".to_string(),
            email: None,
            username: None,
            picture: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub user: SessionUser,
    pub role: Role,
    /// Key used for coordination server calls made on this user's behalf.
    #[serde(skip)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn has(&self, cap: Capability) -> bool {
        self.role.has(cap)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues, verifies and revokes sessions.
pub struct SessionManager {
    key: hmac::Key,
    secure: bool,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(cookie_secret: &str, secure: bool) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, cookie_secret.as_bytes()),
            secure,
            ttl: Duration::seconds(SESSION_MAX_AGE_SECS),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Override the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sign(&self, id: &str) -> String {
        let tag = hmac::sign(&self.key, id.as_bytes());
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }

    /// Extract and verify the session id from a Cookie header.
    fn verified_id(&self, cookies: Option<&str>) -> Result<String, AuthError> {
        let value = cookies
            .and_then(|header| cookie_value(header, SESSION_COOKIE))
            .ok_or(AuthError::NoSession)?;
        let (id, signature) = value.split_once('.').ok_or(AuthError::InvalidCookie)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidCookie)?;
        hmac::verify(&self.key, id.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidCookie)?;
        Ok(id.to_string())
    }

    /// Start a session. Expired sessions are swept out first.
    pub fn create_session(&self, user: SessionUser, role: Role, api_key: &str) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user,
            role,
            api_key: api_key.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        tracing::debug!(
            "Created session for {} with role {}",
            session.user.subject,
            session.role
        );
        let mut sessions = self.lock();
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// `Set-Cookie` value that stores `session` in the browser.
    pub fn commit_session(&self, session: &Session) -> String {
        let value = format!("{}.{}", session.id, self.sign(&session.id));
        self.cookie(&value, SESSION_MAX_AGE_SECS)
    }

    /// Authenticate a request from its Cookie header.
    pub fn auth(&self, cookies: Option<&str>) -> Result<Session, AuthError> {
        let id = self.verified_id(cookies)?;
        let mut sessions = self.lock();
        let session = sessions.get(&id).ok_or(AuthError::UnknownSession)?;
        if session.is_expired(Utc::now()) {
            sessions.remove(&id);
            return Err(AuthError::Expired);
        }
        Ok(session.clone())
    }

    /// Whether the request is authenticated and its role grants `cap`.
    pub fn check(&self, cookies: Option<&str>, cap: Capability) -> bool {
        self.auth(cookies).map(|s| s.has(cap)).unwrap_or(false)
    }

    /// Forget the request's session (if any) and return a `Set-Cookie`
    /// value that clears the cookie.
    pub fn destroy_session(&self, cookies: Option<&str>) -> String {
        if let Ok(id) = self.verified_id(cookies) {
            self.lock().remove(&id);
        }
        self.cookie("", 0)
    }

    /// Apply a role change to the live sessions of `subject`.
    pub fn update_role(&self, subject: &str, role: Role) -> usize {
        let mut updated = 0;
        for session in self.lock().values_mut() {
            if session.user.subject == subject {
                session.role = role;
                updated += 1;
            }
        }
        updated
    }

    /// Number of live (not yet evicted) sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, value, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Find `name` in a `Cookie:` header value.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}
