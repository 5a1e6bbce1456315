// roles.rs — RoleStore: console roles for OIDC users.
//
// Roles are stored in one JSON file keyed by OIDC subject. The first subject
// ever to sign in becomes the owner; everyone after starts as a member until
// someone with `configure_iam` grants them a role.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hp_policy::Role;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::SessionUser;

pub const DEFAULT_USER_STORE_PATH: &str = "/var/lib/headplane/users.json";

/// One known console user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub first_seen: DateTime<Utc>,
}

/// Persistent subject → role map.
pub struct RoleStore {
    path: PathBuf,
    users: Mutex<BTreeMap<String, StoredUser>>,
}

impl RoleStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let users = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredUser>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn role_for(&self, subject: &str) -> Option<Role> {
        self.lock().get(subject).map(|u| u.role)
    }

    /// Record a login and return the user's role.
    ///
    /// Unknown subjects are added: as owner if the store is empty, else as
    /// member. A failed write leaves the store unchanged.
    pub fn register_login(&self, user: &SessionUser) -> Result<Role, StoreError> {
        let mut users = self.lock();
        if let Some(existing) = users.get(&user.subject) {
            return Ok(existing.role);
        }

        let role = if users.is_empty() {
            Role::Owner
        } else {
            Role::Member
        };
        let mut next = users.clone();
        next.insert(
            user.subject.clone(),
            StoredUser {
                role,
                name: Some(user.name.clone()),
                email: user.email.clone(),
                first_seen: Utc::now(),
            },
        );
        self.persist(&next)?;
        *users = next;
        if role == Role::Owner {
            tracing::info!("First login, granted owner to {}", user.subject);
        }
        Ok(role)
    }

    /// Set a subject's role, adding the subject if unknown.
    ///
    /// The in-memory map only changes once the file has been written.
    pub fn set_role(&self, subject: &str, role: Role) -> Result<(), StoreError> {
        let mut users = self.lock();
        let mut next = users.clone();
        next.entry(subject.to_string())
            .and_modify(|u| u.role = role)
            .or_insert_with(|| StoredUser {
                role,
                name: None,
                email: None,
                first_seen: Utc::now(),
            });
        self.persist(&next)?;
        *users = next;
        Ok(())
    }

    /// All users, ordered by subject.
    pub fn list(&self) -> Vec<(String, StoredUser)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn persist(&self, users: &BTreeMap<String, StoredUser>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(users)?;
        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
