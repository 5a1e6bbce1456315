// env.rs — Immutable snapshot of the process environment.
//
// All resolution code reads variables through an `Environment` rather than
// `std::env`, so bootstrap is deterministic and tests never have to mutate
// process-global state. A `.env` file can extend the snapshot; variables
// already present in the real environment always win over the file.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// Names of the environment variables the console recognizes.
pub mod vars {
    pub const LOAD_ENV_FILE: &str = "LOAD_ENV_FILE";
    pub const DEBUG: &str = "DEBUG";
    pub const CONFIG_FILE: &str = "CONFIG_FILE";
    pub const HEADSCALE_URL: &str = "HEADSCALE_URL";
    pub const HEADSCALE_PUBLIC_URL: &str = "HEADSCALE_PUBLIC_URL";
    pub const COOKIE_SECRET: &str = "COOKIE_SECRET";
    pub const COOKIE_SECURE: &str = "COOKIE_SECURE";
    pub const AGENT_CACHE_DISABLED: &str = "AGENT_CACHE_DISABLED";
    pub const AGENT_CACHE_PATH: &str = "AGENT_CACHE_PATH";
    pub const ROOT_API_KEY: &str = "ROOT_API_KEY";
    pub const API_KEY: &str = "API_KEY";
    pub const OIDC_ISSUER: &str = "OIDC_ISSUER";
    pub const OIDC_CLIENT_ID: &str = "OIDC_CLIENT_ID";
    pub const OIDC_CLIENT_SECRET: &str = "OIDC_CLIENT_SECRET";
    pub const OIDC_CLIENT_SECRET_METHOD: &str = "OIDC_CLIENT_SECRET_METHOD";
    pub const OIDC_SKIP_CONFIG_VALIDATION: &str = "OIDC_SKIP_CONFIG_VALIDATION";
    pub const OIDC_REDIRECT_URI: &str = "OIDC_REDIRECT_URI";
    pub const DISABLE_API_KEY_LOGIN: &str = "DISABLE_API_KEY_LOGIN";
    pub const HEADSCALE_INTEGRATION_UNSTRICT: &str = "HEADSCALE_INTEGRATION_UNSTRICT";
    pub const POD_NAME: &str = "POD_NAME";
    pub const KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
    pub const KUBERNETES_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";
    pub const USER_STORE_PATH: &str = "USER_STORE_PATH";

    /// Prefix of variables folded into the config overlay.
    pub const OVERLAY_PREFIX: &str = "HEADPLANE_";
}

/// A read-only view of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build an environment from explicit pairs (used by tests and embedders).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Merge a dotenv-style file into the snapshot.
    ///
    /// Existing variables are left untouched. Returns how many variables the
    /// file contributed.
    pub fn load_env_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let to_err = |source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        };

        let mut added = 0;
        for item in dotenvy::from_path_iter(path).map_err(to_err)? {
            let (key, value) = item.map_err(to_err)?;
            if !self.vars.contains_key(&key) {
                self.vars.insert(key, value);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Raw lookup. An empty value is still a value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Lookup that treats an empty string the same as an unset variable.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Boolean flags are on only when set to exactly `true`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }

    /// All variables whose name starts with `prefix`, sorted by name.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut matched: Vec<_> = self
            .vars
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        matched.sort_unstable();
        matched
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn flags_require_literal_true() {
        let env = Environment::from_pairs([("A", "true"), ("B", "TRUE"), ("C", "1")]);
        assert!(env.flag("A"));
        assert!(!env.flag("B"));
        assert!(!env.flag("C"));
        assert!(!env.flag("MISSING"));
    }

    #[test]
    fn empty_values_are_present_but_not_non_empty() {
        let env = Environment::from_pairs([("EMPTY", "")]);
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.get_non_empty("EMPTY"), None);
    }

    #[test]
    fn env_file_does_not_override_existing_vars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "COOKIE_SECRET=from-file\nHEADSCALE_URL=http://file:8080\n").unwrap();

        let mut env = Environment::from_pairs([("COOKIE_SECRET", "from-process")]);
        let added = env.load_env_file(&path).unwrap();

        assert_eq!(added, 1);
        assert_eq!(env.get("COOKIE_SECRET"), Some("from-process"));
        assert_eq!(env.get("HEADSCALE_URL"), Some("http://file:8080"));
    }

    #[test]
    fn missing_env_file_is_an_error() {
        let dir = tempdir().unwrap();
        let mut env = Environment::default();
        let err = env.load_env_file(dir.path().join("nope.env")).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }

    #[test]
    fn prefix_listing_is_sorted() {
        let env = Environment::from_pairs([
            ("HEADPLANE_OIDC__ISSUER", "x"),
            ("HEADPLANE_OIDC__CLIENT_ID", "y"),
            ("OTHER", "z"),
        ]);
        let names: Vec<_> = env
            .with_prefix("HEADPLANE_")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(names, ["HEADPLANE_OIDC__CLIENT_ID", "HEADPLANE_OIDC__ISSUER"]);
    }
}
