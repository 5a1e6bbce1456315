// file.rs — The coordination server's config file, as far as the console needs it.
//
// Only `server_url` and the `oidc` section are typed; everything else in the
// document is kept as raw YAML so patches can round-trip it untouched.
// Every field is optional so that templated or partial files still parse.
//
// Loading never fails: the result is a `ConfigLoad` that says what happened,
// and the caller decides whether that degrades a feature or aborts startup.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Default location of the coordination server's config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/headscale/config.yaml";

/// Typed view of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Public URL the coordination server advertises to clients.
    #[serde(default)]
    pub server_url: Option<String>,

    /// OpenID Connect settings shared with the console.
    #[serde(default)]
    pub oidc: Option<OidcSection>,
}

/// The `oidc:` section.
///
/// `enabled` is independent of whether the section is fully specified: a
/// section can carry placeholder values with `enabled: false` for templating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcSection {
    /// Defaults to true whenever the section is present.
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub enabled: bool,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// File holding the client secret, used when `client_secret` is absent.
    #[serde(default)]
    pub client_secret_path: Option<PathBuf>,

    /// Validate against the live provider before enabling OIDC login.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub only_start_if_oidc_is_available: bool,

    /// API key the console uses on behalf of OIDC users.
    #[serde(default)]
    pub headscale_api_key: Option<String>,

    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl Default for OidcSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            issuer: None,
            client_id: None,
            client_secret: None,
            client_secret_path: None,
            only_start_if_oidc_is_available: false,
            headscale_api_key: None,
            redirect_uri: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Accept both YAML booleans and the strings `"true"`/`"false"`.
///
/// Environment overlay values are always strings, so boolean fields must
/// tolerate both spellings.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

/// Outcome of reading the config file from disk.
#[derive(Debug, Clone)]
pub enum ConfigLoad {
    /// Parsed successfully. `document` is the full raw YAML.
    Loaded {
        config: ConfigFile,
        document: serde_yaml::Value,
    },
    /// No file at the path.
    Missing,
    /// The file exists but could not be read (permissions, is a directory, ...).
    Unreadable(String),
    /// The file was read but is not a valid config document.
    ParseError(String),
}

impl ConfigLoad {
    pub fn config(&self) -> Option<&ConfigFile> {
        match self {
            ConfigLoad::Loaded { config, .. } => Some(config),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&serde_yaml::Value> {
        match self {
            ConfigLoad::Loaded { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ConfigLoad::Loaded { .. })
    }
}

/// Read and parse the config file at `path`.
pub fn load_config_file(path: impl AsRef<Path>) -> ConfigLoad {
    let path = path.as_ref();
    tracing::debug!("Checking config at {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}", path.display());
            return ConfigLoad::Missing;
        }
        Err(e) => {
            tracing::debug!("Config at {} is unreadable: {}", path.display(), e);
            return ConfigLoad::Unreadable(e.to_string());
        }
    };

    match parse_document(&content) {
        Ok((config, document)) => ConfigLoad::Loaded { config, document },
        Err(detail) => {
            tracing::debug!("Config at {} failed to parse: {}", path.display(), detail);
            ConfigLoad::ParseError(detail)
        }
    }
}

fn parse_document(content: &str) -> Result<(ConfigFile, serde_yaml::Value), String> {
    let document: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    if !document.is_mapping() {
        return Err("config document must be a mapping".to_string());
    }
    let config = serde_yaml::from_value(document.clone()).map_err(|e| e.to_string())?;
    Ok((config, document))
}

/// Whether the console may read and write the config file.
///
/// `write` implies `read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCapability {
    pub read: bool,
    pub write: bool,
}

impl ConfigCapability {
    pub const DISABLED: ConfigCapability = ConfigCapability {
        read: false,
        write: false,
    };

    /// Human-readable state for startup logs.
    pub fn describe(&self) -> &'static str {
        match (self.read, self.write) {
            (true, true) => "Found",
            (true, false) => "Found (Read Only)",
            _ => "Unavailable",
        }
    }
}

/// Derive the config capability from a load result.
///
/// Write access is probed by opening the file for appending, which checks
/// permissions without modifying the file.
pub fn config_capability(path: impl AsRef<Path>, load: &ConfigLoad) -> ConfigCapability {
    if !load.is_loaded() {
        return ConfigCapability::DISABLED;
    }

    let path = path.as_ref();
    tracing::debug!("Checking write access to {}", path.display());
    let write = match OpenOptions::new().append(true).open(path) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("No write access to {}: {}", path.display(), e);
            false
        }
    };

    ConfigCapability { read: true, write }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const BASE: &str = "server_url: https://hs.example.com\n";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let load = load_config_file(dir.path().join("config.yaml"));
        assert!(matches!(load, ConfigLoad::Missing));
        assert_eq!(
            config_capability(dir.path().join("config.yaml"), &load),
            ConfigCapability::DISABLED
        );
    }

    #[test]
    fn directory_is_unreadable() {
        let dir = tempdir().unwrap();
        let load = load_config_file(dir.path());
        assert!(matches!(load, ConfigLoad::Unreadable(_)));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", "server_url: [unclosed\n");
        assert!(matches!(load_config_file(&path), ConfigLoad::ParseError(_)));

        let path = write(dir.path(), "scalar.yaml", "just a string\n");
        assert!(matches!(load_config_file(&path), ConfigLoad::ParseError(_)));
    }

    #[test]
    fn loads_server_url_and_keeps_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "server_url: https://hs.example.com\ndns:\n  magic_dns: true\n",
        );
        let load = load_config_file(&path);
        let config = load.config().unwrap();
        assert_eq!(config.server_url.as_deref(), Some("https://hs.example.com"));
        assert!(config.oidc.is_none());
        assert!(load.document().unwrap().get("dns").is_some());
    }

    #[test]
    fn writable_file_grants_write() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", BASE);
        let cap = config_capability(&path, &load_config_file(&path));
        assert!(cap.read);
        assert!(cap.write);
        assert_eq!(cap.describe(), "Found");
    }

    #[test]
    fn oidc_enabled_defaults_to_true() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            &format!(
                "{BASE}oidc:\n  issuer: https://accounts.google.com\
                 \n  client_id: my-client-id\n  client_secret: my-client-secret\n"
            ),
        );
        let load = load_config_file(&path);
        let oidc = load.config().unwrap().oidc.as_ref().unwrap();
        assert!(oidc.enabled);
        assert!(!oidc.only_start_if_oidc_is_available);
    }

    #[test]
    fn oidc_enabled_false_keeps_template_values() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            &format!(
                "{BASE}oidc:\n  enabled: false\n  issuer: https://example.com\
                 \n  client_id: placeholder-client-id\
                 \n  client_secret: placeholder-client-secret\n"
            ),
        );
        let load = load_config_file(&path);
        let oidc = load.config().unwrap().oidc.as_ref().unwrap();
        assert!(!oidc.enabled);
        assert_eq!(oidc.issuer.as_deref(), Some("https://example.com"));
        assert_eq!(oidc.client_id.as_deref(), Some("placeholder-client-id"));
    }

    #[test]
    fn partial_oidc_section_with_only_enabled_parses() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            &format!("{BASE}oidc:\n  enabled: false\n"),
        );
        let load = load_config_file(&path);
        let oidc = load.config().unwrap().oidc.as_ref().unwrap();
        assert!(!oidc.enabled);
        assert!(oidc.issuer.is_none());
        assert!(oidc.client_id.is_none());
    }

    #[test]
    fn string_booleans_are_accepted() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            &format!(
                "{BASE}oidc:\n  enabled: \"false\"\n  only_start_if_oidc_is_available: \"true\"\n"
            ),
        );
        let load = load_config_file(&path);
        let oidc = load.config().unwrap().oidc.as_ref().unwrap();
        assert!(!oidc.enabled);
        assert!(oidc.only_start_if_oidc_is_available);

        let path = write(
            dir.path(),
            "bad.yaml",
            &format!("{BASE}oidc:\n  enabled: \"maybe\"\n"),
        );
        assert!(matches!(load_config_file(&path), ConfigLoad::ParseError(_)));
    }
}
