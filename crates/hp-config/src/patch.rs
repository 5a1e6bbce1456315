// patch.rs — Write targeted changes back into the config file.
//
// A patch addresses a location with a dotted path (`dns.nameservers.global`)
// and either sets a value or removes the key. Intermediate mappings are
// created as needed. The rest of the document is preserved as-is.

use std::fs::OpenOptions;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

/// A single change to the config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// Dotted path, e.g. `dns.magic_dns`.
    pub path: String,
    /// New value; `None` removes the key.
    #[serde(default)]
    pub value: Option<Value>,
}

impl ConfigPatch {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
        }
    }
}

/// Apply `patches` to the document in memory.
pub fn apply_patches(document: &mut Value, patches: &[ConfigPatch]) -> Result<(), ConfigError> {
    for patch in patches {
        let segments: Vec<&str> = patch.path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidPatch {
                path: patch.path.clone(),
                reason: "empty path segment".to_string(),
            });
        }

        let root = document
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::InvalidPatch {
                path: patch.path.clone(),
                reason: "document root is not a mapping".to_string(),
            })?;
        apply_one(root, &segments, patch)?;
    }
    Ok(())
}

fn apply_one(map: &mut Mapping, segments: &[&str], patch: &ConfigPatch) -> Result<(), ConfigError> {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };
    let key = Value::String(head.to_string());

    if rest.is_empty() {
        match &patch.value {
            Some(value) => {
                map.insert(key, value.clone());
            }
            None => {
                map.remove(&key);
            }
        }
        return Ok(());
    }

    if patch.value.is_none() && !map.contains_key(&key) {
        return Ok(());
    }

    let child = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if child.is_null() {
        *child = Value::Mapping(Mapping::new());
    }
    match child {
        Value::Mapping(child) => apply_one(child, rest, patch),
        _ => Err(ConfigError::InvalidPatch {
            path: patch.path.clone(),
            reason: format!("'{head}' is not a mapping"),
        }),
    }
}

/// Apply `patches` to the config file at `path` and write it back.
pub fn patch_config(path: impl AsRef<Path>, patches: &[ConfigPatch]) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if OpenOptions::new().append(true).open(path).is_err() {
        return Err(ConfigError::NotWritable {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(io_err)?;
    let mut document: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    apply_patches(&mut document, patches)?;

    let serialized = serde_yaml::to_string(&document).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, serialized).map_err(io_err)?;

    tracing::info!("Patched {} key(s) in {}", patches.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn sets_nested_values_creating_parents() {
        let mut document = doc("server_url: https://hs\n");
        apply_patches(
            &mut document,
            &[ConfigPatch::set("dns.magic_dns", true)],
        )
        .unwrap();
        assert_eq!(document["dns"]["magic_dns"], Value::Bool(true));
        assert_eq!(document["server_url"], Value::String("https://hs".into()));
    }

    #[test]
    fn removes_keys() {
        let mut document = doc("dns:\n  magic_dns: true\n  base_domain: ts.net\n");
        apply_patches(&mut document, &[ConfigPatch::remove("dns.magic_dns")]).unwrap();
        assert!(document["dns"].get("magic_dns").is_none());
        assert_eq!(document["dns"]["base_domain"], Value::String("ts.net".into()));
    }

    #[test]
    fn removing_under_missing_parent_is_a_no_op() {
        let mut document = doc("server_url: https://hs\n");
        apply_patches(&mut document, &[ConfigPatch::remove("dns.magic_dns")]).unwrap();
        assert!(document.get("dns").is_none());
    }

    #[test]
    fn refuses_to_descend_into_scalars() {
        let mut document = doc("dns: off\n");
        let patch = ConfigPatch::set("dns.magic_dns", true);
        let err = apply_patches(&mut document, &[patch]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPatch { .. }));
    }

    #[test]
    fn rejects_empty_segments() {
        let mut document = doc("a: 1\n");
        let err = apply_patches(&mut document, &[ConfigPatch::set("a..b", 1)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPatch { .. }));
    }

    #[test]
    fn patch_config_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server_url: https://hs\ndns:\n  nameservers:\n    global: [1.1.1.1]\n",
        )
        .unwrap();

        patch_config(
            &path,
            &[ConfigPatch::set(
                "dns.nameservers.global",
                Value::Sequence(vec!["9.9.9.9".into()]),
            )],
        )
        .unwrap();

        let reread: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            reread["dns"]["nameservers"]["global"],
            Value::Sequence(vec!["9.9.9.9".into()])
        );
        assert_eq!(reread["server_url"], Value::String("https://hs".into()));
    }

    #[test]
    fn patch_config_on_missing_file_is_not_writable() {
        let dir = tempdir().unwrap();
        let err = patch_config(dir.path().join("config.yaml"), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::NotWritable { .. }));
    }
}
