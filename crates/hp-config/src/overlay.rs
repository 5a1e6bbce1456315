// overlay.rs — Environment overlay on top of the config file.
//
// Variables named `HEADPLANE_<SECTION>__<KEY>` are folded into a YAML
// document: the prefix is stripped, `__` separates nesting levels, and each
// segment is lower-cased. `HEADPLANE_OIDC__CLIENT_ID=abc` becomes
// `oidc: { client_id: abc }`, and `HEADPLANE_SERVER_URL=...` becomes the
// top-level `server_url`. Values stay strings.
//
// The overlay is deep-merged over the file document, key by key, so an
// overlay can change a single field of a section the file defines.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::env::{vars, Environment};
use crate::error::ConfigError;
use crate::file::{load_config_file, ConfigFile, ConfigLoad};

/// Build the overlay document from `HEADPLANE_` variables.
///
/// Returns `None` when no such variable is set.
pub fn load_config_env(env: &Environment) -> Option<Value> {
    let mut root = Mapping::new();
    let mut any = false;

    for (name, value) in env.with_prefix(vars::OVERLAY_PREFIX) {
        let segments: Vec<String> = name[vars::OVERLAY_PREFIX.len()..]
            .split("__")
            .map(str::to_lowercase)
            .collect();

        if segments.iter().any(String::is_empty) {
            tracing::warn!("Ignoring malformed config overlay variable {}", name);
            continue;
        }

        insert_path(&mut root, &segments, Value::String(value.to_string()));
        any = true;
    }

    any.then_some(Value::Mapping(root))
}

fn insert_path(map: &mut Mapping, segments: &[String], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };
    let key = Value::String(head.clone());

    if rest.is_empty() {
        map.insert(key, value);
        return;
    }

    let child = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !child.is_mapping() {
        // A scalar set at a parent path gives way to the nested form.
        *child = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(child) = child {
        insert_path(child, rest, value);
    }
}

/// Deep-merge `overlay` into `base`. Overlay values win; mappings merge.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Combine an already-loaded file with the environment overlay.
///
/// Returns `Ok(None)` when neither the file nor the overlay contributes
/// anything. A file that failed to load is treated as absent.
pub fn merge_config(
    load: &ConfigLoad,
    env: &Environment,
) -> Result<Option<ConfigFile>, ConfigError> {
    let overlay = load_config_env(env);

    match (load.document(), overlay) {
        (None, None) => Ok(None),
        (Some(_), None) => Ok(load.config().cloned()),
        (document, Some(overlay)) => {
            let mut merged = document
                .cloned()
                .unwrap_or_else(|| Value::Mapping(Mapping::new()));
            merge_values(&mut merged, overlay);
            let config = serde_yaml::from_value(merged).map_err(ConfigError::Overlay)?;
            Ok(Some(config))
        }
    }
}

/// Load the file at `path` and apply the environment overlay.
pub fn load_config(
    path: impl AsRef<Path>,
    env: &Environment,
) -> Result<Option<ConfigFile>, ConfigError> {
    merge_config(&load_config_file(path), env)
}
