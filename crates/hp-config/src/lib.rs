//! # hp-config
//!
//! Layered configuration for the Headplane console.
//!
//! Three sources feed the console's view of its configuration:
//!
//! 1. The process environment, captured once as an [`Environment`] snapshot
//!    (optionally extended by a `.env` file).
//! 2. The coordination server's YAML config file, read with
//!    [`load_config_file`] into a [`ConfigLoad`] that records *why* a file
//!    was unavailable instead of throwing.
//! 3. An environment overlay (`HEADPLANE_<SECTION>__<KEY>`) deep-merged
//!    over the file by [`load_config`].
//!
//! [`config_capability`] turns a load result into the read/write flags the
//! rest of the console uses to gate config editing, and [`patch_config`]
//! writes targeted changes back to disk.

pub mod env;
pub mod error;
pub mod file;
pub mod overlay;
pub mod patch;

pub use env::{vars, Environment};
pub use error::ConfigError;
pub use file::{
    config_capability, load_config_file, ConfigCapability, ConfigFile, ConfigLoad, OidcSection,
    DEFAULT_CONFIG_PATH,
};
pub use overlay::{load_config, load_config_env, merge_config, merge_values};
pub use patch::{apply_patches, patch_config, ConfigPatch};
