// error.rs — Error types for configuration loading and patching.
//
// Loading the config file itself never fails (see `ConfigLoad`); these
// errors cover the operations that have a hard contract: merging the
// overlay into a typed record, reading a `.env` file that was explicitly
// requested, and writing patches back to disk.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file exists but is not valid YAML for the expected schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// File and environment overlay merged into something the schema rejects.
    #[error("invalid configuration after applying environment overlay: {0}")]
    Overlay(#[source] serde_yaml::Error),

    /// The `.env` file requested by LOAD_ENV_FILE could not be loaded.
    #[error("failed to load env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    /// A write was attempted on a config file the process cannot write.
    #[error("config file {path} is not writable")]
    NotWritable { path: PathBuf },

    /// A patch path does not address a location in the document.
    #[error("invalid patch path '{path}': {reason}")]
    InvalidPatch { path: String, reason: String },
}
