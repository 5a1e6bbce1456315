//! Core Integration trait and error types

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use hp_config::Environment;
use thiserror::Error;

/// Errors that can occur inside an integration
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to signal process {pid}: {source}")]
    Signal { pid: i32, source: std::io::Error },

    #[error("Kubernetes API error: {0}")]
    Kubernetes(String),

    #[error("signalling processes is not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, IntegrationError>;

/// A platform integration that knows where the coordination server runs.
///
/// Integrations are probed once at startup in a fixed priority order; the
/// first one whose probe succeeds is the only one used for the rest of the
/// process lifetime. A probe may do I/O (reading `/proc`, service-account
/// files, calling the cluster API) and records whatever it discovers, such
/// as a process ID, inside the integration itself.
#[async_trait]
pub trait Integration: Send + Sync + fmt::Debug {
    /// Display name for logs and the settings page
    fn name(&self) -> &str;

    /// Probe whether this integration can operate in the current environment.
    ///
    /// Probe failures are logged and reported as `false`, never propagated.
    async fn is_available(&self, env: &Environment) -> bool;

    /// Called after the console writes the coordination server's config file.
    ///
    /// The default does nothing.
    fn on_config_change(&self) -> Result<()> {
        Ok(())
    }
}
