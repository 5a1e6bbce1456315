// error.rs — Error types for the role/capability model.

use thiserror::Error;

/// Errors that can occur when parsing roles and capabilities from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The role name is not one of the fixed console roles.
    #[error("unknown role '{name}'")]
    UnknownRole { name: String },

    /// The capability name is not one of the atomic capabilities.
    #[error("unknown capability '{name}'")]
    UnknownCapability { name: String },
}
