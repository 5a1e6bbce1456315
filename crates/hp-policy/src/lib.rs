//! # hp-policy
//!
//! Role and capability model for the Headplane console.
//!
//! Every console user holds exactly one [`Role`]. A role is a fixed bitmask
//! of atomic [`Capability`] bits, and an authorization check is a single
//! bitwise AND against that mask. There is no I/O and no mutable state here:
//! the mapping is a set of constants for the lifetime of the process.
//!
//! ## Key invariants
//!
//! - **Member is empty**: `member` holds zero capabilities, not even
//!   `ui_access`. Signing in does not grant console access by itself.
//! - **Nesting**: `owner ⊇ admin ⊇ {ui_access, read_*}`, and only `owner`
//!   carries the `owner` bit.
//! - **Read-only auditor**: `auditor` has every `read_*` capability and no
//!   `write_*` capability.
//! - **Safe default**: an unrecognized mask maps back to `member`, never to
//!   an error.

pub mod capability;
pub mod error;
pub mod role;

pub use capability::{Capability, CapabilitySet};
pub use error::PolicyError;
pub use role::{has_capability, role_from_capabilities, Role};
