// role.rs — The fixed set of console roles and their capability masks.
//
// Roles are constants. A capability check is `mask & bit == bit`, and the
// reverse lookup only recognizes exact masks; anything else falls back to
// `member`, the zero-capability role.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilitySet};
use crate::error::PolicyError;

use Capability::*;

const READ_ALL: CapabilitySet = CapabilitySet::of(&[
    ReadMachines,
    ReadUsers,
    ReadNetwork,
    ReadPolicy,
    ReadFeature,
]);

const AUDITOR: CapabilitySet = READ_ALL.with(UiAccess);

const NETWORK_ADMIN: CapabilitySet =
    AUDITOR.union(CapabilitySet::of(&[WriteNetwork, WritePolicy]));

const IT_ADMIN: CapabilitySet = AUDITOR.union(CapabilitySet::of(&[
    WriteMachines,
    WriteUsers,
    ConfigureIam,
    GenerateAuthkeys,
]));

const ADMIN: CapabilitySet = NETWORK_ADMIN.union(IT_ADMIN);

const OWNER: CapabilitySet = ADMIN.with(Owner);

/// A console role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    NetworkAdmin,
    ItAdmin,
    Auditor,
    /// Signed in but not yet granted anything.
    Member,
}

impl Role {
    /// Every role, most privileged first.
    pub const ALL: [Role; 6] = [
        Role::Owner,
        Role::Admin,
        Role::NetworkAdmin,
        Role::ItAdmin,
        Role::Auditor,
        Role::Member,
    ];

    pub const fn capabilities(self) -> CapabilitySet {
        match self {
            Role::Owner => OWNER,
            Role::Admin => ADMIN,
            Role::NetworkAdmin => NETWORK_ADMIN,
            Role::ItAdmin => IT_ADMIN,
            Role::Auditor => AUDITOR,
            Role::Member => CapabilitySet::EMPTY,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::NetworkAdmin => "network_admin",
            Role::ItAdmin => "it_admin",
            Role::Auditor => "auditor",
            Role::Member => "member",
        }
    }

    pub const fn has(self, cap: Capability) -> bool {
        self.capabilities().contains(cap)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.name() == s)
            .ok_or_else(|| PolicyError::UnknownRole {
                name: s.to_string(),
            })
    }
}

/// Check whether `role` grants `cap`.
pub const fn has_capability(role: Role, cap: Capability) -> bool {
    role.has(cap)
}

/// Reverse lookup: the role whose mask is exactly `bits`.
///
/// Unrecognized masks resolve to [`Role::Member`].
pub fn role_from_capabilities(bits: u32) -> Role {
    match Role::ALL
        .into_iter()
        .find(|role| role.capabilities().bits() == bits)
    {
        Some(role) => role,
        None => {
            tracing::debug!(bits, "unrecognized capability mask, treating as member");
            Role::Member
        }
    }
}
