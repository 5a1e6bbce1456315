// capability.rs — Atomic capability bits and the set type built from them.
//
// Each capability occupies one bit of a u32. A role's permissions are the
// bitwise OR of its capabilities, so checks never allocate and the whole
// model can be evaluated in const context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// A single atomic permission.
///
/// `read_*` capabilities gate dashboards, `write_*` capabilities gate
/// mutations, and `owner` marks the one account that may manage every
/// other account's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May load the console at all.
    UiAccess,
    ReadMachines,
    WriteMachines,
    ReadUsers,
    WriteUsers,
    /// DNS, routes and other tailnet-wide settings.
    ReadNetwork,
    WriteNetwork,
    /// The ACL policy document.
    ReadPolicy,
    WritePolicy,
    /// Feature flags and server information.
    ReadFeature,
    /// Assigning roles to other console users.
    ConfigureIam,
    /// Creating and expiring pre-auth keys for any user.
    GenerateAuthkeys,
    Owner,
}

impl Capability {
    /// Every capability, in bit order.
    pub const ALL: [Capability; 13] = [
        Capability::UiAccess,
        Capability::ReadMachines,
        Capability::WriteMachines,
        Capability::ReadUsers,
        Capability::WriteUsers,
        Capability::ReadNetwork,
        Capability::WriteNetwork,
        Capability::ReadPolicy,
        Capability::WritePolicy,
        Capability::ReadFeature,
        Capability::ConfigureIam,
        Capability::GenerateAuthkeys,
        Capability::Owner,
    ];

    /// The bit this capability occupies.
    pub const fn bit(self) -> u32 {
        match self {
            Capability::UiAccess => 1 << 0,
            Capability::ReadMachines => 1 << 1,
            Capability::WriteMachines => 1 << 2,
            Capability::ReadUsers => 1 << 3,
            Capability::WriteUsers => 1 << 4,
            Capability::ReadNetwork => 1 << 5,
            Capability::WriteNetwork => 1 << 6,
            Capability::ReadPolicy => 1 << 7,
            Capability::WritePolicy => 1 << 8,
            Capability::ReadFeature => 1 << 9,
            Capability::ConfigureIam => 1 << 10,
            Capability::GenerateAuthkeys => 1 << 11,
            Capability::Owner => 1 << 12,
        }
    }

    /// The snake_case name used in config files and API payloads.
    pub const fn name(self) -> &'static str {
        match self {
            Capability::UiAccess => "ui_access",
            Capability::ReadMachines => "read_machines",
            Capability::WriteMachines => "write_machines",
            Capability::ReadUsers => "read_users",
            Capability::WriteUsers => "write_users",
            Capability::ReadNetwork => "read_network",
            Capability::WriteNetwork => "write_network",
            Capability::ReadPolicy => "read_policy",
            Capability::WritePolicy => "write_policy",
            Capability::ReadFeature => "read_feature",
            Capability::ConfigureIam => "configure_iam",
            Capability::GenerateAuthkeys => "generate_authkeys",
            Capability::Owner => "owner",
        }
    }

    pub fn is_read(self) -> bool {
        self.name().starts_with("read_")
    }

    pub fn is_write(self) -> bool {
        self.name().starts_with("write_")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.name() == s)
            .ok_or_else(|| PolicyError::UnknownCapability {
                name: s.to_string(),
            })
    }
}

/// A bitmask of capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build a set from a list of capabilities (usable in const context).
    pub const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn union(self, other: CapabilitySet) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    pub const fn without(self, cap: Capability) -> Self {
        Self(self.0 & !cap.bit())
    }

    /// `mask & bit == bit`.
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() == cap.bit()
    }

    /// True when every bit of `other` is also set in `self`.
    pub const fn is_superset_of(self, other: CapabilitySet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |cap| self.contains(*cap))
    }
}
