//! Resource kinds

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Connection,
    #[serde(rename = "sshkey", alias = "ssh_key")]
    SshKey,
    Identity,
    Account,
    #[serde(rename = "vdc", alias = "virtual_datacenter")]
    VirtualDatacenter,
    Disk,
    Machine,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Connection,
        ResourceKind::SshKey,
        ResourceKind::Identity,
        ResourceKind::Account,
        ResourceKind::VirtualDatacenter,
        ResourceKind::Disk,
        ResourceKind::Machine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Connection => "connection",
            ResourceKind::SshKey => "sshkey",
            ResourceKind::Identity => "identity",
            ResourceKind::Account => "account",
            ResourceKind::VirtualDatacenter => "vdc",
            ResourceKind::Disk => "disk",
            ResourceKind::Machine => "machine",
        }
    }

    /// Depth in the provisioning graph; references only point to lower ranks
    pub fn rank(&self) -> u8 {
        match self {
            ResourceKind::Connection | ResourceKind::SshKey => 0,
            ResourceKind::Account | ResourceKind::Identity => 1,
            ResourceKind::VirtualDatacenter => 2,
            ResourceKind::Disk => 3,
            ResourceKind::Machine => 4,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connection" => Ok(ResourceKind::Connection),
            "sshkey" | "ssh_key" => Ok(ResourceKind::SshKey),
            "identity" | "user" => Ok(ResourceKind::Identity),
            "account" => Ok(ResourceKind::Account),
            "vdc" | "virtual_datacenter" => Ok(ResourceKind::VirtualDatacenter),
            "disk" => Ok(ResourceKind::Disk),
            "machine" | "node" => Ok(ResourceKind::Machine),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}
