//! Remote object model
//!
//! These are the objects the control plane hands back. Resource drivers copy
//! the fields they care about into their own specs; nothing here is cached
//! across operations.

use serde::{Deserialize, Serialize};

/// Marker value the control plane uses for "no ceiling"
pub const UNLIMITED: i64 = -1;

/// Status string reported by a space once it is usable
pub const STATUS_DEPLOYED: &str = "DEPLOYED";

/// Where to reach a control plane and how to authenticate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub url: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub jwt: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    443
}

/// Capacity ceilings of an account or a space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapacityLimits {
    pub max_memory_capacity: f64,
    #[serde(rename = "maxCPUCapacity")]
    pub max_cpu_capacity: i64,
    #[serde(rename = "maxVDiskCapacity")]
    pub max_vdisk_capacity: i64,
    #[serde(rename = "maxNumPublicIP")]
    pub max_num_public_ip: i64,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            max_memory_capacity: UNLIMITED as f64,
            max_cpu_capacity: UNLIMITED,
            max_vdisk_capacity: UNLIMITED,
            max_num_public_ip: UNLIMITED,
        }
    }
}

/// One access-control entry: an identity and its access right code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclEntry {
    pub name: String,
    #[serde(rename = "accesstype")]
    pub right: String,
}

impl AclEntry {
    pub fn new(name: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            right: right.into(),
        }
    }
}

/// Object that carries an ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum AclTarget {
    Account(u64),
    Space(u64),
}

impl std::fmt::Display for AclTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AclTarget::Account(id) => write!(f, "account {}", id),
            AclTarget::Space(id) => write!(f, "space {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountObject {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub limits: CapacityLimits,
    pub acl: Vec<AclEntry>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub limits: CapacityLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceObject {
    pub id: u64,
    pub account_id: u64,
    pub name: String,
    pub location: String,
    pub description: String,
    pub status: String,
    pub limits: CapacityLimits,
    pub acl: Vec<AclEntry>,
    pub external_network_ip: Option<String>,
    pub private_network: Option<String>,
}

impl SpaceObject {
    pub fn is_deployed(&self) -> bool {
        self.status == STATUS_DEPLOYED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSpace {
    pub account_id: u64,
    pub name: String,
    pub location: String,
    pub owner: String,
    pub description: String,
    pub limits: CapacityLimits,
    pub external_network_id: Option<i64>,
    pub private_network: Option<String>,
}

/// Disk role on a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiskType {
    #[serde(rename = "B")]
    Boot,
    #[default]
    #[serde(rename = "D")]
    Data,
}

impl std::fmt::Display for DiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskType::Boot => write!(f, "B"),
            DiskType::Data => write!(f, "D"),
        }
    }
}

/// The twelve I/O throttling parameters accepted by `set_disk_limit_io`
///
/// `None` leaves a parameter unthrottled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoTune {
    pub total_bytes_sec: Option<u64>,
    pub read_bytes_sec: Option<u64>,
    pub write_bytes_sec: Option<u64>,
    #[serde(alias = "maxIops")]
    pub total_iops_sec: Option<u64>,
    pub read_iops_sec: Option<u64>,
    pub write_iops_sec: Option<u64>,
    pub total_bytes_sec_max: Option<u64>,
    pub read_bytes_sec_max: Option<u64>,
    pub write_bytes_sec_max: Option<u64>,
    pub total_iops_sec_max: Option<u64>,
    pub read_iops_sec_max: Option<u64>,
    pub write_iops_sec_max: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskObject {
    pub id: u64,
    pub account_id: u64,
    pub name: String,
    pub location: String,
    pub description: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub disk_type: DiskType,
    pub iotune: IoTune,
    pub machine_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDisk {
    pub account_id: u64,
    pub name: String,
    pub location: String,
    pub description: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub disk_type: DiskType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineObject {
    pub id: u64,
    pub space_id: u64,
    pub name: String,
    pub description: String,
    pub image: String,
    pub memory: u64,
    pub vcpus: u32,
    pub status: String,
    pub boot_disk_id: u64,
    pub disks: Vec<u64>,
    pub ip_private: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMachine {
    pub space_id: u64,
    pub name: String,
    pub description: String,
    pub image: String,
    pub memory: u64,
    pub vcpus: u32,
    pub boot_disk_size: u64,
    pub authorized_key: Option<String>,
}

/// Power transitions understood by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
    Pause,
    Resume,
    Reset,
}

impl PowerAction {
    /// Machine status once the transition completed
    pub fn resulting_status(&self) -> &'static str {
        match self {
            PowerAction::Start | PowerAction::Restart | PowerAction::Resume | PowerAction::Reset => {
                "RUNNING"
            }
            PowerAction::Stop => "HALTED",
            PowerAction::Pause => "PAUSED",
        }
    }
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerAction::Start => write!(f, "start"),
            PowerAction::Stop => write!(f, "stop"),
            PowerAction::Restart => write!(f, "restart"),
            PowerAction::Pause => write!(f, "pause"),
            PowerAction::Resume => write!(f, "resume"),
            PowerAction::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub name: String,
    pub epoch: i64,
}

/// Public port of a space forwarded to a machine port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForward {
    pub machine_id: u64,
    pub public_port: u16,
    pub local_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserObject {
    pub name: String,
    pub emails: Vec<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub groups: Vec<String>,
    pub password: Option<String>,
}
