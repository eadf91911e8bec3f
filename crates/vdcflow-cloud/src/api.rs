//! Control-plane client trait definition

use crate::error::Result;
use crate::model::{
    AccountObject, AclEntry, AclTarget, ConnectionInfo, DiskObject, IoTune, MachineObject,
    NewAccount, NewDisk, NewMachine, NewSpace, NewUser, PortForward, PowerAction, Snapshot,
    SpaceObject, UserObject,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Control-plane client abstraction
///
/// Every resource driver talks to the cloud exclusively through this trait.
/// Lookups return `Ok(None)` when the object does not exist; `get_*` calls
/// return [`CloudError::NotFound`](crate::CloudError::NotFound) instead.
/// `delete_*` calls also report `NotFound` for objects that are already gone
/// so callers can decide whether that is acceptable.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Login the client is authenticated as
    async fn whoami(&self) -> Result<String>;

    // Accounts
    async fn find_account(&self, name: &str) -> Result<Option<AccountObject>>;
    async fn create_account(&self, request: &NewAccount) -> Result<AccountObject>;
    async fn get_account(&self, id: u64) -> Result<AccountObject>;
    async fn save_account(&self, account: &AccountObject) -> Result<()>;
    async fn delete_account(&self, id: u64) -> Result<()>;

    // Spaces (virtual datacenters)
    async fn list_spaces(&self, account_id: u64) -> Result<Vec<SpaceObject>>;
    async fn find_space(&self, account_id: u64, name: &str) -> Result<Option<SpaceObject>>;
    async fn create_space(&self, request: &NewSpace) -> Result<SpaceObject>;
    async fn get_space(&self, id: u64) -> Result<SpaceObject>;
    async fn save_space(&self, space: &SpaceObject) -> Result<()>;
    async fn delete_space(&self, id: u64) -> Result<()>;

    // Access control
    async fn list_acl(&self, target: AclTarget) -> Result<Vec<AclEntry>>;
    /// Returns `false` when the control plane refused the grant
    async fn authorize_user(&self, target: AclTarget, user: &str, right: &str) -> Result<bool>;
    async fn update_access(&self, target: AclTarget, user: &str, right: &str) -> Result<bool>;
    async fn unauthorize_user(&self, target: AclTarget, user: &str) -> Result<bool>;

    // Machines
    async fn list_machines(&self, space_id: u64) -> Result<Vec<MachineObject>>;
    async fn find_machine(&self, space_id: u64, name: &str) -> Result<Option<MachineObject>>;
    async fn create_machine(&self, request: &NewMachine) -> Result<MachineObject>;
    async fn get_machine(&self, id: u64) -> Result<MachineObject>;
    async fn save_machine(&self, machine: &MachineObject) -> Result<()>;
    async fn delete_machine(&self, id: u64) -> Result<()>;
    async fn machine_power(&self, id: u64, action: PowerAction) -> Result<()>;
    async fn attach_disk(&self, machine_id: u64, disk_id: u64) -> Result<()>;
    async fn detach_disk(&self, machine_id: u64, disk_id: u64) -> Result<()>;

    // Snapshots
    async fn create_snapshot(&self, machine_id: u64, name: &str) -> Result<Snapshot>;
    async fn list_snapshots(&self, machine_id: u64) -> Result<Vec<Snapshot>>;
    async fn rollback_snapshot(&self, machine_id: u64, epoch: i64) -> Result<()>;
    async fn delete_snapshot(&self, machine_id: u64, epoch: i64) -> Result<()>;

    // Port forwards
    async fn list_portforwards(&self, space_id: u64) -> Result<Vec<PortForward>>;
    async fn create_portforward(&self, space_id: u64, forward: &PortForward) -> Result<()>;
    async fn delete_portforward(&self, space_id: u64, forward: &PortForward) -> Result<()>;

    // Disks
    async fn list_disks(&self, account_id: u64) -> Result<Vec<DiskObject>>;
    async fn create_disk(&self, request: &NewDisk) -> Result<DiskObject>;
    async fn get_disk(&self, id: u64) -> Result<DiskObject>;
    async fn delete_disk(&self, id: u64) -> Result<()>;
    /// Persists size, description and iotune in one call; sizes only grow
    async fn save_disk(&self, disk: &DiskObject) -> Result<()>;
    async fn set_disk_limit_io(&self, id: u64, limits: &IoTune) -> Result<()>;

    // Identities
    async fn user_exists(&self, name: &str) -> Result<bool>;
    async fn get_user(&self, name: &str) -> Result<UserObject>;
    async fn create_user(&self, request: &NewUser) -> Result<()>;
    async fn edit_user(&self, user: &UserObject) -> Result<()>;
    async fn delete_user(&self, name: &str) -> Result<()>;
}

/// Produces a client for a connection
///
/// Injected into every resource instance so that no global client exists and
/// tests can hand out doubles.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn CloudApi>>;
}
