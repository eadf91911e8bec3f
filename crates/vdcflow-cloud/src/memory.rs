//! In-process control plane
//!
//! A complete [`CloudApi`] implementation that keeps every object in memory.
//! It backs the `vdcflow simulate` command and the engine test-suites, so it
//! also records every call and can inject failures.

use crate::api::{CloudApi, Connector};
use crate::error::{CloudError, Result};
use crate::model::{
    AccountObject, AclEntry, AclTarget, ConnectionInfo, DiskObject, DiskType, IoTune,
    MachineObject, NewAccount, NewDisk, NewMachine, NewSpace, NewUser, PortForward, PowerAction,
    STATUS_DEPLOYED, Snapshot, SpaceObject, UserObject,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const STATUS_DEPLOYING: &str = "DEPLOYING";
const OWNER_RIGHT: &str = "ARCXDU";

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    last_epoch: i64,
    login: String,
    accounts: BTreeMap<u64, AccountObject>,
    spaces: BTreeMap<u64, SpaceObject>,
    machines: BTreeMap<u64, MachineObject>,
    disks: BTreeMap<u64, DiskObject>,
    users: BTreeMap<String, UserObject>,
    snapshots: HashMap<u64, Vec<Snapshot>>,
    portforwards: Vec<(u64, PortForward)>,
    /// Remaining `get_space` reads before a space reports DEPLOYED
    deploying: HashMap<u64, u32>,
    deploy_polls: u32,
    failures: HashMap<String, u32>,
    refused_users: HashSet<String>,
    calls: Vec<String>,
}

impl Inner {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the call and consume an injected failure, if any
    fn enter(&mut self, method: &str) -> Result<()> {
        self.calls.push(method.to_string());
        if let Some(remaining) = self.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CloudError::Unavailable(format!(
                    "injected failure in {}",
                    method
                )));
            }
        }
        Ok(())
    }

    fn acl_mut(&mut self, target: AclTarget) -> Result<&mut Vec<AclEntry>> {
        match target {
            AclTarget::Account(id) => self
                .accounts
                .get_mut(&id)
                .map(|a| &mut a.acl)
                .ok_or_else(|| CloudError::NotFound(format!("account {}", id))),
            AclTarget::Space(id) => self
                .spaces
                .get_mut(&id)
                .map(|s| &mut s.acl)
                .ok_or_else(|| CloudError::NotFound(format!("space {}", id))),
        }
    }

    fn space(&self, id: u64) -> Result<&SpaceObject> {
        self.spaces
            .get(&id)
            .ok_or_else(|| CloudError::NotFound(format!("space {}", id)))
    }

    fn machine_mut(&mut self, id: u64) -> Result<&mut MachineObject> {
        self.machines
            .get_mut(&id)
            .ok_or_else(|| CloudError::NotFound(format!("machine {}", id)))
    }

    fn disk_mut(&mut self, id: u64) -> Result<&mut DiskObject> {
        self.disks
            .get_mut(&id)
            .ok_or_else(|| CloudError::NotFound(format!("disk {}", id)))
    }
}

/// In-memory control plane
#[derive(Debug)]
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                login: "admin".to_string(),
                last_epoch: Utc::now().timestamp(),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A connector that hands out this cloud for every connection
    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(InMemoryConnector {
            cloud: Arc::clone(self),
        })
    }

    /// Number of `get_space` reads a new space stays in DEPLOYING
    pub fn set_deploy_polls(&self, polls: u32) {
        self.lock().deploy_polls = polls;
    }

    /// Make the next `count` calls of `method` fail with a transient error
    pub fn fail_next(&self, method: &str, count: u32) {
        self.lock().failures.insert(method.to_string(), count);
    }

    /// ACL grants, updates and revocations for `user` are refused
    pub fn refuse_acl_changes_for(&self, user: &str) {
        self.lock().refused_users.insert(user.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == method).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Insert an account that exists independently of any resource
    pub fn seed_account(&self, name: &str, limits: crate::model::CapacityLimits) -> AccountObject {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        let account = AccountObject {
            id,
            name: name.to_string(),
            description: String::new(),
            limits,
            acl: Vec::new(),
            status: "CONFIRMED".to_string(),
        };
        inner.accounts.insert(id, account.clone());
        account
    }

    pub fn account_by_name(&self, name: &str) -> Option<AccountObject> {
        self.lock()
            .accounts
            .values()
            .find(|a| a.name == name)
            .cloned()
    }

    pub fn space_by_name(&self, name: &str) -> Option<SpaceObject> {
        self.lock().spaces.values().find(|s| s.name == name).cloned()
    }

    pub fn machine_by_name(&self, name: &str) -> Option<MachineObject> {
        self.lock()
            .machines
            .values()
            .find(|m| m.name == name)
            .cloned()
    }

    pub fn disk(&self, id: u64) -> Option<DiskObject> {
        self.lock().disks.get(&id).cloned()
    }

    pub fn user(&self, name: &str) -> Option<UserObject> {
        self.lock().users.get(name).cloned()
    }

    pub fn portforwards(&self, space_id: u64) -> Vec<PortForward> {
        self.lock()
            .portforwards
            .iter()
            .filter(|(s, _)| *s == space_id)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Replace an object's ACL without going through the API
    pub fn set_acl(&self, target: AclTarget, entries: Vec<AclEntry>) -> Result<()> {
        *self.lock().acl_mut(target)? = entries;
        Ok(())
    }
}

#[async_trait]
impl CloudApi for InMemoryCloud {
    async fn whoami(&self) -> Result<String> {
        let mut inner = self.lock();
        inner.enter("whoami")?;
        Ok(inner.login.clone())
    }

    async fn find_account(&self, name: &str) -> Result<Option<AccountObject>> {
        let mut inner = self.lock();
        inner.enter("find_account")?;
        Ok(inner.accounts.values().find(|a| a.name == name).cloned())
    }

    async fn create_account(&self, request: &NewAccount) -> Result<AccountObject> {
        let mut inner = self.lock();
        inner.enter("create_account")?;
        if inner.accounts.values().any(|a| a.name == request.name) {
            return Err(CloudError::AlreadyExists(format!("account {}", request.name)));
        }
        let id = inner.allocate_id();
        let acl = if request.owner.is_empty() {
            Vec::new()
        } else {
            vec![AclEntry::new(&request.owner, OWNER_RIGHT)]
        };
        let account = AccountObject {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            limits: request.limits,
            acl,
            status: "CONFIRMED".to_string(),
        };
        inner.accounts.insert(id, account.clone());
        tracing::debug!(account = %account.name, id, "Created account");
        Ok(account)
    }

    async fn get_account(&self, id: u64) -> Result<AccountObject> {
        let mut inner = self.lock();
        inner.enter("get_account")?;
        inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("account {}", id)))
    }

    async fn save_account(&self, account: &AccountObject) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("save_account")?;
        match inner.accounts.get_mut(&account.id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(CloudError::NotFound(format!("account {}", account.id))),
        }
    }

    async fn delete_account(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_account")?;
        if inner.spaces.values().any(|s| s.account_id == id) {
            return Err(CloudError::ApiError(format!(
                "account {} still contains spaces",
                id
            )));
        }
        inner
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("account {}", id)))
    }

    async fn list_spaces(&self, account_id: u64) -> Result<Vec<SpaceObject>> {
        let mut inner = self.lock();
        inner.enter("list_spaces")?;
        Ok(inner
            .spaces
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn find_space(&self, account_id: u64, name: &str) -> Result<Option<SpaceObject>> {
        let mut inner = self.lock();
        inner.enter("find_space")?;
        Ok(inner
            .spaces
            .values()
            .find(|s| s.account_id == account_id && s.name == name)
            .cloned())
    }

    async fn create_space(&self, request: &NewSpace) -> Result<SpaceObject> {
        let mut inner = self.lock();
        inner.enter("create_space")?;
        if !inner.accounts.contains_key(&request.account_id) {
            return Err(CloudError::NotFound(format!(
                "account {}",
                request.account_id
            )));
        }
        if inner
            .spaces
            .values()
            .any(|s| s.account_id == request.account_id && s.name == request.name)
        {
            return Err(CloudError::AlreadyExists(format!("space {}", request.name)));
        }
        let id = inner.allocate_id();
        let polls = inner.deploy_polls;
        let status = if polls > 0 {
            inner.deploying.insert(id, polls);
            STATUS_DEPLOYING
        } else {
            STATUS_DEPLOYED
        };
        let acl = if request.owner.is_empty() {
            Vec::new()
        } else {
            vec![AclEntry::new(&request.owner, OWNER_RIGHT)]
        };
        let space = SpaceObject {
            id,
            account_id: request.account_id,
            name: request.name.clone(),
            location: request.location.clone(),
            description: request.description.clone(),
            status: status.to_string(),
            limits: request.limits,
            acl,
            external_network_ip: Some(format!("185.69.{}.{}", id / 250, id % 250 + 1)),
            private_network: request
                .private_network
                .clone()
                .or_else(|| Some("192.168.103.0/24".to_string())),
        };
        inner.spaces.insert(id, space.clone());
        Ok(space)
    }

    async fn get_space(&self, id: u64) -> Result<SpaceObject> {
        let mut inner = self.lock();
        inner.enter("get_space")?;
        let still_deploying = match inner.deploying.get_mut(&id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        let space = inner
            .spaces
            .get_mut(&id)
            .ok_or_else(|| CloudError::NotFound(format!("space {}", id)))?;
        if !still_deploying && space.status == STATUS_DEPLOYING {
            space.status = STATUS_DEPLOYED.to_string();
        }
        Ok(space.clone())
    }

    async fn save_space(&self, space: &SpaceObject) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("save_space")?;
        match inner.spaces.get_mut(&space.id) {
            Some(existing) => {
                *existing = space.clone();
                Ok(())
            }
            None => Err(CloudError::NotFound(format!("space {}", space.id))),
        }
    }

    async fn delete_space(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_space")?;
        if inner.spaces.remove(&id).is_none() {
            return Err(CloudError::NotFound(format!("space {}", id)));
        }
        let machine_ids: Vec<u64> = inner
            .machines
            .values()
            .filter(|m| m.space_id == id)
            .map(|m| m.id)
            .collect();
        for machine_id in machine_ids {
            if let Some(machine) = inner.machines.remove(&machine_id) {
                inner.disks.remove(&machine.boot_disk_id);
                for disk_id in machine.disks {
                    if let Some(disk) = inner.disks.get_mut(&disk_id) {
                        disk.machine_id = None;
                    }
                }
            }
        }
        inner.portforwards.retain(|(s, _)| *s != id);
        inner.deploying.remove(&id);
        Ok(())
    }

    async fn list_acl(&self, target: AclTarget) -> Result<Vec<AclEntry>> {
        let mut inner = self.lock();
        inner.enter("list_acl")?;
        Ok(inner.acl_mut(target)?.clone())
    }

    async fn authorize_user(&self, target: AclTarget, user: &str, right: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.enter("authorize_user")?;
        if inner.refused_users.contains(user) {
            return Ok(false);
        }
        let acl = inner.acl_mut(target)?;
        if acl.iter().any(|e| e.name == user) {
            return Ok(false);
        }
        acl.push(AclEntry::new(user, right));
        Ok(true)
    }

    async fn update_access(&self, target: AclTarget, user: &str, right: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.enter("update_access")?;
        if inner.refused_users.contains(user) {
            return Ok(false);
        }
        let acl = inner.acl_mut(target)?;
        match acl.iter_mut().find(|e| e.name == user) {
            Some(entry) => {
                entry.right = right.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unauthorize_user(&self, target: AclTarget, user: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.enter("unauthorize_user")?;
        if inner.refused_users.contains(user) {
            return Ok(false);
        }
        let acl = inner.acl_mut(target)?;
        let before = acl.len();
        acl.retain(|e| e.name != user);
        Ok(acl.len() < before)
    }

    async fn list_machines(&self, space_id: u64) -> Result<Vec<MachineObject>> {
        let mut inner = self.lock();
        inner.enter("list_machines")?;
        Ok(inner
            .machines
            .values()
            .filter(|m| m.space_id == space_id)
            .cloned()
            .collect())
    }

    async fn find_machine(&self, space_id: u64, name: &str) -> Result<Option<MachineObject>> {
        let mut inner = self.lock();
        inner.enter("find_machine")?;
        Ok(inner
            .machines
            .values()
            .find(|m| m.space_id == space_id && m.name == name)
            .cloned())
    }

    async fn create_machine(&self, request: &NewMachine) -> Result<MachineObject> {
        let mut inner = self.lock();
        inner.enter("create_machine")?;
        let (account_id, location) = {
            let space = inner.space(request.space_id)?;
            (space.account_id, space.location.clone())
        };
        if inner
            .machines
            .values()
            .any(|m| m.space_id == request.space_id && m.name == request.name)
        {
            return Err(CloudError::AlreadyExists(format!(
                "machine {}",
                request.name
            )));
        }
        let boot_disk_id = inner.allocate_id();
        inner.disks.insert(
            boot_disk_id,
            DiskObject {
                id: boot_disk_id,
                account_id,
                name: format!("{}-boot", request.name),
                location,
                description: "Machine boot disk".to_string(),
                size: request.boot_disk_size,
                disk_type: DiskType::Boot,
                iotune: IoTune::default(),
                machine_id: None,
            },
        );
        let id = inner.allocate_id();
        if let Some(disk) = inner.disks.get_mut(&boot_disk_id) {
            disk.machine_id = Some(id);
        }
        let machine = MachineObject {
            id,
            space_id: request.space_id,
            name: request.name.clone(),
            description: request.description.clone(),
            image: request.image.clone(),
            memory: request.memory,
            vcpus: request.vcpus,
            status: PowerAction::Start.resulting_status().to_string(),
            boot_disk_id,
            disks: vec![boot_disk_id],
            ip_private: Some(format!("192.168.103.{}", id % 250 + 2)),
        };
        inner.machines.insert(id, machine.clone());
        Ok(machine)
    }

    async fn get_machine(&self, id: u64) -> Result<MachineObject> {
        let mut inner = self.lock();
        inner.enter("get_machine")?;
        Ok(inner.machine_mut(id)?.clone())
    }

    async fn save_machine(&self, machine: &MachineObject) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("save_machine")?;
        *inner.machine_mut(machine.id)? = machine.clone();
        Ok(())
    }

    async fn delete_machine(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_machine")?;
        let machine = inner
            .machines
            .remove(&id)
            .ok_or_else(|| CloudError::NotFound(format!("machine {}", id)))?;
        inner.disks.remove(&machine.boot_disk_id);
        for disk_id in machine.disks {
            if let Some(disk) = inner.disks.get_mut(&disk_id) {
                disk.machine_id = None;
            }
        }
        inner.snapshots.remove(&id);
        inner.portforwards.retain(|(_, f)| f.machine_id != id);
        Ok(())
    }

    async fn machine_power(&self, id: u64, action: PowerAction) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("machine_power")?;
        inner.machine_mut(id)?.status = action.resulting_status().to_string();
        Ok(())
    }

    async fn attach_disk(&self, machine_id: u64, disk_id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("attach_disk")?;
        inner.machine_mut(machine_id)?;
        let disk = inner.disk_mut(disk_id)?;
        match disk.machine_id {
            Some(current) if current == machine_id => return Ok(()),
            Some(current) => {
                return Err(CloudError::ApiError(format!(
                    "disk {} is attached to machine {}",
                    disk_id, current
                )));
            }
            None => disk.machine_id = Some(machine_id),
        }
        inner.machine_mut(machine_id)?.disks.push(disk_id);
        Ok(())
    }

    async fn detach_disk(&self, machine_id: u64, disk_id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("detach_disk")?;
        let machine = inner.machine_mut(machine_id)?;
        machine.disks.retain(|d| *d != disk_id);
        let disk = inner.disk_mut(disk_id)?;
        if disk.machine_id == Some(machine_id) {
            disk.machine_id = None;
        }
        Ok(())
    }

    async fn create_snapshot(&self, machine_id: u64, name: &str) -> Result<Snapshot> {
        let mut inner = self.lock();
        inner.enter("create_snapshot")?;
        inner.machine_mut(machine_id)?;
        let epoch = Utc::now().timestamp().max(inner.last_epoch + 1);
        inner.last_epoch = epoch;
        let snapshot = Snapshot {
            name: name.to_string(),
            epoch,
        };
        inner
            .snapshots
            .entry(machine_id)
            .or_default()
            .push(snapshot.clone());
        Ok(snapshot)
    }

    async fn list_snapshots(&self, machine_id: u64) -> Result<Vec<Snapshot>> {
        let mut inner = self.lock();
        inner.enter("list_snapshots")?;
        inner.machine_mut(machine_id)?;
        Ok(inner.snapshots.get(&machine_id).cloned().unwrap_or_default())
    }

    async fn rollback_snapshot(&self, machine_id: u64, epoch: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("rollback_snapshot")?;
        let snapshots = inner.snapshots.entry(machine_id).or_default();
        if !snapshots.iter().any(|s| s.epoch == epoch) {
            return Err(CloudError::NotFound(format!("snapshot {}", epoch)));
        }
        snapshots.retain(|s| s.epoch <= epoch);
        Ok(())
    }

    async fn delete_snapshot(&self, machine_id: u64, epoch: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_snapshot")?;
        let snapshots = inner.snapshots.entry(machine_id).or_default();
        let before = snapshots.len();
        snapshots.retain(|s| s.epoch != epoch);
        if snapshots.len() == before {
            return Err(CloudError::NotFound(format!("snapshot {}", epoch)));
        }
        Ok(())
    }

    async fn list_portforwards(&self, space_id: u64) -> Result<Vec<PortForward>> {
        let mut inner = self.lock();
        inner.enter("list_portforwards")?;
        Ok(inner
            .portforwards
            .iter()
            .filter(|(s, _)| *s == space_id)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn create_portforward(&self, space_id: u64, forward: &PortForward) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("create_portforward")?;
        inner.space(space_id)?;
        if inner
            .portforwards
            .iter()
            .any(|(s, f)| *s == space_id && f.public_port == forward.public_port)
        {
            return Err(CloudError::AlreadyExists(format!(
                "public port {}",
                forward.public_port
            )));
        }
        inner.portforwards.push((space_id, forward.clone()));
        Ok(())
    }

    async fn delete_portforward(&self, space_id: u64, forward: &PortForward) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_portforward")?;
        let before = inner.portforwards.len();
        inner
            .portforwards
            .retain(|(s, f)| !(*s == space_id && f.public_port == forward.public_port));
        if inner.portforwards.len() == before {
            return Err(CloudError::NotFound(format!(
                "public port {}",
                forward.public_port
            )));
        }
        Ok(())
    }

    async fn list_disks(&self, account_id: u64) -> Result<Vec<DiskObject>> {
        let mut inner = self.lock();
        inner.enter("list_disks")?;
        Ok(inner
            .disks
            .values()
            .filter(|d| d.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn create_disk(&self, request: &NewDisk) -> Result<DiskObject> {
        let mut inner = self.lock();
        inner.enter("create_disk")?;
        if !inner.accounts.contains_key(&request.account_id) {
            return Err(CloudError::NotFound(format!(
                "account {}",
                request.account_id
            )));
        }
        let id = inner.allocate_id();
        let disk = DiskObject {
            id,
            account_id: request.account_id,
            name: request.name.clone(),
            location: request.location.clone(),
            description: request.description.clone(),
            size: request.size,
            disk_type: request.disk_type,
            iotune: IoTune::default(),
            machine_id: None,
        };
        inner.disks.insert(id, disk.clone());
        Ok(disk)
    }

    async fn get_disk(&self, id: u64) -> Result<DiskObject> {
        let mut inner = self.lock();
        inner.enter("get_disk")?;
        Ok(inner.disk_mut(id)?.clone())
    }

    async fn delete_disk(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_disk")?;
        let disk = inner.disk_mut(id)?;
        if let Some(machine_id) = disk.machine_id {
            return Err(CloudError::ApiError(format!(
                "disk {} is attached to machine {}",
                id, machine_id
            )));
        }
        inner.disks.remove(&id);
        Ok(())
    }

    async fn save_disk(&self, disk: &DiskObject) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("save_disk")?;
        let stored = inner.disk_mut(disk.id)?;
        if disk.size < stored.size {
            return Err(CloudError::InvalidRequest(format!(
                "disk {} cannot shrink from {} to {}",
                disk.id, stored.size, disk.size
            )));
        }
        stored.size = disk.size;
        stored.description = disk.description.clone();
        stored.iotune = disk.iotune;
        Ok(())
    }

    async fn set_disk_limit_io(&self, id: u64, limits: &IoTune) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("set_disk_limit_io")?;
        inner.disk_mut(id)?.iotune = *limits;
        Ok(())
    }

    async fn user_exists(&self, name: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.enter("user_exists")?;
        Ok(inner.users.contains_key(name))
    }

    async fn get_user(&self, name: &str) -> Result<UserObject> {
        let mut inner = self.lock();
        inner.enter("get_user")?;
        inner
            .users
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("user {}", name)))
    }

    async fn create_user(&self, request: &NewUser) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("create_user")?;
        if inner.users.contains_key(&request.name) {
            return Err(CloudError::AlreadyExists(format!("user {}", request.name)));
        }
        inner.users.insert(
            request.name.clone(),
            UserObject {
                name: request.name.clone(),
                emails: vec![request.email.clone()],
                groups: request.groups.clone(),
            },
        );
        Ok(())
    }

    async fn edit_user(&self, user: &UserObject) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("edit_user")?;
        match inner.users.get_mut(&user.name) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(CloudError::NotFound(format!("user {}", user.name))),
        }
    }

    async fn delete_user(&self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.enter("delete_user")?;
        inner
            .users
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("user {}", name)))
    }
}

/// Connector that always returns the same [`InMemoryCloud`]
pub struct InMemoryConnector {
    cloud: Arc<InMemoryCloud>,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn CloudApi>> {
        if info.url.is_empty() {
            return Err(CloudError::InvalidRequest(
                "connection url is empty".to_string(),
            ));
        }
        self.cloud.lock().enter("connect")?;
        let cloud: Arc<dyn CloudApi> = self.cloud.clone();
        Ok(cloud)
    }
}
