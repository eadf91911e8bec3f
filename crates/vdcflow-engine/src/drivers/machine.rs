//! Virtual machines inside a virtual datacenter

use super::disk::DiskInfo;
use super::sshkey::SshKeyInfo;
use super::vdc::{ACTION_PORTFORWARD_CREATE, ACTION_PORTFORWARD_DELETE, VdcInfo};
use super::{require, tolerate_missing};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use crate::runtime::parse_args;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use vdcflow_cloud::{CloudApi, DiskType, NewDisk, NewMachine, PortForward, PowerAction};

const STATUS_HALTED: &str = "HALTED";

const POWER_ACTIONS: [(&str, PowerAction); 6] = [
    ("start", PowerAction::Start),
    ("stop", PowerAction::Stop),
    ("restart", PowerAction::Restart),
    ("pause", PowerAction::Pause),
    ("resume", PowerAction::Resume),
    ("reset", PowerAction::Reset),
];

const ACTIONS: [&str; 16] = [
    "start",
    "stop",
    "restart",
    "pause",
    "resume",
    "reset",
    "disk_add",
    "disk_attach",
    "disk_detach",
    "disk_delete",
    "snapshot",
    "snapshot_list",
    "snapshot_rollback",
    "snapshot_delete",
    ACTION_PORTFORWARD_CREATE,
    ACTION_PORTFORWARD_DELETE,
];

/// Public port of the space forwarded to a machine port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Public port
    pub source: u16,
    /// Port on the machine
    pub destination: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl PortSpec {
    pub fn validate(&self) -> Result<()> {
        if self.source == 0 || self.destination == 0 {
            return Err(EngineError::validation(
                "ports",
                format!("{}:{} is not a valid port pair", self.source, self.destination),
            ));
        }
        if self.protocol != "tcp" && self.protocol != "udp" {
            return Err(EngineError::validation(
                "ports",
                format!("unsupported protocol \"{}\"", self.protocol),
            ));
        }
        Ok(())
    }

    pub(crate) fn forward(&self, machine_id: u64) -> PortForward {
        PortForward {
            machine_id,
            public_port: self.source,
            local_port: self.destination,
            protocol: self.protocol.clone(),
        }
    }
}

fn default_boot_disk_size() -> u64 {
    10
}

fn default_memory() -> u64 {
    512
}

fn default_vcpus() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub vdc: String,
    /// Name of the SSHKey resource whose public key is installed
    #[serde(default)]
    pub ssh_key: Option<String>,
    #[serde(default)]
    pub os_image: String,
    /// GB
    #[serde(default = "default_boot_disk_size")]
    pub boot_disk_size: u64,
    /// MiB
    #[serde(default = "default_memory")]
    pub memory: u64,
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default, rename = "machineID")]
    pub machine_id: Option<u64>,
    #[serde(default)]
    pub ip_private: Option<String>,
    #[serde(default)]
    pub ip_public: Option<String>,
    #[serde(default)]
    pub disks: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MachineUpdate {
    pub description: Option<String>,
    pub memory: Option<u64>,
    pub vcpus: Option<u32>,
}

/// Projection returned by `get_info`, built from the spec alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    pub name: String,
    pub vdc: String,
    #[serde(rename = "machineID")]
    pub machine_id: Option<u64>,
    pub os_image: String,
    pub memory: u64,
    pub vcpus: u32,
    pub boot_disk_size: u64,
    pub description: String,
    pub ip_private: Option<String>,
    pub ip_public: Option<String>,
    pub disks: Vec<u64>,
    pub ports: Vec<PortSpec>,
    pub ssh_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiskAddArgs {
    name: String,
    #[serde(default = "default_boot_disk_size")]
    size: u64,
    #[serde(default, rename = "type")]
    disk_type: DiskType,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct DiskRefArgs {
    /// Name of the Disk resource
    disk: String,
}

#[derive(Debug, Deserialize)]
struct DiskDeleteArgs {
    #[serde(rename = "diskId")]
    disk_id: u64,
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotArgs {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotEpochArgs {
    #[serde(rename = "snapshotEpoch", alias = "epoch")]
    epoch: i64,
}

#[derive(Debug, Deserialize)]
struct PortsArgs {
    ports: Vec<PortSpec>,
}

/// Parent space and a client for its connection
async fn remote(scope: &Scope<'_, MachineSpec>) -> Result<(VdcInfo, Arc<dyn CloudApi>)> {
    let vdc: VdcInfo = scope
        .ctx
        .info(ResourceKind::VirtualDatacenter, &scope.spec.vdc)
        .await?;
    let client = scope.ctx.connect(&vdc.connection).await?.client;
    Ok((vdc, client))
}

fn machine_id(scope: &Scope<'_, MachineSpec>) -> Result<u64> {
    scope.spec.machine_id.ok_or_else(|| {
        EngineError::State(format!("machine \"{}\" has no remote id", scope.name))
    })
}

fn validate_sizing(memory: u64, vcpus: u32) -> Result<()> {
    if memory == 0 {
        return Err(EngineError::validation("memory", "must be greater than 0"));
    }
    if vcpus == 0 {
        return Err(EngineError::validation("vcpus", "must be greater than 0"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MachineDriver;

impl MachineDriver {
    async fn power(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        action: PowerAction,
    ) -> Result<serde_json::Value> {
        let id = machine_id(scope)?;
        let (_, client) = remote(scope).await?;
        client.machine_power(id, action).await?;
        tracing::info!(machine = scope.name, %action, "Power action done");
        Ok(json!({ "status": action.resulting_status() }))
    }

    async fn disk_add(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        args: DiskAddArgs,
    ) -> Result<serde_json::Value> {
        if args.disk_type == DiskType::Boot {
            return Err(EngineError::validation("type", "only data disks can be added"));
        }
        require("name", &args.name)?;
        let id = machine_id(scope)?;
        let (vdc, client) = remote(scope).await?;
        let disk = client
            .create_disk(&NewDisk {
                account_id: vdc.account_id,
                name: args.name,
                location: vdc.location,
                description: args.description,
                size: args.size,
                disk_type: DiskType::Data,
            })
            .await?;
        client.attach_disk(id, disk.id).await?;
        scope.spec.disks.push(disk.id);
        tracing::info!(machine = scope.name, disk = disk.id, "Added disk");
        Ok(json!({ "diskId": disk.id }))
    }

    async fn disk_attach(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        args: DiskRefArgs,
    ) -> Result<serde_json::Value> {
        let id = machine_id(scope)?;
        let disk: DiskInfo = scope.ctx.info(ResourceKind::Disk, &args.disk).await?;
        let disk_id = disk.require_id()?;
        let (_, client) = remote(scope).await?;
        client.attach_disk(id, disk_id).await?;
        if !scope.spec.disks.contains(&disk_id) {
            scope.spec.disks.push(disk_id);
        }
        Ok(json!({ "diskId": disk_id }))
    }

    async fn disk_detach(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        args: DiskRefArgs,
    ) -> Result<serde_json::Value> {
        let id = machine_id(scope)?;
        let disk: DiskInfo = scope.ctx.info(ResourceKind::Disk, &args.disk).await?;
        let disk_id = disk.require_id()?;
        let (_, client) = remote(scope).await?;
        let machine = client.get_machine(id).await?;
        if disk.disk_type == DiskType::Boot || machine.boot_disk_id == disk_id {
            return Err(EngineError::Precondition(format!(
                "boot disk \"{}\" cannot be detached from machine \"{}\"",
                args.disk, scope.name
            )));
        }
        client.detach_disk(id, disk_id).await?;
        scope.spec.disks.retain(|d| *d != disk_id);
        Ok(json!({ "diskId": disk_id }))
    }

    async fn disk_delete(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        args: DiskDeleteArgs,
    ) -> Result<serde_json::Value> {
        let id = machine_id(scope)?;
        let (_, client) = remote(scope).await?;
        let machine = client.get_machine(id).await?;
        if machine.boot_disk_id == args.disk_id {
            return Err(EngineError::Precondition(format!(
                "boot disk {} of machine \"{}\" cannot be deleted",
                args.disk_id, scope.name
            )));
        }
        if machine.disks.contains(&args.disk_id) {
            client.detach_disk(id, args.disk_id).await?;
        }
        tolerate_missing(client.delete_disk(args.disk_id).await)?;
        scope.spec.disks.retain(|d| *d != args.disk_id);
        tracing::info!(machine = scope.name, disk = args.disk_id, "Deleted disk");
        Ok(json!({ "diskId": args.disk_id }))
    }

    async fn snapshot(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let id = machine_id(scope)?;
        let (_, client) = remote(scope).await?;
        match action {
            "snapshot" => {
                let args: SnapshotArgs = parse_args(action, args)?;
                let name = args.name.unwrap_or_else(|| {
                    format!("{}-{}", scope.name, Utc::now().format("%Y%m%d%H%M%S"))
                });
                let snapshot = client.create_snapshot(id, &name).await?;
                Ok(serde_json::to_value(snapshot)?)
            }
            "snapshot_list" => Ok(serde_json::to_value(client.list_snapshots(id).await?)?),
            "snapshot_rollback" => {
                let args: SnapshotEpochArgs = parse_args(action, args)?;
                let machine = client.get_machine(id).await?;
                if machine.status != STATUS_HALTED {
                    return Err(EngineError::Precondition(format!(
                        "machine \"{}\" must be stopped before a rollback (status {})",
                        scope.name, machine.status
                    )));
                }
                client.rollback_snapshot(id, args.epoch).await?;
                Ok(json!({ "snapshotEpoch": args.epoch }))
            }
            _ => {
                let args: SnapshotEpochArgs = parse_args(action, args)?;
                client.delete_snapshot(id, args.epoch).await?;
                Ok(json!({ "snapshotEpoch": args.epoch }))
            }
        }
    }

    async fn portforward(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        action: &str,
        args: PortsArgs,
    ) -> Result<serde_json::Value> {
        for port in &args.ports {
            port.validate()?;
        }
        let id = machine_id(scope)?;
        let (vdc, client) = remote(scope).await?;
        let existing = client.list_portforwards(vdc.cloudspace_id).await?;

        let mut changed = 0;
        for port in args.ports {
            let wanted = port.forward(id);
            if action == ACTION_PORTFORWARD_CREATE {
                if !existing.contains(&wanted) {
                    client.create_portforward(vdc.cloudspace_id, &wanted).await?;
                    changed += 1;
                }
                if !scope.spec.ports.contains(&port) {
                    scope.spec.ports.push(port);
                }
            } else {
                if existing.contains(&wanted) {
                    tolerate_missing(client.delete_portforward(vdc.cloudspace_id, &wanted).await)?;
                    changed += 1;
                }
                scope.spec.ports.retain(|p| *p != port);
            }
        }
        Ok(json!({ "changed": changed }))
    }
}

#[async_trait]
impl Driver for MachineDriver {
    const KIND: ResourceKind = ResourceKind::Machine;
    type Spec = MachineSpec;
    type Update = MachineUpdate;

    fn validate(&self, _name: &str, spec: &MachineSpec) -> Result<()> {
        require("vdc", &spec.vdc)?;
        require("osImage", &spec.os_image)?;
        if spec.boot_disk_size == 0 {
            return Err(EngineError::validation("bootDiskSize", "must be greater than 0"));
        }
        validate_sizing(spec.memory, spec.vcpus)?;
        spec.ports.iter().try_for_each(PortSpec::validate)
    }

    async fn install(&self, scope: &mut Scope<'_, MachineSpec>) -> Result<()> {
        let (vdc, client) = remote(scope).await?;

        let authorized_key = match &scope.spec.ssh_key {
            Some(key) => {
                let info: SshKeyInfo = scope.ctx.info(ResourceKind::SshKey, key).await?;
                Some(info.public_key)
            }
            None => None,
        };

        let machine = match client.find_machine(vdc.cloudspace_id, scope.name).await? {
            Some(machine) => machine,
            None => {
                let machine = client
                    .create_machine(&NewMachine {
                        space_id: vdc.cloudspace_id,
                        name: scope.name.to_string(),
                        description: scope.spec.description.clone(),
                        image: scope.spec.os_image.clone(),
                        memory: scope.spec.memory,
                        vcpus: scope.spec.vcpus,
                        boot_disk_size: scope.spec.boot_disk_size,
                        authorized_key,
                    })
                    .await?;
                tracing::info!(machine = scope.name, id = machine.id, "Created machine");
                machine
            }
        };

        scope.spec.machine_id = Some(machine.id);
        scope.spec.ip_private = machine.ip_private.clone();
        scope.spec.ip_public = vdc.external_network_ip.clone();
        scope.spec.disks = machine.disks.clone();

        if !scope.spec.ports.is_empty() {
            let existing = client.list_portforwards(vdc.cloudspace_id).await?;
            for port in &scope.spec.ports {
                let wanted = port.forward(machine.id);
                if !existing.contains(&wanted) {
                    client.create_portforward(vdc.cloudspace_id, &wanted).await?;
                }
            }
        }
        Ok(())
    }

    async fn uninstall(&self, scope: &mut Scope<'_, MachineSpec>) -> Result<()> {
        let (vdc, client) = remote(scope).await?;
        let id = match scope.spec.machine_id {
            Some(id) => Some(id),
            None => client
                .find_machine(vdc.cloudspace_id, scope.name)
                .await?
                .map(|m| m.id),
        };
        if let Some(id) = id {
            tolerate_missing(client.delete_machine(id).await)?;
            tracing::info!(machine = scope.name, id, "Deleted machine");
        }

        scope.spec.machine_id = None;
        scope.spec.ip_private = None;
        scope.spec.ip_public = None;
        scope.spec.disks.clear();
        Ok(())
    }

    async fn update(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        changes: MachineUpdate,
    ) -> Result<bool> {
        let description = changes
            .description
            .unwrap_or_else(|| scope.spec.description.clone());
        let memory = changes.memory.unwrap_or(scope.spec.memory);
        let vcpus = changes.vcpus.unwrap_or(scope.spec.vcpus);
        if description == scope.spec.description
            && memory == scope.spec.memory
            && vcpus == scope.spec.vcpus
        {
            return Ok(false);
        }
        validate_sizing(memory, vcpus)?;

        let id = machine_id(scope)?;
        let (_, client) = remote(scope).await?;
        let mut machine = client.get_machine(id).await?;
        machine.description = description.clone();
        machine.memory = memory;
        machine.vcpus = vcpus;
        client.save_machine(&machine).await?;

        scope.spec.description = description;
        scope.spec.memory = memory;
        scope.spec.vcpus = vcpus;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, MachineSpec>) -> Result<serde_json::Value> {
        let spec = &*scope.spec;
        let info = MachineInfo {
            name: scope.name.to_string(),
            vdc: spec.vdc.clone(),
            machine_id: spec.machine_id,
            os_image: spec.os_image.clone(),
            memory: spec.memory,
            vcpus: spec.vcpus,
            boot_disk_size: spec.boot_disk_size,
            description: spec.description.clone(),
            ip_private: spec.ip_private.clone(),
            ip_public: spec.ip_public.clone(),
            disks: spec.disks.clone(),
            ports: spec.ports.clone(),
            ssh_key: spec.ssh_key.clone(),
        };
        Ok(serde_json::to_value(info)?)
    }

    fn actions(&self) -> &'static [&'static str] {
        &ACTIONS
    }

    async fn action(
        &self,
        scope: &mut Scope<'_, MachineSpec>,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if let Some((_, power)) = POWER_ACTIONS.iter().find(|(name, _)| *name == action) {
            return self.power(scope, *power).await;
        }
        match action {
            "disk_add" => self.disk_add(scope, parse_args(action, args)?).await,
            "disk_attach" => self.disk_attach(scope, parse_args(action, args)?).await,
            "disk_detach" => self.disk_detach(scope, parse_args(action, args)?).await,
            "disk_delete" => self.disk_delete(scope, parse_args(action, args)?).await,
            "snapshot" | "snapshot_list" | "snapshot_rollback" | "snapshot_delete" => {
                self.snapshot(scope, action, args).await
            }
            ACTION_PORTFORWARD_CREATE | ACTION_PORTFORWARD_DELETE => {
                self.portforward(scope, action, parse_args(action, args)?)
                    .await
            }
            other => Err(EngineError::UnknownAction {
                kind: Self::KIND,
                name: scope.name.to_string(),
                action: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: MachineSpec =
            serde_json::from_value(json!({"vdc": "vdc1", "osImage": "Ubuntu 22.04"})).unwrap();
        assert_eq!(spec.memory, 512);
        assert_eq!(spec.vcpus, 1);
        assert_eq!(spec.boot_disk_size, 10);
        assert!(MachineDriver.validate("vm1", &spec).is_ok());
    }

    #[test]
    fn test_ports_are_validated() {
        let spec: MachineSpec = serde_json::from_value(json!({
            "vdc": "vdc1",
            "osImage": "Ubuntu 22.04",
            "ports": [{"source": 2222, "destination": 22, "protocol": "sctp"}]
        }))
        .unwrap();
        let err = MachineDriver.validate("vm1", &spec).unwrap_err();
        assert!(err.to_string().contains("sctp"));
    }

    #[test]
    fn test_every_action_is_dispatched() {
        for action in ACTIONS {
            let known = POWER_ACTIONS.iter().any(|(name, _)| *name == action)
                || action.starts_with("disk_")
                || action.starts_with("snapshot")
                || action.starts_with("portforward_");
            assert!(known, "{}", action);
        }
    }
}
