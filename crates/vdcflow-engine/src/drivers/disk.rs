//! Standalone disks of a virtual datacenter

use super::vdc::VdcInfo;
use super::{require, tolerate_missing};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use crate::limits::{merge_io_tune, validate_io_tune};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vdcflow_cloud::{CloudApi, DiskObject, DiskType, IoTune, NewDisk};

fn default_size() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    #[serde(default)]
    pub vdc: String,
    /// GB
    #[serde(default = "default_size")]
    pub size: u64,
    #[serde(default, rename = "type")]
    pub disk_type: DiskType,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub limits: IoTune,
    /// Set for adopted disks, filled in at install otherwise
    #[serde(default, rename = "diskId")]
    pub disk_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiskUpdate {
    pub size: Option<u64>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub limits: IoTune,
}

/// Projection returned by `get_info`, built from the spec alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub name: String,
    pub vdc: String,
    #[serde(rename = "diskId")]
    pub disk_id: Option<u64>,
    #[serde(rename = "type")]
    pub disk_type: DiskType,
    pub size: u64,
    pub description: String,
    #[serde(flatten)]
    pub limits: IoTune,
}

impl DiskInfo {
    pub fn require_id(&self) -> Result<u64> {
        self.disk_id
            .ok_or_else(|| EngineError::State(format!("disk \"{}\" has no remote id", self.name)))
    }
}

async fn remote(scope: &Scope<'_, DiskSpec>) -> Result<(VdcInfo, Arc<dyn CloudApi>)> {
    let vdc: VdcInfo = scope
        .ctx
        .info(ResourceKind::VirtualDatacenter, &scope.spec.vdc)
        .await?;
    let client = scope.ctx.connect(&vdc.connection).await?.client;
    Ok((vdc, client))
}

/// Data disk of the space's account with the resource's name
async fn find_data_disk(
    scope: &Scope<'_, DiskSpec>,
    vdc: &VdcInfo,
    client: &dyn CloudApi,
) -> Result<Option<DiskObject>> {
    Ok(client
        .list_disks(vdc.account_id)
        .await?
        .into_iter()
        .find(|d| {
            d.name == scope.name && d.disk_type == DiskType::Data && d.location == vdc.location
        }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskDriver;

#[async_trait]
impl Driver for DiskDriver {
    const KIND: ResourceKind = ResourceKind::Disk;
    type Spec = DiskSpec;
    type Update = DiskUpdate;

    fn validate(&self, _name: &str, spec: &DiskSpec) -> Result<()> {
        require("vdc", &spec.vdc)?;
        if spec.size == 0 {
            return Err(EngineError::validation("size", "must be at least 1 GB"));
        }
        if spec.disk_type == DiskType::Boot && spec.disk_id.is_none() {
            return Err(EngineError::validation(
                "diskId",
                "boot disks are created with their machine and can only be adopted by id",
            ));
        }
        validate_io_tune(&spec.limits)
    }

    async fn install(&self, scope: &mut Scope<'_, DiskSpec>) -> Result<()> {
        let (vdc, client) = remote(scope).await?;

        let disk = match scope.spec.disk_id {
            Some(id) => client.get_disk(id).await?,
            None => match find_data_disk(scope, &vdc, client.as_ref()).await? {
                Some(disk) => disk,
                None => {
                    let disk = client
                        .create_disk(&NewDisk {
                            account_id: vdc.account_id,
                            name: scope.name.to_string(),
                            location: vdc.location.clone(),
                            description: scope.spec.description.clone(),
                            size: scope.spec.size,
                            disk_type: DiskType::Data,
                        })
                        .await?;
                    tracing::info!(disk = scope.name, id = disk.id, "Created disk");
                    disk
                }
            },
        };

        scope.spec.disk_id = Some(disk.id);
        scope.spec.disk_type = disk.disk_type;
        scope.spec.size = disk.size;
        if disk.iotune != scope.spec.limits {
            client.set_disk_limit_io(disk.id, &scope.spec.limits).await?;
        }
        Ok(())
    }

    async fn uninstall(&self, scope: &mut Scope<'_, DiskSpec>) -> Result<()> {
        if scope.spec.disk_type == DiskType::Boot {
            return Err(EngineError::Precondition(format!(
                "disk \"{}\" is a boot disk and cannot be deleted",
                scope.name
            )));
        }

        let (vdc, client) = remote(scope).await?;
        let id = match scope.spec.disk_id {
            Some(id) => Some(id),
            None => find_data_disk(scope, &vdc, client.as_ref())
                .await?
                .map(|d| d.id),
        };
        if let Some(id) = id {
            tolerate_missing(client.delete_disk(id).await)?;
            tracing::info!(disk = scope.name, id, "Deleted disk");
        }
        scope.spec.disk_id = None;
        Ok(())
    }

    async fn update(&self, scope: &mut Scope<'_, DiskSpec>, changes: DiskUpdate) -> Result<bool> {
        let limits = merge_io_tune(&scope.spec.limits, &changes.limits);
        let size = changes.size.unwrap_or(scope.spec.size);
        let description = changes
            .description
            .unwrap_or_else(|| scope.spec.description.clone());
        if limits == scope.spec.limits
            && size == scope.spec.size
            && description == scope.spec.description
        {
            return Ok(false);
        }
        validate_io_tune(&limits)?;
        if size < scope.spec.size {
            return Err(EngineError::validation(
                "size",
                format!("disks cannot shrink ({} GB to {} GB)", scope.spec.size, size),
            ));
        }

        let id = scope
            .spec
            .disk_id
            .ok_or_else(|| EngineError::State(format!("disk \"{}\" has no remote id", scope.name)))?;
        let (_, client) = remote(scope).await?;
        let mut disk = client.get_disk(id).await?;
        disk.size = size;
        disk.description = description.clone();
        disk.iotune = limits;
        client.save_disk(&disk).await?;
        tracing::info!(disk = scope.name, id, "Saved disk");

        scope.spec.limits = limits;
        scope.spec.size = size;
        scope.spec.description = description;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, DiskSpec>) -> Result<serde_json::Value> {
        let info = DiskInfo {
            name: scope.name.to_string(),
            vdc: scope.spec.vdc.clone(),
            disk_id: scope.spec.disk_id,
            disk_type: scope.spec.disk_type,
            size: scope.spec.size,
            description: scope.spec.description.clone(),
            limits: scope.spec.limits,
        };
        Ok(serde_json::to_value(info)?)
    }
}
