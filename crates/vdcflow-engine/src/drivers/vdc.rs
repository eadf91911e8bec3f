//! Virtual datacenters (cloud spaces)

use super::account::{ACTION_USER_AUTHORIZE, ACTION_USER_UNAUTHORIZE, AccountInfo};
use super::machine::PortSpec;
use super::{AuthorizeArgs, UnauthorizeArgs, default_true, require, tolerate_missing};
use crate::acl::{AclChange, AclSynchronizer};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use crate::limits::{CapacityChanges, validate_capacity};
use crate::runtime::parse_args;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vdcflow_cloud::{
    AclEntry, AclTarget, CapacityLimits, CloudApi, CloudError, NewSpace, STATUS_DEPLOYED,
};

pub const ACTION_PORTFORWARD_CREATE: &str = "portforward_create";
pub const ACTION_PORTFORWARD_DELETE: &str = "portforward_delete";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VdcSpec {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// `false` adopts an existing space read-only
    #[serde(default = "default_true")]
    pub create: bool,
    #[serde(flatten)]
    pub limits: CapacityLimits,
    #[serde(default, rename = "externalNetworkID")]
    pub external_network_id: Option<i64>,
    #[serde(default)]
    pub private_network: Option<String>,
    #[serde(default)]
    pub users: Vec<AclEntry>,
    #[serde(default, rename = "cloudspaceID")]
    pub cloudspace_id: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VdcUpdate {
    pub description: Option<String>,
    #[serde(flatten)]
    pub limits: CapacityChanges,
}

/// Projection returned by `get_info`, read by machines and disks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VdcInfo {
    pub name: String,
    pub account: String,
    pub connection: String,
    #[serde(rename = "accountID")]
    pub account_id: u64,
    #[serde(rename = "cloudspaceID")]
    pub cloudspace_id: u64,
    pub location: String,
    pub description: String,
    pub create: bool,
    #[serde(flatten)]
    pub limits: CapacityLimits,
    #[serde(rename = "externalNetworkIP")]
    pub external_network_ip: Option<String>,
    pub private_network: Option<String>,
    pub users: Vec<AclEntry>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PortForwardArgs {
    /// Name of the Machine resource
    machine: String,
    ports: Vec<PortSpec>,
}

/// Parent account and a client for its connection
async fn parent(scope: &Scope<'_, VdcSpec>) -> Result<(AccountInfo, Arc<dyn CloudApi>)> {
    let account: AccountInfo = scope
        .ctx
        .info(ResourceKind::Account, &scope.spec.account)
        .await?;
    let client = scope.ctx.connect(&account.connection).await?.client;
    Ok((account, client))
}

/// Remote id of the space, looked up by name when not yet known
async fn space_id(
    scope: &Scope<'_, VdcSpec>,
    account_id: u64,
    client: &dyn CloudApi,
) -> Result<u64> {
    if let Some(id) = scope.spec.cloudspace_id {
        return Ok(id);
    }
    match client.find_space(account_id, scope.name).await? {
        Some(space) => Ok(space.id),
        None => Err(CloudError::NotFound(format!("space {}", scope.name)).into()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VdcDriver;

impl VdcDriver {
    async fn portforward(
        &self,
        scope: &mut Scope<'_, VdcSpec>,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args: PortForwardArgs = parse_args(action, args)?;
        for port in &args.ports {
            port.validate()?;
        }
        let (account, client) = parent(scope).await?;
        let space = space_id(scope, account.account_id, client.as_ref()).await?;
        // Machine instances read this datacenter; it never reads them back
        let machine_id = match client.find_machine(space, &args.machine).await? {
            Some(machine) => machine.id,
            None => {
                return Err(CloudError::NotFound(format!(
                    "machine {} in space {}",
                    args.machine, scope.name
                ))
                .into());
            }
        };

        let existing = client.list_portforwards(space).await?;
        let mut changed = 0;
        for port in &args.ports {
            let wanted = port.forward(machine_id);
            if action == ACTION_PORTFORWARD_CREATE {
                if existing.contains(&wanted) {
                    continue;
                }
                client.create_portforward(space, &wanted).await?;
            } else {
                if !existing.contains(&wanted) {
                    continue;
                }
                tolerate_missing(client.delete_portforward(space, &wanted).await)?;
            }
            changed += 1;
        }
        tracing::info!(vdc = scope.name, machine = %args.machine, action, changed, "Port forwards reconciled");
        Ok(serde_json::json!({ "changed": changed }))
    }
}

#[async_trait]
impl Driver for VdcDriver {
    const KIND: ResourceKind = ResourceKind::VirtualDatacenter;
    type Spec = VdcSpec;
    type Update = VdcUpdate;

    fn validate(&self, _name: &str, spec: &VdcSpec) -> Result<()> {
        require("account", &spec.account)?;
        require("location", &spec.location)?;
        validate_capacity(&spec.limits)
    }

    async fn install(&self, scope: &mut Scope<'_, VdcSpec>) -> Result<()> {
        let account: AccountInfo = scope
            .ctx
            .info(ResourceKind::Account, &scope.spec.account)
            .await?;
        let connected = scope.ctx.connect(&account.connection).await?;
        let client = connected.client;

        let space = match client.find_space(account.account_id, scope.name).await? {
            Some(space) => space,
            None if scope.spec.create => {
                let space = client
                    .create_space(&NewSpace {
                        account_id: account.account_id,
                        name: scope.name.to_string(),
                        location: scope.spec.location.clone(),
                        owner: connected.info.login.clone(),
                        description: scope.spec.description.clone(),
                        limits: scope.spec.limits,
                        external_network_id: scope.spec.external_network_id,
                        private_network: scope.spec.private_network.clone(),
                    })
                    .await?;
                tracing::info!(vdc = scope.name, id = space.id, "Created space");
                space
            }
            None => {
                return Err(CloudError::NotFound(format!(
                    "space {} (create is disabled)",
                    scope.name
                ))
                .into());
            }
        };

        let id = space.id;
        scope.spec.cloudspace_id = Some(id);
        scope
            .ctx
            .poller()
            .wait_until_deployed(scope.name, || {
                let client = Arc::clone(&client);
                async move {
                    let space = client.get_space(id).await?;
                    Ok::<_, EngineError>(space.status)
                }
            })
            .await?;

        scope.spec.status = Some(STATUS_DEPLOYED.to_string());
        scope.spec.users = client.list_acl(AclTarget::Space(id)).await?;
        Ok(())
    }

    async fn uninstall(&self, scope: &mut Scope<'_, VdcSpec>) -> Result<()> {
        if !scope.spec.create {
            return Err(EngineError::Precondition(format!(
                "virtual datacenter \"{}\" is read-only (create is false) and cannot be deleted",
                scope.name
            )));
        }

        let (account, client) = parent(scope).await?;
        match space_id(scope, account.account_id, client.as_ref()).await {
            Ok(id) => {
                tolerate_missing(client.delete_space(id).await)?;
                tracing::info!(vdc = scope.name, id, "Deleted space");
            }
            Err(EngineError::Cloud(CloudError::NotFound(_))) => {
                tracing::debug!(vdc = scope.name, "Space already gone");
            }
            Err(e) => return Err(e),
        }

        scope.spec.cloudspace_id = None;
        scope.spec.status = None;
        scope.spec.users.clear();
        Ok(())
    }

    async fn update(&self, scope: &mut Scope<'_, VdcSpec>, changes: VdcUpdate) -> Result<bool> {
        let limits = changes.limits.merged(&scope.spec.limits);
        let description = changes
            .description
            .unwrap_or_else(|| scope.spec.description.clone());
        if limits == scope.spec.limits && description == scope.spec.description {
            return Ok(false);
        }
        validate_capacity(&limits)?;

        let (account, client) = parent(scope).await?;
        let id = space_id(scope, account.account_id, client.as_ref()).await?;
        let mut space = client.get_space(id).await?;
        space.limits = limits;
        space.description = description.clone();
        client.save_space(&space).await?;

        scope.spec.limits = limits;
        scope.spec.description = description;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, VdcSpec>) -> Result<serde_json::Value> {
        let (account, client) = parent(scope).await?;
        let id = space_id(scope, account.account_id, client.as_ref()).await?;
        let space = client.get_space(id).await?;
        let info = VdcInfo {
            name: scope.name.to_string(),
            account: scope.spec.account.clone(),
            connection: account.connection,
            account_id: account.account_id,
            cloudspace_id: id,
            location: space.location,
            description: scope.spec.description.clone(),
            create: scope.spec.create,
            limits: scope.spec.limits,
            external_network_ip: space.external_network_ip,
            private_network: space.private_network,
            users: space.acl,
            status: space.status,
        };
        Ok(serde_json::to_value(info)?)
    }

    fn actions(&self) -> &'static [&'static str] {
        &[
            ACTION_USER_AUTHORIZE,
            ACTION_USER_UNAUTHORIZE,
            ACTION_PORTFORWARD_CREATE,
            ACTION_PORTFORWARD_DELETE,
        ]
    }

    async fn action(
        &self,
        scope: &mut Scope<'_, VdcSpec>,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if action == ACTION_PORTFORWARD_CREATE || action == ACTION_PORTFORWARD_DELETE {
            return self.portforward(scope, action, args).await;
        }

        let (account, client) = parent(scope).await?;
        let id = space_id(scope, account.account_id, client.as_ref()).await?;
        let sync = AclSynchronizer::new(scope.ctx, client.as_ref(), AclTarget::Space(id));

        let change = match action {
            ACTION_USER_AUTHORIZE => {
                let args: AuthorizeArgs = parse_args(action, args)?;
                sync.authorize(&mut scope.spec.users, &args.user, &args.accesstype)
                    .await?
            }
            ACTION_USER_UNAUTHORIZE => {
                let args: UnauthorizeArgs = parse_args(action, args)?;
                sync.unauthorize(&mut scope.spec.users, &args.user).await?
            }
            other => {
                return Err(EngineError::UnknownAction {
                    kind: Self::KIND,
                    name: scope.name.to_string(),
                    action: other.to_string(),
                });
            }
        };
        Ok(serde_json::Value::Bool(change != AclChange::Unchanged))
    }
}
