//! Accounts: the ownership and capacity boundary above virtual datacenters

use super::{AuthorizeArgs, UnauthorizeArgs, default_true, require, tolerate_missing};
use crate::acl::{AclChange, AclSynchronizer};
use crate::context::Connected;
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use crate::limits::{CapacityChanges, validate_capacity};
use crate::runtime::parse_args;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vdcflow_cloud::{AclEntry, AclTarget, CapacityLimits, CloudApi, CloudError, NewAccount};

pub const ACTION_USER_AUTHORIZE: &str = "user_authorize";
pub const ACTION_USER_UNAUTHORIZE: &str = "user_unauthorize";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub description: String,
    /// `false` adopts an existing account read-only
    #[serde(default = "default_true")]
    pub create: bool,
    #[serde(flatten)]
    pub limits: CapacityLimits,
    #[serde(default)]
    pub consumption_from: Option<i64>,
    #[serde(default)]
    pub consumption_to: Option<i64>,
    #[serde(default)]
    pub users: Vec<AclEntry>,
    #[serde(default, rename = "accountID")]
    pub account_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountUpdate {
    pub description: Option<String>,
    #[serde(flatten)]
    pub limits: CapacityChanges,
}

/// Projection returned by `get_info`, also read by virtual datacenters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub name: String,
    pub connection: String,
    #[serde(rename = "accountID")]
    pub account_id: u64,
    pub description: String,
    pub create: bool,
    #[serde(flatten)]
    pub limits: CapacityLimits,
    pub consumption_from: Option<i64>,
    pub consumption_to: Option<i64>,
    pub users: Vec<AclEntry>,
    pub status: String,
}

/// Remote id of the account, looked up by name when not yet known
async fn account_id(scope: &Scope<'_, AccountSpec>, client: &dyn CloudApi) -> Result<u64> {
    if let Some(id) = scope.spec.account_id {
        return Ok(id);
    }
    match client.find_account(scope.name).await? {
        Some(account) => Ok(account.id),
        None => Err(CloudError::NotFound(format!("account {}", scope.name)).into()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountDriver;

#[async_trait]
impl Driver for AccountDriver {
    const KIND: ResourceKind = ResourceKind::Account;
    type Spec = AccountSpec;
    type Update = AccountUpdate;

    fn validate(&self, _name: &str, spec: &AccountSpec) -> Result<()> {
        require("connection", &spec.connection)?;
        validate_capacity(&spec.limits)
    }

    async fn install(&self, scope: &mut Scope<'_, AccountSpec>) -> Result<()> {
        let Connected { info, client } = scope.ctx.connect(&scope.spec.connection).await?;

        let account = match client.find_account(scope.name).await? {
            Some(mut account) => {
                if scope.spec.create && account.limits != scope.spec.limits {
                    account.limits = scope.spec.limits;
                    client.save_account(&account).await?;
                    tracing::info!(account = scope.name, "Reconciled account limits");
                }
                account
            }
            None if scope.spec.create => {
                let account = client
                    .create_account(&NewAccount {
                        name: scope.name.to_string(),
                        owner: info.login.clone(),
                        description: scope.spec.description.clone(),
                        limits: scope.spec.limits,
                    })
                    .await?;
                tracing::info!(account = scope.name, id = account.id, "Created account");
                account
            }
            None => {
                return Err(CloudError::NotFound(format!(
                    "account {} (create is disabled)",
                    scope.name
                ))
                .into());
            }
        };

        scope.spec.account_id = Some(account.id);
        scope.spec.users = account.acl;
        Ok(())
    }

    async fn uninstall(&self, scope: &mut Scope<'_, AccountSpec>) -> Result<()> {
        if !scope.spec.create {
            return Err(EngineError::Precondition(format!(
                "account \"{}\" is read-only (create is false) and cannot be deleted",
                scope.name
            )));
        }

        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        match account_id(scope, client.as_ref()).await {
            Ok(id) => {
                let spaces = client.list_spaces(id).await?;
                if !spaces.is_empty() {
                    return Err(EngineError::Precondition(format!(
                        "account \"{}\" still owns {} virtual datacenter(s)",
                        scope.name,
                        spaces.len()
                    )));
                }
                tolerate_missing(client.delete_account(id).await)?;
                tracing::info!(account = scope.name, id, "Deleted account");
            }
            Err(EngineError::Cloud(CloudError::NotFound(_))) => {
                tracing::debug!(account = scope.name, "Account already gone");
            }
            Err(e) => return Err(e),
        }

        scope.spec.account_id = None;
        scope.spec.users.clear();
        Ok(())
    }

    async fn update(
        &self,
        scope: &mut Scope<'_, AccountSpec>,
        changes: AccountUpdate,
    ) -> Result<bool> {
        let limits = changes.limits.merged(&scope.spec.limits);
        let description = changes
            .description
            .unwrap_or_else(|| scope.spec.description.clone());
        if limits == scope.spec.limits && description == scope.spec.description {
            return Ok(false);
        }
        validate_capacity(&limits)?;

        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        let id = account_id(scope, client.as_ref()).await?;
        let mut account = client.get_account(id).await?;
        account.limits = limits;
        account.description = description.clone();
        client.save_account(&account).await?;

        scope.spec.limits = limits;
        scope.spec.description = description;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, AccountSpec>) -> Result<serde_json::Value> {
        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        let id = account_id(scope, client.as_ref()).await?;
        let account = client.get_account(id).await?;
        let info = AccountInfo {
            name: scope.name.to_string(),
            connection: scope.spec.connection.clone(),
            account_id: id,
            description: scope.spec.description.clone(),
            create: scope.spec.create,
            limits: scope.spec.limits,
            consumption_from: scope.spec.consumption_from,
            consumption_to: scope.spec.consumption_to,
            users: account.acl,
            status: account.status,
        };
        Ok(serde_json::to_value(info)?)
    }

    fn actions(&self) -> &'static [&'static str] {
        &[ACTION_USER_AUTHORIZE, ACTION_USER_UNAUTHORIZE]
    }

    async fn action(
        &self,
        scope: &mut Scope<'_, AccountSpec>,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        let id = account_id(scope, client.as_ref()).await?;
        let sync = AclSynchronizer::new(scope.ctx, client.as_ref(), AclTarget::Account(id));

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
