//! Identities (control-plane users)

use super::{require, tolerate_missing};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vdcflow_cloud::NewUser;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySpec {
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub email: String,
    /// Identity provider; the remote name becomes `<name>@<provider>`
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Name under which the control plane knows the identity
pub fn canonical_name(name: &str, provider: Option<&str>) -> String {
    match provider {
        Some(provider) if !provider.is_empty() => format!("{}@{}", name, provider),
        _ => name.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IdentityUpdate {
    pub email: Option<String>,
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInfo {
    /// Canonical remote name
    pub name: String,
    pub connection: String,
    pub email: String,
    pub provider: Option<String>,
    pub groups: Vec<String>,
}

fn validate_email(email: &str) -> Result<()> {
    require("email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(EngineError::validation(
            "email",
            format!("\"{}\" is not an email address", email),
        )),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDriver;

#[async_trait]
impl Driver for IdentityDriver {
    const KIND: ResourceKind = ResourceKind::Identity;
    type Spec = IdentitySpec;
    type Update = IdentityUpdate;

    fn validate(&self, _name: &str, spec: &IdentitySpec) -> Result<()> {
        require("connection", &spec.connection)?;
        validate_email(&spec.email)
    }

    async fn install(&self, scope: &mut Scope<'_, IdentitySpec>) -> Result<()> {
        let user = canonical_name(scope.name, scope.spec.provider.as_deref());
        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        if client.user_exists(&user).await? {
            tracing::debug!(%user, "User already exists");
            return Ok(());
        }
        client
            .create_user(&NewUser {
                name: user.clone(),
                email: scope.spec.email.clone(),
                groups: scope.spec.groups.clone(),
                password: scope.spec.password.clone(),
            })
            .await?;
        tracing::info!(%user, "Created user");
        Ok(())
    }

    async fn uninstall(&self, scope: &mut Scope<'_, IdentitySpec>) -> Result<()> {
        let user = canonical_name(scope.name, scope.spec.provider.as_deref());
        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        tolerate_missing(client.delete_user(&user).await)
    }

    async fn update(
        &self,
        scope: &mut Scope<'_, IdentitySpec>,
        changes: IdentityUpdate,
    ) -> Result<bool> {
        let email = changes.email.unwrap_or_else(|| scope.spec.email.clone());
        let groups = changes.groups.unwrap_or_else(|| scope.spec.groups.clone());
        if email == scope.spec.email && groups == scope.spec.groups {
            return Ok(false);
        }
        validate_email(&email)?;

        let user = canonical_name(scope.name, scope.spec.provider.as_deref());
        let client = scope.ctx.connect(&scope.spec.connection).await?.client;
        let mut remote = client.get_user(&user).await?;
        remote.emails = vec![email.clone()];
        remote.groups = groups.clone();
        client.edit_user(&remote).await?;

        scope.spec.email = email;
        scope.spec.groups = groups;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, IdentitySpec>) -> Result<serde_json::Value> {
        let info = IdentityInfo {
            name: canonical_name(scope.name, scope.spec.provider.as_deref()),
            connection: scope.spec.connection.clone(),
            email: scope.spec.email.clone(),
            provider: scope.spec.provider.clone(),
            groups: scope.spec.groups.clone(),
        };
        Ok(serde_json::to_value(info)?)
    }
}
