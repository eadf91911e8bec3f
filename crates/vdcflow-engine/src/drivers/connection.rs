//! Connection: where the control plane lives and how to log in

use super::require;
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vdcflow_cloud::ConnectionInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub login: String,
    #[serde(default, alias = "token")]
    pub jwt: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    443
}

impl ConnectionSpec {
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            url: self.url.clone(),
            login: self.login.clone(),
            jwt: self.jwt.clone(),
            port: self.port,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionUpdate {
    pub url: Option<String>,
    pub login: Option<String>,
    #[serde(alias = "token")]
    pub jwt: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionDriver;

#[async_trait]
impl Driver for ConnectionDriver {
    const KIND: ResourceKind = ResourceKind::Connection;
    type Spec = ConnectionSpec;
    type Update = ConnectionUpdate;

    fn validate(&self, _name: &str, spec: &ConnectionSpec) -> Result<()> {
        require("url", &spec.url)?;
        if spec.port == 0 {
            return Err(EngineError::validation("port", "must be between 1 and 65535"));
        }
        Ok(())
    }

    async fn install(&self, scope: &mut Scope<'_, ConnectionSpec>) -> Result<()> {
        let client = scope
            .ctx
            .connect_with(&scope.spec.connection_info())
            .await?;
        let login = client.whoami().await?;
        tracing::debug!(url = %scope.spec.url, %login, "Connected to control plane");
        if scope.spec.login.is_empty() {
            scope.spec.login = login;
        }
        Ok(())
    }

    async fn uninstall(&self, _scope: &mut Scope<'_, ConnectionSpec>) -> Result<()> {
        Ok(())
    }

    async fn update(
        &self,
        scope: &mut Scope<'_, ConnectionSpec>,
        changes: ConnectionUpdate,
    ) -> Result<bool> {
        let mut next = scope.spec.clone();
        if let Some(url) = changes.url {
            next.url = url;
        }
        if let Some(login) = changes.login {
            next.login = login;
        }
        if let Some(jwt) = changes.jwt {
            next.jwt = jwt;
        }
        if let Some(port) = changes.port {
            next.port = port;
        }
        if next == *scope.spec {
            return Ok(false);
        }
        self.validate(scope.name, &next)?;
        *scope.spec = next;
        Ok(true)
    }

    async fn info(&self, scope: &Scope<'_, ConnectionSpec>) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(scope.spec.connection_info())?)
    }
}
