//! SSH key pairs handed to new machines

use super::require;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::lifecycle::{Driver, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeySpec {
    /// Private key path; the public key is read from `<path>.pub`
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl SshKeySpec {
    fn public_key_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.pub", self.path))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyUpdate {
    pub path: Option<String>,
    pub public_key: Option<String>,
}

/// What machines read from a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyInfo {
    pub name: String,
    pub path: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SshKeyDriver;

#[async_trait]
impl Driver for SshKeyDriver {
    const KIND: ResourceKind = ResourceKind::SshKey;
    type Spec = SshKeySpec;
    type Update = SshKeyUpdate;

    fn validate(&self, _name: &str, spec: &SshKeySpec) -> Result<()> {
        require("path", &spec.path)
    }

    async fn install(&self, scope: &mut Scope<'_, SshKeySpec>) -> Result<()> {
        if scope.spec.public_key.is_some() {
            return Ok(());
        }
        let path = scope.spec.public_key_path();
        let key = tokio::fs::read_to_string(&path).await?;
        tracing::debug!(path = %path.display(), "Loaded public key");
        scope.spec.public_key = Some(key.trim().to_string());
        Ok(())
    }

    async fn uninstall(&self, _scope: &mut Scope<'_, SshKeySpec>) -> Result<()> {
        Ok(())
    }

    async fn update(
        &self,
        scope: &mut Scope<'_, SshKeySpec>,
        changes: SshKeyUpdate,
    ) -> Result<bool> {
        let mut changed = false;
        if let Some(path) = changes.path.filter(|p| *p != scope.spec.path) {
            require("path", &path)?;
            scope.spec.path = path;
            changed = true;
        }
        if let Some(key) = changes.public_key {
            if scope.spec.public_key.as_deref() != Some(key.as_str()) {
                scope.spec.public_key = Some(key);
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn info(&self, scope: &Scope<'_, SshKeySpec>) -> Result<serde_json::Value> {
        let info = SshKeyInfo {
            name: scope.name.to_string(),
            path: scope.spec.path.clone(),
            public_key: scope.spec.public_key.clone().unwrap_or_default(),
        };
        Ok(serde_json::to_value(info)?)
    }
}
