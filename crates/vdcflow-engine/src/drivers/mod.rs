//! Per-kind resource drivers

pub mod account;
pub mod connection;
pub mod disk;
pub mod identity;
pub mod machine;
pub mod sshkey;
pub mod vdc;

pub use account::{AccountDriver, AccountInfo, AccountSpec};
pub use connection::{ConnectionDriver, ConnectionSpec};
pub use disk::{DiskDriver, DiskInfo, DiskSpec};
pub use identity::{IdentityDriver, IdentityInfo, IdentitySpec};
pub use machine::{MachineDriver, MachineInfo, MachineSpec, PortSpec};
pub use sshkey::{SshKeyDriver, SshKeyInfo, SshKeySpec};
pub use vdc::{VdcDriver, VdcInfo, VdcSpec};

use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::Driver;
use serde::Deserialize;
use vdcflow_cloud::CloudError;

/// Fails when a required string field is empty
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "is required"));
    }
    Ok(())
}

/// Treat "already gone" as success when deleting
pub(crate) fn tolerate_missing(result: vdcflow_cloud::Result<()>) -> Result<()> {
    match result {
        Err(CloudError::NotFound(what)) => {
            tracing::debug!(%what, "Remote object already gone");
            Ok(())
        }
        other => Ok(other?),
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Arguments of `user_authorize`
#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizeArgs {
    /// Name of the Identity resource
    pub user: String,
    #[serde(default = "default_right", alias = "accessType")]
    pub accesstype: String,
}

fn default_right() -> String {
    crate::acl::DEFAULT_RIGHT.to_string()
}

/// Arguments of `user_unauthorize`
#[derive(Debug, Deserialize)]
pub(crate) struct UnauthorizeArgs {
    pub user: String,
}

fn check<D: Driver>(driver: &D, name: &str, spec: &serde_json::Value) -> Result<()> {
    let spec: D::Spec = serde_json::from_value(spec.clone())
        .map_err(|e| EngineError::validation(format!("{} \"{}\"", D::KIND, name), e.to_string()))?;
    driver.validate(name, &spec)
}

/// Decode and validate an untyped spec of the given kind
pub fn validate_definition(kind: ResourceKind, name: &str, spec: &serde_json::Value) -> Result<()> {
    match kind {
        ResourceKind::Connection => check(&ConnectionDriver, name, spec),
        ResourceKind::SshKey => check(&SshKeyDriver, name, spec),
        ResourceKind::Identity => check(&IdentityDriver, name, spec),
        ResourceKind::Account => check(&AccountDriver, name, spec),
        ResourceKind::VirtualDatacenter => check(&VdcDriver, name, spec),
        ResourceKind::Disk => check(&DiskDriver, name, spec),
        ResourceKind::Machine => check(&MachineDriver, name, spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tolerate_missing() {
        assert!(tolerate_missing(Err(CloudError::NotFound("disk 3".into()))).is_ok());
        assert!(tolerate_missing(Err(CloudError::Unavailable("down".into()))).is_err());
    }

    #[test]
    fn test_validate_definition() {
        assert!(validate_definition(
            ResourceKind::Account,
            "acc1",
            &json!({"connection": "main", "maxCPUCapacity": 4})
        )
        .is_ok());

        let err = validate_definition(ResourceKind::VirtualDatacenter, "vdc1", &json!({"account": "acc1"}))
            .unwrap_err();
        assert!(err.to_string().contains("location"));

        let err = validate_definition(ResourceKind::Disk, "d1", &json!({"size": "big"})).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }
}
