//! Resource manifests
//!
//! A manifest lists the desired resources as `{kind, name, spec}` records:
//!
//! ```yaml
//! resources:
//!   - kind: connection
//!     name: main
//!     spec:
//!       url: g8.example.com
//!       jwt: eyJhbGciOi...
//!   - kind: account
//!     name: acc1
//!     spec:
//!       connection: main
//!       maxCPUCapacity: 4
//! ```

use crate::drivers::validate_definition;
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Instance names double as state file names and must stay one path component
pub fn validate_name(kind: ResourceKind, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EngineError::validation(
            "name",
            format!("{} resource without a name", kind),
        ));
    }
    if name == "." || name.contains("..") || name.contains(['/', '\\', '\0']) {
        return Err(EngineError::validation(
            "name",
            format!("{} name \"{}\" must not contain '/', '\\' or \"..\"", kind, name),
        ));
    }
    Ok(())
}

/// One desired resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default = "empty_spec")]
    pub spec: serde_json::Value,
}

fn empty_spec() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Reference from one resource to another, by (kind, name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Spec field holding the reference
    pub field: &'static str,
    pub kind: ResourceKind,
    pub name: String,
}

/// Spec fields that name other resources, per kind
fn reference_fields(kind: ResourceKind) -> &'static [(&'static str, ResourceKind)] {
    match kind {
        ResourceKind::Connection | ResourceKind::SshKey => &[],
        ResourceKind::Account | ResourceKind::Identity => {
            &[("connection", ResourceKind::Connection)]
        }
        ResourceKind::VirtualDatacenter => &[("account", ResourceKind::Account)],
        ResourceKind::Disk => &[("vdc", ResourceKind::VirtualDatacenter)],
        ResourceKind::Machine => &[
            ("vdc", ResourceKind::VirtualDatacenter),
            ("sshKey", ResourceKind::SshKey),
        ],
    }
}

impl ResourceDefinition {
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: serde_json::Value) -> Self {
        Self {
            kind,
            name: name.into(),
            spec,
        }
    }

    /// Resources this one points to; unset optional references are skipped
    pub fn references(&self) -> Vec<Reference> {
        reference_fields(self.kind)
            .iter()
            .filter_map(|(field, kind)| {
                let name = self.spec.get(*field)?.as_str()?;
                (!name.is_empty()).then(|| Reference {
                    field: *field,
                    kind: *kind,
                    name: name.to_string(),
                })
            })
            .collect()
    }
}

impl std::fmt::Display for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
}

impl Manifest {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading manifest");
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    pub fn find(&self, kind: ResourceKind, name: &str) -> Option<&ResourceDefinition> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
    }

    /// Check names, specs and references without touching the cloud
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            validate_name(resource.kind, &resource.name)?;
            if !seen.insert((resource.kind, resource.name.as_str())) {
                return Err(EngineError::validation(
                    "name",
                    format!("{} is defined more than once", resource),
                ));
            }
        }

        for resource in &self.resources {
            validate_definition(resource.kind, &resource.name, &resource.spec)?;
            for reference in resource.references() {
                if !seen.contains(&(reference.kind, reference.name.as_str())) {
                    return Err(EngineError::validation(
                        reference.field,
                        format!(
                            "{} references unknown {} \"{}\"",
                            resource, reference.kind, reference.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resources sorted so that every reference comes before its user
    pub fn provisioning_order(&self) -> Vec<&ResourceDefinition> {
        let mut ordered: Vec<_> = self.resources.iter().collect();
        ordered.sort_by_key(|r| r.kind.rank());
        ordered
    }

    pub fn teardown_order(&self) -> Vec<&ResourceDefinition> {
        let mut ordered = self.provisioning_order();
        ordered.reverse();
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
resources:
  - kind: machine
    name: vm1
    spec:
      vdc: vdc1
      osImage: Ubuntu 22.04
      sshKey: deploy
  - kind: vdc
    name: vdc1
    spec:
      account: acc1
      location: be-gen-1
  - kind: account
    name: acc1
    spec:
      connection: main
      maxCPUCapacity: 4
  - kind: sshkey
    name: deploy
    spec:
      path: /tmp/id_ed25519
  - kind: connection
    name: main
    spec:
      url: g8.example.com
"#;

    fn names(resources: &[&ResourceDefinition]) -> Vec<String> {
        resources.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_parse_and_validate() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 5);
        manifest.validate().unwrap();

        let vm = manifest.find(ResourceKind::Machine, "vm1").unwrap();
        assert_eq!(
            vm.references(),
            vec![
                Reference {
                    field: "vdc",
                    kind: ResourceKind::VirtualDatacenter,
                    name: "vdc1".into()
                },
                Reference {
                    field: "sshKey",
                    kind: ResourceKind::SshKey,
                    name: "deploy".into()
                },
            ]
        );
    }

    #[test]
    fn test_orders() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(
            names(&manifest.provisioning_order()),
            ["deploy", "main", "acc1", "vdc1", "vm1"]
        );
        assert_eq!(
            names(&manifest.teardown_order()),
            ["vm1", "vdc1", "acc1", "main", "deploy"]
        );
    }

    #[test]
    fn test_unknown_reference() {
        let manifest = Manifest {
            resources: vec![ResourceDefinition::new(
                ResourceKind::Account,
                "acc1",
                serde_json::json!({"connection": "missing"}),
            )],
        };
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "connection"));
        assert!(err.to_string().contains("unknown connection \"missing\""));
    }

    #[test]
    fn test_duplicate_names() {
        let conn = ResourceDefinition::new(
            ResourceKind::Connection,
            "main",
            serde_json::json!({"url": "g8.example.com"}),
        );
        let manifest = Manifest {
            resources: vec![conn.clone(), conn],
        };
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn test_path_like_names_rejected() {
        for name in ["../etc/passwd", "a/b", "a\\b", "..", ".", "x..y", " "] {
            let manifest = Manifest {
                resources: vec![ResourceDefinition::new(
                    ResourceKind::Connection,
                    name,
                    serde_json::json!({"url": "g8.example.com"}),
                )],
            };
            let err = manifest.validate().unwrap_err();
            assert!(
                matches!(err, EngineError::Validation { ref field, .. } if field == "name"),
                "{:?} accepted as a name",
                name
            );
        }
        assert!(validate_name(ResourceKind::Disk, "data-1.v2").is_ok());
    }

    #[test]
    fn test_same_name_different_kinds() {
        let manifest = Manifest {
            resources: vec![
                ResourceDefinition::new(
                    ResourceKind::Connection,
                    "main",
                    serde_json::json!({"url": "g8.example.com"}),
                ),
                ResourceDefinition::new(
                    ResourceKind::Account,
                    "main",
                    serde_json::json!({"connection": "main"}),
                ),
            ],
        };
        manifest.validate().unwrap();
    }
}
