//! In-process runtime
//!
//! [`LocalRuntime`] hosts resource instances in a registry, answers reference
//! lookups from it and runs actions on tokio tasks. Each instance is guarded
//! by its own async mutex, so one operation runs per instance at a time while
//! different instances progress independently.

use crate::context::{ACTION_GET_INFO, EngineContext};
use crate::drivers::{
    AccountDriver, ConnectionDriver, DiskDriver, IdentityDriver, MachineDriver, SshKeyDriver,
    VdcDriver,
};
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::lifecycle::{ACTION_INSTALL, ACTION_UNINSTALL, Driver, Resource};
use crate::manifest::{Manifest, ResourceDefinition, validate_name};
use crate::runtime::{ManagedService, ServiceIndex, ServiceRef, SpawnedService};
use crate::state::{LifecycleStatus, MemoryStateStore, StateStore};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::Mutex;
use vdcflow_cloud::Connector;
use vdcflow_config::EngineConfig;

/// Instances hosted by a runtime
#[derive(Default)]
struct Registry {
    services: RwLock<Vec<Arc<dyn ManagedService>>>,
}

impl Registry {
    fn find(&self, kind: ResourceKind, name: &str) -> Vec<Arc<dyn ManagedService>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind() == kind && s.name() == name)
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedService>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Lookup handed to instances; weak so that instances do not keep the
/// registry that holds them alive
struct RegistryIndex {
    registry: Weak<Registry>,
}

#[async_trait]
impl ServiceIndex for RegistryIndex {
    async fn find(&self, kind: ResourceKind, name: &str) -> Vec<Arc<dyn ServiceRef>> {
        let Some(registry) = self.registry.upgrade() else {
            return Vec::new();
        };
        registry
            .find(kind, name)
            .into_iter()
            .map(|service| Arc::new(SpawnedService::new(service)) as Arc<dyn ServiceRef>)
            .collect()
    }
}

/// A resource hosted by the runtime
struct ServiceInstance<D: Driver> {
    name: String,
    resource: Mutex<Resource<D>>,
}

#[async_trait]
impl<D: Driver> ManagedService for ServiceInstance<D> {
    fn kind(&self) -> ResourceKind {
        D::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn status(&self) -> LifecycleStatus {
        self.resource.lock().await.status()
    }

    async fn execute(&self, action: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        self.resource.lock().await.execute(action, args).await
    }
}

/// Name and lifecycle status of a hosted instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub kind: ResourceKind,
    pub name: String,
    pub status: LifecycleStatus,
}

pub struct LocalRuntime {
    registry: Arc<Registry>,
    ctx: Arc<EngineContext>,
    store: Arc<dyn StateStore>,
}

impl LocalRuntime {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn StateStore>,
        config: &EngineConfig,
    ) -> Self {
        let registry = Arc::new(Registry::default());
        let index = Arc::new(RegistryIndex {
            registry: Arc::downgrade(&registry),
        });
        let ctx = Arc::new(EngineContext::new(index, connector).with_config(config));
        Self {
            registry,
            ctx,
            store,
        }
    }

    /// Runtime with default settings whose state lives in memory
    pub fn in_memory(connector: Arc<dyn Connector>) -> Self {
        Self::new(
            connector,
            Arc::new(MemoryStateStore::new()),
            &EngineConfig::default(),
        )
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Host a new instance, restoring its persisted record if there is one
    pub async fn add<D: Driver>(&self, driver: D, name: &str, spec: D::Spec) -> Result<()> {
        validate_name(D::KIND, name)?;
        if !self.registry.find(D::KIND, name).is_empty() {
            return Err(EngineError::validation(
                "name",
                format!("{} \"{}\" already exists", D::KIND, name),
            ));
        }

        let resource = Resource::restore(
            driver,
            name,
            spec,
            Arc::clone(&self.ctx),
            Arc::clone(&self.store),
        )
        .await?;
        let instance: Arc<dyn ManagedService> = Arc::new(ServiceInstance {
            name: name.to_string(),
            resource: Mutex::new(resource),
        });

        let mut services = self
            .registry
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if services.iter().any(|s| s.kind() == D::KIND && s.name() == name) {
            return Err(EngineError::validation(
                "name",
                format!("{} \"{}\" already exists", D::KIND, name),
            ));
        }
        services.push(instance);
        tracing::debug!(kind = %D::KIND, name, "Added instance");
        Ok(())
    }

    /// Host an instance from an untyped definition
    pub async fn add_definition(&self, definition: &ResourceDefinition) -> Result<()> {
        let name = definition.name.as_str();
        match definition.kind {
            ResourceKind::Connection => self.add(ConnectionDriver, name, decode(definition)?).await,
            ResourceKind::SshKey => self.add(SshKeyDriver, name, decode(definition)?).await,
            ResourceKind::Identity => self.add(IdentityDriver, name, decode(definition)?).await,
            ResourceKind::Account => self.add(AccountDriver, name, decode(definition)?).await,
            ResourceKind::VirtualDatacenter => self.add(VdcDriver, name, decode(definition)?).await,
            ResourceKind::Disk => self.add(DiskDriver, name, decode(definition)?).await,
            ResourceKind::Machine => self.add(MachineDriver, name, decode(definition)?).await,
        }
    }

    /// Validate a manifest and host all of its resources
    pub async fn load_manifest(&self, manifest: &Manifest) -> Result<()> {
        manifest.validate()?;
        for definition in manifest.provisioning_order() {
            self.add_definition(definition).await?;
        }
        tracing::info!(count = manifest.resources.len(), "Loaded manifest");
        Ok(())
    }

    fn lookup(&self, kind: ResourceKind, name: &str) -> Result<Arc<dyn ManagedService>> {
        let mut found = self.registry.find(kind, name);
        if found.len() != 1 {
            return Err(EngineError::Resolution {
                kind,
                name: name.to_string(),
                count: found.len(),
            });
        }
        Ok(found.remove(0))
    }

    /// Run `action` on an instance and wait for it
    pub async fn execute(
        &self,
        kind: ResourceKind,
        name: &str,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let service = self.lookup(kind, name)?;
        service.execute(action, args).await
    }

    pub async fn install(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.execute(kind, name, ACTION_INSTALL, serde_json::Value::Null)
            .await
            .map(|_| ())
    }

    pub async fn uninstall(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.execute(kind, name, ACTION_UNINSTALL, serde_json::Value::Null)
            .await
            .map(|_| ())
    }

    pub async fn get_info(&self, kind: ResourceKind, name: &str) -> Result<serde_json::Value> {
        self.execute(kind, name, ACTION_GET_INFO, serde_json::Value::Null)
            .await
    }

    /// Install every hosted instance, references first
    pub async fn install_all(&self) -> Result<()> {
        for service in self.ordered(false) {
            service
                .execute(ACTION_INSTALL, serde_json::Value::Null)
                .await?;
        }
        Ok(())
    }

    /// Uninstall every hosted instance, users before their references
    pub async fn uninstall_all(&self) -> Result<()> {
        for service in self.ordered(true) {
            service
                .execute(ACTION_UNINSTALL, serde_json::Value::Null)
                .await?;
        }
        Ok(())
    }

    fn ordered(&self, reverse: bool) -> Vec<Arc<dyn ManagedService>> {
        let mut services = self.registry.snapshot();
        services.sort_by_key(|s| s.kind().rank());
        if reverse {
            services.reverse();
        }
        services
    }

    /// Stop hosting an instance; it must not be installed
    pub async fn remove(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let service = self.lookup(kind, name)?;
        if service.status().await != LifecycleStatus::Uninstalled {
            return Err(EngineError::Precondition(format!(
                "{} \"{}\" is still installed",
                kind, name
            )));
        }
        self.registry
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !(s.kind() == kind && s.name() == name));
        self.store.remove(kind, name).await?;
        tracing::debug!(%kind, name, "Removed instance");
        Ok(())
    }

    pub async fn instances(&self) -> Vec<InstanceSummary> {
        let mut summaries = Vec::new();
        for service in self.ordered(false) {
            summaries.push(InstanceSummary {
                kind: service.kind(),
                name: service.name().to_string(),
                status: service.status().await,
            });
        }
        summaries
    }
}

fn decode<T: serde::de::DeserializeOwned>(definition: &ResourceDefinition) -> Result<T> {
    serde_json::from_value(definition.spec.clone())
        .map_err(|e| EngineError::validation(definition.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vdcflow_cloud::InMemoryCloud;

    fn runtime() -> (Arc<InMemoryCloud>, LocalRuntime) {
        let cloud = Arc::new(InMemoryCloud::new());
        let runtime = LocalRuntime::in_memory(cloud.connector());
        (cloud, runtime)
    }

    fn connection() -> ResourceDefinition {
        ResourceDefinition::new(
            ResourceKind::Connection,
            "main",
            json!({"url": "g8.example.com", "login": "admin", "jwt": "token"}),
        )
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected() {
        let (_, runtime) = runtime();
        runtime.add_definition(&connection()).await.unwrap();
        let err = runtime.add_definition(&connection()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let (_, runtime) = runtime();
        let err = runtime
            .install(ResourceKind::Account, "acc1")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "found 0 services with name \"acc1\", required exactly one"
        );
    }

    #[tokio::test]
    async fn test_remove_requires_uninstall() {
        let (_, runtime) = runtime();
        runtime.add_definition(&connection()).await.unwrap();
        runtime.install(ResourceKind::Connection, "main").await.unwrap();

        let err = runtime
            .remove(ResourceKind::Connection, "main")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));

        runtime
            .uninstall(ResourceKind::Connection, "main")
            .await
            .unwrap();
        runtime.remove(ResourceKind::Connection, "main").await.unwrap();
        assert!(runtime.instances().await.is_empty());
    }

    #[tokio::test]
    async fn test_instances_follow_rank() {
        let (_, runtime) = runtime();
        let manifest = Manifest {
            resources: vec![
                ResourceDefinition::new(
                    ResourceKind::Account,
                    "acc1",
                    json!({"connection": "main"}),
                ),
                connection(),
            ],
        };
        runtime.load_manifest(&manifest).await.unwrap();

        let instances = runtime.instances().await;
        assert_eq!(instances[0].kind, ResourceKind::Connection);
        assert_eq!(instances[1].name, "acc1");
        assert!(
            instances
                .iter()
                .all(|i| i.status == LifecycleStatus::Uninstalled)
        );
    }

    #[tokio::test]
    async fn test_malformed_spec() {
        let (_, runtime) = runtime();
        let definition =
            ResourceDefinition::new(ResourceKind::Disk, "d1", json!({"vdc": "vdc1", "size": "big"}));
        let err = runtime.add_definition(&definition).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "disk \"d1\""));
    }
}
