use serde_json::{Value, json};
use std::sync::Arc;
use vdcflow_cloud::InMemoryCloud;
use vdcflow_config::{EngineConfig, RetrySettings};
use vdcflow_engine::{
    LocalRuntime, Manifest, MemoryStateStore, ResourceDefinition, ResourceKind, StateStore,
};

pub struct TestCloud {
    pub cloud: Arc<InMemoryCloud>,
    pub runtime: LocalRuntime,
}

impl TestCloud {
    /// Runtime with the default retry policy
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Runtime that gives up after the first failed install attempt
    #[allow(dead_code)]
    pub fn without_retry() -> Self {
        let config = EngineConfig {
            retry: RetrySettings {
                max_attempts: 1,
                ..RetrySettings::default()
            },
            ..EngineConfig::default()
        };
        Self::with_config(&config)
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self::with_store(Arc::new(InMemoryCloud::new()), Arc::new(MemoryStateStore::new()), config)
    }

    pub fn with_store(
        cloud: Arc<InMemoryCloud>,
        store: Arc<dyn StateStore>,
        config: &EngineConfig,
    ) -> Self {
        let runtime = LocalRuntime::new(cloud.connector(), store, config);
        Self { cloud, runtime }
    }

    pub async fn load(&self, resources: Vec<ResourceDefinition>) {
        self.runtime
            .load_manifest(&Manifest { resources })
            .await
            .unwrap();
    }

    pub async fn install(&self, kind: ResourceKind, name: &str) {
        self.runtime.install(kind, name).await.unwrap();
    }

    pub async fn run(&self, kind: ResourceKind, name: &str, action: &str, args: Value) -> Value {
        self.runtime
            .execute(kind, name, action, args)
            .await
            .unwrap()
    }
}

pub fn connection() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::Connection,
        "main",
        json!({"url": "g8.example.com", "jwt": "token"}),
    )
}

pub fn account() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::Account,
        "acc1",
        json!({"connection": "main", "maxCPUCapacity": 4}),
    )
}

pub fn vdc() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::VirtualDatacenter,
        "vdc1",
        json!({"account": "acc1", "location": "be-gen-1"}),
    )
}

#[allow(dead_code)]
pub fn identity() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::Identity,
        "alice",
        json!({"connection": "main", "email": "alice@example.com", "provider": "itsyouonline"}),
    )
}

#[allow(dead_code)]
pub fn sshkey() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::SshKey,
        "deploy",
        json!({"path": "/home/ops/.ssh/id_ed25519", "publicKey": "ssh-ed25519 AAAAC3Nz ops"}),
    )
}

#[allow(dead_code)]
pub fn machine() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::Machine,
        "vm1",
        json!({
            "vdc": "vdc1",
            "osImage": "Ubuntu 22.04",
            "sshKey": "deploy",
            "memory": 2048,
            "vcpus": 2,
            "ports": [{"source": 2222, "destination": 22}]
        }),
    )
}

#[allow(dead_code)]
pub fn disk() -> ResourceDefinition {
    ResourceDefinition::new(
        ResourceKind::Disk,
        "data1",
        json!({"vdc": "vdc1", "size": 20, "maxIops": 500}),
    )
}

/// Every kind, wired together
#[allow(dead_code)]
pub fn full_stack() -> Vec<ResourceDefinition> {
    vec![
        connection(),
        sshkey(),
        identity(),
        account(),
        vdc(),
        disk(),
        machine(),
    ]
}
