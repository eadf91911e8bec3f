//! vdcflow engine
//!
//! Lifecycle and reconciliation of cloud resources: connections, accounts,
//! virtual datacenters, machines, disks, identities and SSH keys.
//!
//! Every resource instance is a [`Resource`] driven by a per-kind
//! [`Driver`]. Instances find each other by (kind, name) through the
//! runtime's [`ServiceIndex`] and talk to each other only by scheduling
//! actions; remote objects are fetched again on every operation.
//!
//! ```text
//! Connection ◀── Account ◀── VirtualDatacenter ◀── Machine ──▶ SSHKey
//!     ▲                              ▲
//!     └──── Identity                 └──────────── Disk
//! ```

pub mod acl;
pub mod context;
pub mod drivers;
pub mod error;
pub mod invoker;
pub mod kind;
pub mod lifecycle;
pub mod limits;
pub mod local;
pub mod manifest;
pub mod poller;
pub mod resolver;
pub mod retry;
pub mod runtime;
pub mod state;

pub use acl::{AclChange, AclSynchronizer};
pub use context::{Connected, EngineContext};
pub use drivers::validate_definition;
pub use error::{EngineError, Result, TaskFailure};
pub use invoker::RemoteActionInvoker;
pub use kind::ResourceKind;
pub use lifecycle::{Driver, Resource, Scope};
pub use local::{InstanceSummary, LocalRuntime};
pub use manifest::{Manifest, Reference, ResourceDefinition};
pub use poller::DeploymentPoller;
pub use resolver::ServiceResolver;
pub use retry::RetryPolicy;
pub use runtime::{
    ManagedService, ServiceIndex, ServiceRef, SpawnedService, Task, TaskOutcome, TaskState,
};
pub use state::{
    FileStateStore, InstanceRecord, LifecycleState, LifecycleStatus, MemoryStateStore, StateStore,
};
