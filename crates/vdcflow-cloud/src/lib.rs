//! vdcflow cloud control plane
//!
//! This crate defines how vdcflow talks to a cloud control plane: the
//! [`CloudApi`] client trait, the [`Connector`] that produces a client for a
//! connection, and the remote object model (accounts, spaces, machines,
//! disks, users and their ACLs).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 vdcflow-engine                   │
//! │      (resource drivers, lifecycle, ACL sync)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Connector::connect(ConnectionInfo)
//! ┌─────────────────▼───────────────────────────────┐
//! │                 vdcflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   trait CloudApi { accounts, spaces, … }  │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼────────┐
//! │ vendor client │ │ InMemoryCloud  │
//! │  (external)   │ │ (simulation)   │
//! └───────────────┘ └────────────────┘
//! ```

pub mod api;
pub mod error;
pub mod memory;
pub mod model;

// Re-exports
pub use api::{CloudApi, Connector};
pub use error::{CloudError, Result};
pub use memory::{InMemoryCloud, InMemoryConnector};
pub use model::{
    AccountObject, AclEntry, AclTarget, CapacityLimits, ConnectionInfo, DiskObject, DiskType,
    IoTune, MachineObject, NewAccount, NewDisk, NewMachine, NewSpace, NewUser, PortForward,
    PowerAction, STATUS_DEPLOYED, Snapshot, SpaceObject, UNLIMITED, UserObject,
};
