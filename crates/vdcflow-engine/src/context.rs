//! Capabilities handed to every resource instance
//!
//! An [`EngineContext`] bundles what a driver may use to reach the outside
//! world: reference resolution, action delegation, the connector producing
//! control-plane clients and the retry/poll policies. Nothing in it caches
//! remote objects; every call resolves its references again.

use crate::error::Result;
use crate::invoker::RemoteActionInvoker;
use crate::kind::ResourceKind;
use crate::poller::DeploymentPoller;
use crate::resolver::ServiceResolver;
use crate::retry::RetryPolicy;
use crate::runtime::ServiceIndex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use vdcflow_cloud::{CloudApi, ConnectionInfo, Connector};
use vdcflow_config::EngineConfig;

pub const ACTION_GET_INFO: &str = "get_info";

/// A client obtained through a Connection resource
#[derive(Clone)]
pub struct Connected {
    pub info: ConnectionInfo,
    pub client: Arc<dyn CloudApi>,
}

pub struct EngineContext {
    resolver: ServiceResolver,
    invoker: RemoteActionInvoker,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    poller: DeploymentPoller,
}

impl EngineContext {
    pub fn new(index: Arc<dyn ServiceIndex>, connector: Arc<dyn Connector>) -> Self {
        Self {
            resolver: ServiceResolver::new(index),
            invoker: RemoteActionInvoker,
            connector,
            retry: RetryPolicy::default(),
            poller: DeploymentPoller::default(),
        }
    }

    /// Apply retry and poll settings from a loaded configuration
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_retry(RetryPolicy::from(&config.retry))
            .with_poller(DeploymentPoller::from(&config.poll))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poller(mut self, poller: DeploymentPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn resolver(&self) -> &ServiceResolver {
        &self.resolver
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn poller(&self) -> &DeploymentPoller {
        &self.poller
    }

    /// Resolve `kind`/`name` and run `action` on it
    pub async fn call(
        &self,
        kind: ResourceKind,
        name: &str,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let target = self.resolver.resolve(kind, name).await?;
        self.invoker.invoke(target.as_ref(), action, args).await
    }

    /// `get_info` of another instance, decoded into `T`
    pub async fn info<T: DeserializeOwned>(&self, kind: ResourceKind, name: &str) -> Result<T> {
        let target = self.resolver.resolve(kind, name).await?;
        self.invoker
            .invoke_as(target.as_ref(), ACTION_GET_INFO, serde_json::Value::Null)
            .await
    }

    /// Open a client through the Connection resource called `connection`
    pub async fn connect(&self, connection: &str) -> Result<Connected> {
        let info: ConnectionInfo = self.info(ResourceKind::Connection, connection).await?;
        let client = self.connector.connect(&info).await?;
        Ok(Connected { info, client })
    }

    /// Open a client from connection details that are already known
    pub async fn connect_with(&self, info: &ConnectionInfo) -> Result<Arc<dyn CloudApi>> {
        Ok(self.connector.connect(info).await?)
    }
}
