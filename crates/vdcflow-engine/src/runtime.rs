//! Seams towards the orchestration runtime
//!
//! The runtime owns resource instances. The engine only needs to find them by
//! (kind, name) and to schedule actions on them; both are expressed here.

use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::state::LifecycleStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Terminal state of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ok,
    Error,
}

/// What a task ended with
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub state: TaskState,
    pub result: serde_json::Value,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            state: TaskState::Ok,
            result,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: TaskState::Error,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Ok
    }
}

impl From<Result<serde_json::Value>> for TaskOutcome {
    fn from(result: Result<serde_json::Value>) -> Self {
        match result {
            Ok(value) => TaskOutcome::ok(value),
            Err(e) => TaskOutcome::failed(e.to_string()),
        }
    }
}

/// Handle to a scheduled action
pub struct Task {
    outcome: Pin<Box<dyn Future<Output = TaskOutcome> + Send>>,
}

impl Task {
    /// Run `work` on the tokio runtime
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        Self {
            outcome: Box::pin(async move {
                match handle.await {
                    Ok(result) => TaskOutcome::from(result),
                    Err(e) => TaskOutcome::failed(format!("task aborted: {}", e)),
                }
            }),
        }
    }

    /// A task that already reached its terminal state
    pub fn finished(outcome: TaskOutcome) -> Self {
        Self {
            outcome: Box::pin(std::future::ready(outcome)),
        }
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait(self) -> TaskOutcome {
        self.outcome.await
    }
}

/// Instance of a resource as seen by other resources
pub trait ServiceRef: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn name(&self) -> &str;
    fn schedule(&self, action: &str, args: serde_json::Value) -> Task;
}

/// Lookup of instances by kind and name
#[async_trait]
pub trait ServiceIndex: Send + Sync {
    async fn find(&self, kind: ResourceKind, name: &str) -> Vec<Arc<dyn ServiceRef>>;
}

/// Object-safe view of an instance, used by runtimes to dispatch actions
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn name(&self) -> &str;
    /// Waits for the operation in flight, if any
    async fn status(&self) -> LifecycleStatus;
    async fn execute(&self, action: &str, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Adapts a [`ManagedService`] into a schedulable [`ServiceRef`]
pub struct SpawnedService {
    service: Arc<dyn ManagedService>,
}

impl SpawnedService {
    pub fn new(service: Arc<dyn ManagedService>) -> Self {
        Self { service }
    }
}

impl ServiceRef for SpawnedService {
    fn kind(&self) -> ResourceKind {
        self.service.kind()
    }

    fn name(&self) -> &str {
        self.service.name()
    }

    fn schedule(&self, action: &str, args: serde_json::Value) -> Task {
        let service = Arc::clone(&self.service);
        let action = action.to_string();
        Task::spawn(async move { service.execute(&action, args).await })
    }
}

/// Parse action arguments into their typed form
pub fn parse_args<T: serde::de::DeserializeOwned>(
    action: &str,
    args: serde_json::Value,
) -> Result<T> {
    let args = if args.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| EngineError::validation(format!("{} arguments", action), e.to_string()))
}
