//! Delegation of actions to other instances

use crate::error::{EngineError, Result, TaskFailure};
use crate::runtime::ServiceRef;
use serde::de::DeserializeOwned;

/// Schedules an action on another instance and waits for its terminal state
///
/// There is no local timeout: the wait lasts as long as the remote task.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteActionInvoker;

impl RemoteActionInvoker {
    pub async fn invoke(
        &self,
        target: &dyn ServiceRef,
        action: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        tracing::debug!(kind = %target.kind(), service = target.name(), action, "Invoking action");
        let outcome = target.schedule(action, args).wait().await;
        if outcome.is_success() {
            return Ok(outcome.result);
        }

        let reason = outcome
            .error
            .unwrap_or_else(|| "task ended without an error message".to_string());
        tracing::debug!(service = target.name(), action, %reason, "Delegated action failed");
        Err(EngineError::RemoteAction {
            action: action.to_string(),
            service: target.name().to_string(),
            cause: TaskFailure(reason),
        })
    }

    /// Like [`invoke`](Self::invoke), decoding the result
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        target: &dyn ServiceRef,
        action: &str,
        args: serde_json::Value,
    ) -> Result<T> {
        let value = self.invoke(target, action, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}
