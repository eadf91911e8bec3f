//! Engine error types

use crate::kind::ResourceKind;
use thiserror::Error;
use vdcflow_cloud::CloudError;

/// Failure reported by a delegated task, kept as the source of
/// [`EngineError::RemoteAction`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskFailure(pub String);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed for \"{field}\": {reason}")]
    Validation { field: String, reason: String },

    #[error("found {count} services with name \"{name}\", required exactly one")]
    Resolution {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    #[error("error occurred when executing action \"{action}\" on service \"{service}\"")]
    RemoteAction {
        action: String,
        service: String,
        #[source]
        cause: TaskFailure,
    },

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Runtime(String),

    #[error("unknown action \"{action}\" for {kind} \"{name}\"")]
    UnknownAction {
        kind: ResourceKind,
        name: String,
        action: String,
    },

    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("state store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Failures worth another attempt against an eventually-available
    /// control plane
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Cloud(e) => e.is_transient(),
            EngineError::RemoteAction { .. } | EngineError::Timeout(_) | EngineError::Io(_) => {
                true
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_message() {
        let err = EngineError::Resolution {
            kind: ResourceKind::Account,
            name: "acc1".to_string(),
            count: 0,
        };
        assert_eq!(
            err.to_string(),
            "found 0 services with name \"acc1\", required exactly one"
        );
    }

    #[test]
    fn test_remote_action_keeps_cause() {
        let err = EngineError::RemoteAction {
            action: "get_info".to_string(),
            service: "vdc1".to_string(),
            cause: TaskFailure("service \"vdc1\" is not installed".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "error occurred when executing action \"get_info\" on service \"vdc1\""
        );
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("not installed"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Cloud(CloudError::Unavailable("down".into())).is_transient());
        assert!(!EngineError::Cloud(CloudError::NotFound("x".into())).is_transient());
        assert!(!EngineError::validation("name", "empty").is_transient());
        assert!(!EngineError::Precondition("busy".into()).is_transient());
        assert!(EngineError::Timeout("slow".into()).is_transient());
    }
}
